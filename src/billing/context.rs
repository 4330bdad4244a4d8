//! Collaborators shared by every billing operation.

use std::sync::Arc;

use crate::cache::AppCache;
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::integrations::{LogNotifier, Notifier, PayeeInfo, PaymentQrGenerator, PixQrGenerator};

use super::energy::{calculator_for, EnergyBillingCalculator};
use super::store::BillingStore;

#[derive(Clone)]
pub struct BillingContext {
    pub store: Arc<dyn BillingStore>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub energy: Arc<dyn EnergyBillingCalculator>,
    pub qr: Arc<dyn PaymentQrGenerator>,
    pub payee: PayeeInfo,
    pub cache: AppCache,
    /// Recipient of administrative reminders; none disables them.
    pub admin_recipient: Option<String>,
}

impl BillingContext {
    /// Production wiring: system clock, log notifier, PIX generator and the
    /// energy strategy selected in configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn BillingStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            energy: calculator_for(config.energy_billing_mode),
            qr: Arc::new(PixQrGenerator),
            payee: PayeeInfo {
                key: config.pix_key.clone(),
                name: config.pix_merchant_name.clone(),
                city: config.pix_merchant_city.clone(),
            },
            cache: AppCache::new(
                config.pix_cache_max_entries,
                std::time::Duration::from_secs(config.pix_cache_ttl_seconds),
            ),
            admin_recipient: config.admin_email.clone(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_energy(mut self, energy: Arc<dyn EnergyBillingCalculator>) -> Self {
        self.energy = energy;
        self
    }
}
