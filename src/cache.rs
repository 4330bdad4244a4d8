//! In-memory caching using moka
//!
//! Generated PIX charges are cached per installment and payable total, so a
//! tenant reopening the payment screen does not re-render the QR image. Any
//! change to the total (energy surcharge, penalty) produces a new key.

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::integrations::PixCharge;

/// Application cache holding rendered payment charges
#[derive(Clone)]
pub struct AppCache {
    /// PIX charges ("pix:{installment}:{total}" -> PixCharge)
    pub pix_charges: Cache<String, Arc<PixCharge>>,
}

impl AppCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        Self {
            pix_charges: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .time_to_idle(ttl / 2)
                .build(),
        }
    }

    /// Get cache statistics for monitoring
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            pix_charges_size: self.pix_charges.entry_count(),
        }
    }

    /// Generate cache key for a PIX charge
    pub fn pix_charge_key(installment_id: Uuid, total: Decimal) -> String {
        format!("pix:{}:{}", installment_id, total.normalize())
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(15 * 60))
    }
}

/// Cache statistics for monitoring endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub pix_charges_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pix_key_ignores_trailing_zeros() {
        let id = Uuid::new_v4();
        assert_eq!(
            AppCache::pix_charge_key(id, dec!(22.50)),
            AppCache::pix_charge_key(id, dec!(22.5))
        );
        assert_ne!(
            AppCache::pix_charge_key(id, dec!(22.50)),
            AppCache::pix_charge_key(id, dec!(1040.40))
        );
    }
}
