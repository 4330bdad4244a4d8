#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use flat_lease_billing::billing::models::{Apartment, Client, Installment};
use flat_lease_billing::billing::{
    create_contract, ApprovalTerms, BillingContext, ContractDetail, MemoryStore, MeteredBilling,
    NewContract,
};
use flat_lease_billing::cache::AppCache;
use flat_lease_billing::clock::{Clock, FixedClock};
use flat_lease_billing::integrations::{PayeeInfo, PixQrGenerator, RecordingNotifier};

pub const ADMIN_EMAIL: &str = "admin@flat.example";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Engine wired to an in-memory store, a fixed clock and a recording notifier.
pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub ctx: BillingContext,
}

impl Harness {
    pub fn on(today: NaiveDate) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::on(today));
        let notifier = Arc::new(RecordingNotifier::new());
        let ctx = BillingContext {
            store: Arc::new(store.clone()),
            clock: clock.clone(),
            notifier: notifier.clone(),
            energy: Arc::new(MeteredBilling),
            qr: Arc::new(PixQrGenerator),
            payee: PayeeInfo {
                key: "flat@example.com".to_string(),
                name: "Flat Fersa".to_string(),
                city: "Sao Paulo".to_string(),
            },
            cache: AppCache::default(),
            admin_recipient: Some(ADMIN_EMAIL.to_string()),
        };
        Self {
            store,
            clock,
            notifier,
            ctx,
        }
    }

    /// Move the clock to noon on `day` and return that instant.
    pub fn at(&self, day: NaiveDate) -> DateTime<Utc> {
        self.clock.set_date(day);
        self.clock.now()
    }

    pub async fn apartment(&self, number: &str) -> Apartment {
        self.store.add_apartment(number, dec!(0.75)).await
    }

    pub async fn client(&self, name: &str) -> Client {
        let email = format!("{}@tenant.example", name.to_lowercase());
        self.store.add_client(name, &email).await
    }

    pub fn terms(rent: Decimal) -> ApprovalTerms {
        ApprovalTerms {
            rent_amount: rent,
            adjustment_period_months: Some(12),
            energy_allowance: None,
            initial_meter_reading: dec!(120),
        }
    }

    /// Admin-created ACTIVE contract on a fresh apartment and client.
    pub async fn active_contract(&self, start: NaiveDate, term_months: i32, due_day: i32) -> ContractDetail {
        let apartment = self.apartment(&format!("A-{}", Uuid::new_v4().simple())).await;
        let client = self.client(&format!("c{}", Uuid::new_v4().simple())).await;
        create_contract(
            &self.ctx,
            NewContract {
                client_id: client.id,
                apartment_id: apartment.id,
                term_months,
                due_day,
                start_date: start,
                terms: Self::terms(dec!(1000)),
            },
        )
        .await
        .unwrap()
    }

    pub async fn installment(&self, id: Uuid) -> Installment {
        let mut uow = self.ctx.store.begin().await.unwrap();
        let installment = uow.installment(id).await.unwrap().unwrap();
        installment
    }

    pub async fn installments(&self, contract_id: Uuid) -> Vec<Installment> {
        let mut uow = self.ctx.store.begin().await.unwrap();
        let installments = uow.installments_for_contract(contract_id).await.unwrap();
        installments
    }
}
