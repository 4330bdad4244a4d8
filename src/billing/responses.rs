//! Response DTOs for billing API endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::integrations::PixCharge;

use super::calculators::round_money;
use super::contracts::ContractDetail;
use super::models::{Contract, ContractStatus, Installment, InstallmentKind, InstallmentStatus};

#[derive(Debug, Serialize)]
pub struct ContractResponse {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub client_id: Uuid,
    pub status: ContractStatus,
    pub term_months: i32,
    pub due_day: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub rent_amount: Option<Decimal>,
    pub adjustment_period_months: Option<i32>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub energy_allowance: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub energy_credit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub meter_reading: Decimal,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Contract> for ContractResponse {
    fn from(c: Contract) -> Self {
        ContractResponse {
            end_date: c.end_date(),
            id: c.id,
            apartment_id: c.apartment_id,
            client_id: c.client_id,
            status: c.status,
            term_months: c.term_months,
            due_day: c.due_day,
            start_date: c.start_date,
            rent_amount: c.rent_amount,
            adjustment_period_months: c.adjustment_period_months,
            energy_allowance: c.energy_allowance,
            energy_credit: c.energy_credit,
            meter_reading: c.meter_reading,
            cancellation_reason: c.cancellation_reason,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstallmentResponse {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub sequence: i32,
    pub reference_month: i32,
    pub kind: InstallmentKind,
    pub status: InstallmentStatus,
    pub due_date: NaiveDate,
    #[serde(with = "rust_decimal::serde::str")]
    pub base_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub energy_consumption: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub energy_surcharge: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub penalty: Decimal,
    /// base + surcharge + penalty
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    pub payment_evidence: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Installment> for InstallmentResponse {
    fn from(i: Installment) -> Self {
        InstallmentResponse {
            total: round_money(i.total_due(), 2),
            id: i.id,
            contract_id: i.contract_id,
            sequence: i.sequence,
            reference_month: i.reference_month,
            kind: i.kind,
            status: i.status,
            due_date: i.due_date,
            base_amount: i.base_amount,
            energy_consumption: i.energy_consumption,
            energy_surcharge: i.energy_surcharge,
            penalty: i.penalty,
            payment_evidence: i.payment_evidence,
            paid_at: i.paid_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ContractDetailResponse {
    pub contract: ContractResponse,
    pub installments: Vec<InstallmentResponse>,
}

impl From<ContractDetail> for ContractDetailResponse {
    fn from(detail: ContractDetail) -> Self {
        ContractDetailResponse {
            contract: detail.contract.into(),
            installments: detail.installments.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PixChargeResponse {
    pub installment_id: Uuid,
    pub payload: String,
    pub image_base64: String,
}

impl PixChargeResponse {
    pub fn new(installment_id: Uuid, charge: &PixCharge) -> Self {
        PixChargeResponse {
            installment_id,
            payload: charge.payload.clone(),
            image_base64: charge.image_base64.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub store: &'static str,
    pub energy_billing: &'static str,
    pub cache: CacheStats,
}
