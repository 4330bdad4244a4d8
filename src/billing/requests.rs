//! Request DTOs for billing API endpoints.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::contracts::{ApprovalTerms, ContractRequest, NewContract};

/// Tenant request for an apartment
#[derive(Debug, Deserialize)]
pub struct SolicitContractRequest {
    pub client_id: Uuid,
    pub apartment_id: Uuid,
    pub term_months: i32,
    pub due_day: i32,
    pub start_date: NaiveDate,
}

impl From<SolicitContractRequest> for ContractRequest {
    fn from(req: SolicitContractRequest) -> Self {
        ContractRequest {
            client_id: req.client_id,
            apartment_id: req.apartment_id,
            term_months: req.term_months,
            due_day: req.due_day,
            start_date: req.start_date,
        }
    }
}

/// Financial terms supplied on approval
#[derive(Debug, Deserialize)]
pub struct ApproveContractRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub rent_amount: Decimal,
    #[serde(default)]
    pub adjustment_period_months: Option<i32>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub energy_allowance: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str")]
    pub initial_meter_reading: Decimal,
}

impl From<ApproveContractRequest> for ApprovalTerms {
    fn from(req: ApproveContractRequest) -> Self {
        ApprovalTerms {
            rent_amount: req.rent_amount,
            adjustment_period_months: req.adjustment_period_months,
            energy_allowance: req.energy_allowance,
            initial_meter_reading: req.initial_meter_reading,
        }
    }
}

/// Administrator creates an active contract directly
#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    pub client_id: Uuid,
    pub apartment_id: Uuid,
    pub term_months: i32,
    pub due_day: i32,
    pub start_date: NaiveDate,
    #[serde(flatten)]
    pub terms: ApproveContractRequest,
}

impl From<CreateContractRequest> for NewContract {
    fn from(req: CreateContractRequest) -> Self {
        NewContract {
            client_id: req.client_id,
            apartment_id: req.apartment_id,
            term_months: req.term_months,
            due_day: req.due_day,
            start_date: req.start_date,
            terms: req.terms.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectContractRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelContractRequest {
    pub reason: String,
}

/// Tenant reports a payment
#[derive(Debug, Deserialize)]
pub struct SubmitPaymentRequest {
    /// Opaque reference returned by the document store
    pub evidence_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct MeterReadingRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub reading: Decimal,
}
