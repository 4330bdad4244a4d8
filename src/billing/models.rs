//! Database models for the billing engine.
//!
//! These models use sqlx's FromRow derive for direct database deserialization.
//! Status enums map onto Postgres enum types declared in `migrations/`.

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "contract_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    AwaitingApproval,
    Active,
    Cancelled,
    Ended,
}

impl ContractStatus {
    /// Open contracts block any other contract for the same client or apartment.
    pub fn is_open(self) -> bool {
        matches!(self, ContractStatus::AwaitingApproval | ContractStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "installment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentStatus {
    Pending,
    AwaitingConfirmation,
    Paid,
    Late,
    Cancelled,
}

impl InstallmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstallmentStatus::Paid | InstallmentStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "installment_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentKind {
    Deposit,
    Rent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "occupancy_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupancyStatus {
    Vacant,
    Awaiting,
    Occupied,
}

/// Apartment joined with its building's energy price.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Apartment {
    pub id: Uuid,
    pub number: String,
    pub building_id: Uuid,
    pub status: OccupancyStatus,
    #[serde(with = "rust_decimal::serde::str")]
    pub energy_price_per_unit: Decimal,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Contract {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub client_id: Uuid,
    pub term_months: i32,
    pub due_day: i32,
    pub start_date: NaiveDate,
    /// Unknown until an administrator approves a solicited contract.
    pub rent_amount: Option<Decimal>,
    pub adjustment_period_months: Option<i32>,
    /// Monthly free energy units, only read by the allowance strategy.
    pub energy_allowance: Option<Decimal>,
    pub energy_credit: Decimal,
    pub meter_reading: Decimal,
    pub status: ContractStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Last day covered by the term: start advanced by the term length.
    pub fn end_date(&self) -> Option<NaiveDate> {
        u32::try_from(self.term_months)
            .ok()
            .and_then(|months| self.start_date.checked_add_months(Months::new(months)))
    }

    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.end_date().is_some_and(|end| end < today)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Installment {
    pub id: Uuid,
    pub contract_id: Uuid,
    /// Position in the schedule: 0 for the deposit, 1..N for rent.
    pub sequence: i32,
    /// 0 for the deposit, otherwise the calendar month (1-12) of the due date.
    pub reference_month: i32,
    pub kind: InstallmentKind,
    pub due_date: NaiveDate,
    pub base_amount: Decimal,
    pub energy_consumption: Option<Decimal>,
    pub energy_surcharge: Decimal,
    pub penalty: Decimal,
    pub status: InstallmentStatus,
    pub payment_evidence: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub client_reminded_at: Option<DateTime<Utc>>,
    pub client_reminder_attempts: i32,
    pub admin_reminded_at: Option<DateTime<Utc>>,
    pub admin_reminder_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Installment {
    pub fn total_due(&self) -> Decimal {
        self.base_amount + self.energy_surcharge + self.penalty
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TenancyRecord {
    pub id: Uuid,
    pub apartment_id: Uuid,
    pub client_id: Uuid,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub exit_reason: String,
}

/// Field-level patch for a contract. `None` leaves the column untouched;
/// nullable columns take `Some(None)` to clear.
#[derive(Debug, Clone, Default)]
pub struct ContractUpdate {
    pub status: Option<ContractStatus>,
    pub rent_amount: Option<Decimal>,
    pub adjustment_period_months: Option<Option<i32>>,
    pub energy_allowance: Option<Option<Decimal>>,
    pub energy_credit: Option<Decimal>,
    pub meter_reading: Option<Decimal>,
    pub cancellation_reason: Option<Option<String>>,
}

impl ContractUpdate {
    pub fn apply(&self, contract: &mut Contract) {
        if let Some(status) = self.status {
            contract.status = status;
        }
        if let Some(rent) = self.rent_amount {
            contract.rent_amount = Some(rent);
        }
        if let Some(period) = self.adjustment_period_months {
            contract.adjustment_period_months = period;
        }
        if let Some(allowance) = self.energy_allowance {
            contract.energy_allowance = allowance;
        }
        if let Some(credit) = self.energy_credit {
            contract.energy_credit = credit;
        }
        if let Some(reading) = self.meter_reading {
            contract.meter_reading = reading;
        }
        if let Some(reason) = &self.cancellation_reason {
            contract.cancellation_reason = reason.clone();
        }
    }
}

/// Field-level patch for an installment, same conventions as [`ContractUpdate`].
#[derive(Debug, Clone, Default)]
pub struct InstallmentUpdate {
    pub status: Option<InstallmentStatus>,
    pub energy_consumption: Option<Option<Decimal>>,
    pub energy_surcharge: Option<Decimal>,
    pub penalty: Option<Decimal>,
    pub payment_evidence: Option<Option<String>>,
    pub paid_at: Option<Option<DateTime<Utc>>>,
    pub client_reminded_at: Option<Option<DateTime<Utc>>>,
    pub client_reminder_attempts: Option<i32>,
    pub admin_reminded_at: Option<Option<DateTime<Utc>>>,
    pub admin_reminder_attempts: Option<i32>,
}

impl InstallmentUpdate {
    pub fn status(status: InstallmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, installment: &mut Installment) {
        if let Some(status) = self.status {
            installment.status = status;
        }
        if let Some(consumption) = self.energy_consumption {
            installment.energy_consumption = consumption;
        }
        if let Some(surcharge) = self.energy_surcharge {
            installment.energy_surcharge = surcharge;
        }
        if let Some(penalty) = self.penalty {
            installment.penalty = penalty;
        }
        if let Some(evidence) = &self.payment_evidence {
            installment.payment_evidence = evidence.clone();
        }
        if let Some(paid_at) = self.paid_at {
            installment.paid_at = paid_at;
        }
        if let Some(at) = self.client_reminded_at {
            installment.client_reminded_at = at;
        }
        if let Some(attempts) = self.client_reminder_attempts {
            installment.client_reminder_attempts = attempts;
        }
        if let Some(at) = self.admin_reminded_at {
            installment.admin_reminded_at = at;
        }
        if let Some(attempts) = self.admin_reminder_attempts {
            installment.admin_reminder_attempts = attempts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn contract(start: NaiveDate, term_months: i32) -> Contract {
        Contract {
            id: Uuid::new_v4(),
            apartment_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            term_months,
            due_day: 10,
            start_date: start,
            rent_amount: Some(dec!(1000)),
            adjustment_period_months: None,
            energy_allowance: None,
            energy_credit: Decimal::ZERO,
            meter_reading: Decimal::ZERO,
            status: ContractStatus::Active,
            cancellation_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_contract_expires_strictly_after_term() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let c = contract(start, 6);
        assert_eq!(c.end_date(), NaiveDate::from_ymd_opt(2024, 7, 10));
        assert!(!c.is_expired_on(NaiveDate::from_ymd_opt(2024, 7, 10).unwrap()));
        assert!(c.is_expired_on(NaiveDate::from_ymd_opt(2024, 7, 11).unwrap()));
    }

    #[test]
    fn test_status_classification() {
        assert!(ContractStatus::Active.is_open());
        assert!(ContractStatus::AwaitingApproval.is_open());
        assert!(!ContractStatus::Ended.is_open());
        assert!(InstallmentStatus::Paid.is_terminal());
        assert!(InstallmentStatus::Cancelled.is_terminal());
        assert!(!InstallmentStatus::Late.is_terminal());
    }

    #[test]
    fn test_update_clears_nullable_fields() {
        let mut c = contract(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(), 6);
        c.cancellation_reason = Some("old".to_string());
        let update = ContractUpdate {
            cancellation_reason: Some(None),
            meter_reading: Some(dec!(150)),
            ..ContractUpdate::default()
        };
        update.apply(&mut c);
        assert_eq!(c.cancellation_reason, None);
        assert_eq!(c.meter_reading, dec!(150));
        assert_eq!(c.status, ContractStatus::Active);
    }
}
