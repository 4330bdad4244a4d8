//! Installment schedule generation.
//!
//! A contract of N months owns N+1 installments: a deposit due three days
//! after the start date, then one rent installment per month on the
//! contract's due day.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::calculators::last_day_of_month;
use super::models::{Installment, InstallmentKind, InstallmentStatus};

pub const DEPOSIT_DUE_AFTER_DAYS: i64 = 3;

/// Inputs the generator needs from a contract.
#[derive(Debug, Clone)]
pub struct ScheduleTerms {
    pub contract_id: Uuid,
    pub start_date: NaiveDate,
    pub due_day: u32,
    pub term_months: u32,
    pub rent_amount: Decimal,
}

/// Due date of the `offset`-th rent installment.
///
/// Walks month by month from the start month and places the installment on
/// `due_day`, clamped to the last day of months that are too short. The due
/// day is not lost after a short month: due-day 31 gives Feb 29 then Mar 31.
pub fn rent_due_date(start_date: NaiveDate, due_day: u32, offset: u32) -> Option<NaiveDate> {
    let month_start = start_date
        .with_day(1)?
        .checked_add_months(Months::new(offset))?;
    let last_day = last_day_of_month(month_start.year(), month_start.month())?;
    month_start.with_day(due_day.min(last_day))
}

pub fn deposit_due_date(start_date: NaiveDate) -> Option<NaiveDate> {
    start_date.checked_add_signed(Duration::days(DEPOSIT_DUE_AFTER_DAYS))
}

/// Build the full schedule for a contract term.
///
/// Rent installments carry the calendar month of their due date as
/// `reference_month`, so the value repeats or wraps once a term crosses a
/// year boundary. `sequence` is the stable position in the schedule.
pub fn generate_schedule(terms: &ScheduleTerms, created_at: DateTime<Utc>) -> Result<Vec<Installment>> {
    let deposit_due = deposit_due_date(terms.start_date)
        .ok_or_else(|| AppError::InvalidArgument("start date out of range".to_string()))?;

    let mut installments = Vec::with_capacity(terms.term_months as usize + 1);
    installments.push(new_installment(
        terms,
        0,
        0,
        InstallmentKind::Deposit,
        deposit_due,
        created_at,
    ));

    for offset in 1..=terms.term_months {
        let due_date = rent_due_date(terms.start_date, terms.due_day, offset).ok_or_else(|| {
            AppError::InvalidArgument(format!("cannot schedule installment {}", offset))
        })?;
        installments.push(new_installment(
            terms,
            offset as i32,
            due_date.month() as i32,
            InstallmentKind::Rent,
            due_date,
            created_at,
        ));
    }

    Ok(installments)
}

fn new_installment(
    terms: &ScheduleTerms,
    sequence: i32,
    reference_month: i32,
    kind: InstallmentKind,
    due_date: NaiveDate,
    created_at: DateTime<Utc>,
) -> Installment {
    Installment {
        id: Uuid::new_v4(),
        contract_id: terms.contract_id,
        sequence,
        reference_month,
        kind,
        due_date,
        base_amount: terms.rent_amount,
        energy_consumption: None,
        energy_surcharge: Decimal::ZERO,
        penalty: Decimal::ZERO,
        status: InstallmentStatus::Pending,
        payment_evidence: None,
        paid_at: None,
        client_reminded_at: None,
        client_reminder_attempts: 0,
        admin_reminded_at: None,
        admin_reminder_attempts: 0,
        created_at,
        updated_at: created_at,
    }
}
