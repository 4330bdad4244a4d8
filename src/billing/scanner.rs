//! Daily batch passes: overdue detection, penalty compounding and due-date
//! reminders.
//!
//! Every pass lists its candidates first, then handles each row in its own
//! unit of work that re-reads the row and writes only if it is still
//! eligible. A failing row is logged and counted; the pass moves on.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::integrations::NotificationTemplate;

use super::calculators::{compound_penalty, is_overdue, months_late};
use super::context::BillingContext;
use super::contracts::{reconcile_occupancy, scan_expired_contracts};
use super::models::{ContractStatus, Installment, InstallmentKind, InstallmentStatus, InstallmentUpdate};
use super::payments::{next_status, PaymentEvent};

/// Client reminders go out for installments due within this many days.
pub const CLIENT_REMINDER_DAYS: i64 = 3;
/// Admin energy-reading reminders look this far ahead.
pub const ADMIN_REMINDER_DAYS: i64 = 7;
pub const MAX_REMINDER_ATTEMPTS: i32 = 3;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub examined: usize,
    pub updated: usize,
    pub failed: usize,
}

impl ScanSummary {
    fn record(&mut self, outcome: Result<bool>, pass: &str, id: Uuid) {
        self.examined += 1;
        match outcome {
            Ok(true) => self.updated += 1,
            Ok(false) => {}
            Err(e) => {
                self.failed += 1;
                warn!(pass, row_id = %id, error = %e, "Batch row failed");
            }
        }
    }

    fn log(&self, pass: &str) {
        info!(
            pass,
            examined = self.examined,
            updated = self.updated,
            failed = self.failed,
            "Batch pass completed"
        );
    }
}

async fn installments_with_status(
    ctx: &BillingContext,
    status: InstallmentStatus,
) -> Result<Vec<Installment>> {
    let mut uow = ctx.store.begin().await?;
    let rows = uow.installments_with_status(status).await?;
    Ok(rows)
}

/// Flip every PENDING installment whose due day has started to LATE.
pub async fn scan_overdue(ctx: &BillingContext, now: DateTime<Utc>) -> Result<ScanSummary> {
    let mut summary = ScanSummary::default();

    for candidate in installments_with_status(ctx, InstallmentStatus::Pending).await? {
        if !is_overdue(candidate.due_date, now) {
            continue;
        }
        summary.record(mark_late(ctx, candidate.id, now).await, "overdue", candidate.id);
    }

    summary.log("overdue");
    Ok(summary)
}

async fn mark_late(ctx: &BillingContext, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let mut uow = ctx.store.begin().await?;
    let Some(current) = uow.installment(id).await? else {
        return Ok(false);
    };
    if current.status != InstallmentStatus::Pending || !is_overdue(current.due_date, now) {
        return Ok(false);
    }

    let status = next_status(current.status, PaymentEvent::MarkLate)?;
    uow.update_installment(id, &InstallmentUpdate::status(status))
        .await?;
    uow.commit().await?;
    Ok(true)
}

/// Recompute the penalty of every LATE installment for the elapsed whole
/// months. Re-running on the same day changes nothing.
pub async fn compound_penalties(ctx: &BillingContext, now: DateTime<Utc>) -> Result<ScanSummary> {
    let today = now.date_naive();
    let mut summary = ScanSummary::default();

    for candidate in installments_with_status(ctx, InstallmentStatus::Late).await? {
        summary.record(
            apply_penalty(ctx, candidate.id, today).await,
            "penalties",
            candidate.id,
        );
    }

    summary.log("penalties");
    Ok(summary)
}

async fn apply_penalty(ctx: &BillingContext, id: Uuid, today: NaiveDate) -> Result<bool> {
    let mut uow = ctx.store.begin().await?;
    let Some(current) = uow.installment(id).await? else {
        return Ok(false);
    };
    if current.status != InstallmentStatus::Late {
        return Ok(false);
    }

    let penalty = compound_penalty(current.base_amount, months_late(current.due_date, today));
    if penalty == current.penalty {
        return Ok(false);
    }

    uow.update_installment(
        id,
        &InstallmentUpdate {
            penalty: Some(penalty),
            ..InstallmentUpdate::default()
        },
    )
    .await?;
    uow.commit().await?;
    Ok(true)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReminderSummary {
    pub client: ScanSummary,
    pub admin: ScanSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Client,
    Admin,
}

impl Audience {
    fn label(self) -> &'static str {
        match self {
            Audience::Client => "client reminders",
            Audience::Admin => "admin reminders",
        }
    }
}

// Due today is already overdue, so the window starts tomorrow.
fn within(due: NaiveDate, today: NaiveDate, days: i64) -> bool {
    due > today && due <= today + Duration::days(days)
}

fn wants_client_reminder(installment: &Installment, today: NaiveDate) -> bool {
    installment.status == InstallmentStatus::Pending
        && installment.client_reminded_at.is_none()
        && installment.client_reminder_attempts < MAX_REMINDER_ATTEMPTS
        && within(installment.due_date, today, CLIENT_REMINDER_DAYS)
}

fn wants_admin_reminder(installment: &Installment, today: NaiveDate) -> bool {
    installment.status == InstallmentStatus::Pending
        && installment.kind == InstallmentKind::Rent
        && installment.energy_consumption.is_none()
        && installment.admin_reminded_at.is_none()
        && installment.admin_reminder_attempts < MAX_REMINDER_ATTEMPTS
        && within(installment.due_date, today, ADMIN_REMINDER_DAYS)
}

/// Send the payment-due reminder to tenants and the energy-reading reminder
/// to the administrator.
///
/// Each reminder is sent once. A failed send is retried on later runs until
/// [`MAX_REMINDER_ATTEMPTS`] is reached.
pub async fn send_due_reminders(ctx: &BillingContext, now: DateTime<Utc>) -> Result<ReminderSummary> {
    let today = now.date_naive();
    let mut summary = ReminderSummary::default();

    for candidate in installments_with_status(ctx, InstallmentStatus::Pending).await? {
        if wants_client_reminder(&candidate, today) {
            summary.client.record(
                remind(ctx, &candidate, Audience::Client, now).await,
                Audience::Client.label(),
                candidate.id,
            );
        }
        if ctx.admin_recipient.is_some() && wants_admin_reminder(&candidate, today) {
            summary.admin.record(
                remind(ctx, &candidate, Audience::Admin, now).await,
                Audience::Admin.label(),
                candidate.id,
            );
        }
    }

    summary.client.log(Audience::Client.label());
    summary.admin.log(Audience::Admin.label());
    Ok(summary)
}

async fn remind(
    ctx: &BillingContext,
    installment: &Installment,
    audience: Audience,
    now: DateTime<Utc>,
) -> Result<bool> {
    let (recipient, template, params) = {
        let mut uow = ctx.store.begin().await?;
        let contract = uow
            .contract(installment.contract_id)
            .await?
            .ok_or_else(|| AppError::not_found("contract", installment.contract_id))?;
        if contract.status != ContractStatus::Active {
            return Ok(false);
        }
        let apartment = uow
            .apartment(contract.apartment_id)
            .await?
            .ok_or_else(|| AppError::not_found("apartment", contract.apartment_id))?;

        match audience {
            Audience::Client => {
                let client = uow
                    .client(contract.client_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("client", contract.client_id))?;
                let params = json!({
                    "client_name": client.name,
                    "apartment": apartment.number,
                    "installment_id": installment.id,
                    "due_date": installment.due_date,
                    "total": installment.total_due().to_string(),
                });
                (client.email, NotificationTemplate::PaymentDueSoon, params)
            }
            Audience::Admin => {
                let Some(admin) = ctx.admin_recipient.clone() else {
                    return Ok(false);
                };
                let params = json!({
                    "apartment": apartment.number,
                    "contract_id": contract.id,
                    "installment_id": installment.id,
                    "due_date": installment.due_date,
                });
                (admin, NotificationTemplate::EnergyReadingDue, params)
            }
        }
    };

    let sent = ctx.notifier.send(&recipient, template, params).await;

    let mut uow = ctx.store.begin().await?;
    let Some(current) = uow.installment(installment.id).await? else {
        return Ok(false);
    };
    let stamp = sent.as_ref().ok().map(|_| now);
    let update = match audience {
        Audience::Client => InstallmentUpdate {
            client_reminded_at: Some(stamp),
            client_reminder_attempts: Some(current.client_reminder_attempts + 1),
            ..InstallmentUpdate::default()
        },
        Audience::Admin => InstallmentUpdate {
            admin_reminded_at: Some(stamp),
            admin_reminder_attempts: Some(current.admin_reminder_attempts + 1),
            ..InstallmentUpdate::default()
        },
    };
    uow.update_installment(installment.id, &update).await?;
    uow.commit().await?;

    sent.map(|_| true).map_err(|e| AppError::Internal(e.to_string()))
}

/// Outcome of one run of the daily job set.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct DailyJobsReport {
    pub overdue: ScanSummary,
    pub penalties: ScanSummary,
    pub expired_contracts: ScanSummary,
    pub occupancy: ScanSummary,
    pub reminders: ReminderSummary,
}

/// Run every daily pass in order. Overdue detection runs before penalty
/// compounding so installments that just became LATE are charged the same
/// day. A pass that fails outright is logged and leaves its summary empty.
pub async fn run_daily_jobs(ctx: &BillingContext, now: DateTime<Utc>) -> DailyJobsReport {
    let mut report = DailyJobsReport::default();

    match scan_overdue(ctx, now).await {
        Ok(s) => report.overdue = s,
        Err(e) => warn!(error = %e, "Overdue scan failed"),
    }
    match compound_penalties(ctx, now).await {
        Ok(s) => report.penalties = s,
        Err(e) => warn!(error = %e, "Penalty compounding failed"),
    }
    match scan_expired_contracts(ctx, now).await {
        Ok(s) => report.expired_contracts = s,
        Err(e) => warn!(error = %e, "Contract expiry scan failed"),
    }
    match reconcile_occupancy(ctx).await {
        Ok(s) => report.occupancy = s,
        Err(e) => warn!(error = %e, "Occupancy reconciliation failed"),
    }
    match send_due_reminders(ctx, now).await {
        Ok(s) => report.reminders = s,
        Err(e) => warn!(error = %e, "Due reminders failed"),
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn installment(kind: InstallmentKind, due: NaiveDate) -> Installment {
        Installment {
            id: Uuid::new_v4(),
            contract_id: Uuid::new_v4(),
            sequence: 1,
            reference_month: 2,
            kind,
            due_date: due,
            base_amount: dec!(1000),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_client_reminder_window_covers_next_three_days() {
        let today = date(2024, 2, 7);
        assert!(!wants_client_reminder(&installment(InstallmentKind::Rent, today), today));
        assert!(wants_client_reminder(
            &installment(InstallmentKind::Rent, date(2024, 2, 8)),
            today
        ));
        assert!(wants_client_reminder(
            &installment(InstallmentKind::Rent, date(2024, 2, 10)),
            today
        ));
        assert!(!wants_client_reminder(
            &installment(InstallmentKind::Rent, date(2024, 2, 11)),
            today
        ));
        assert!(!wants_client_reminder(
            &installment(InstallmentKind::Rent, date(2024, 2, 6)),
            today
        ));
    }

    #[test]
    fn test_client_reminder_respects_attempts_and_stamp() {
        let today = date(2024, 2, 7);
        let due = date(2024, 2, 9);
        assert!(wants_client_reminder(&installment(InstallmentKind::Rent, due), today));

        let mut i = installment(InstallmentKind::Rent, due);
        i.client_reminder_attempts = MAX_REMINDER_ATTEMPTS;
        assert!(!wants_client_reminder(&i, today));

        let mut i = installment(InstallmentKind::Rent, due);
        i.client_reminded_at = Some(Utc::now());
        assert!(!wants_client_reminder(&i, today));
    }

    #[test]
    fn test_admin_reminder_only_for_unread_rent() {
        let today = date(2024, 2, 3);
        let due = date(2024, 2, 10);
        assert!(wants_admin_reminder(&installment(InstallmentKind::Rent, due), today));
        assert!(!wants_admin_reminder(&installment(InstallmentKind::Deposit, due), today));

        let mut read = installment(InstallmentKind::Rent, due);
        read.energy_consumption = Some(dec!(30));
        assert!(!wants_admin_reminder(&read, today));

        assert!(!wants_admin_reminder(&installment(InstallmentKind::Rent, today), today));
    }
}
