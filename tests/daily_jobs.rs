mod common;

use rust_decimal_macros::dec;

use common::{date, Harness, ADMIN_EMAIL};
use flat_lease_billing::billing::models::ContractStatus;
use flat_lease_billing::billing::scanner::MAX_REMINDER_ATTEMPTS;
use flat_lease_billing::billing::{
    cancel_contract, contract_detail, record_meter_reading, run_daily_jobs, send_due_reminders,
};
use flat_lease_billing::integrations::NotificationTemplate;

// ==================== reminder tests ====================

#[tokio::test]
async fn test_reminders_sent_once() {
    let h = Harness::on(date(2024, 1, 2));
    let detail = h.active_contract(date(2024, 1, 10), 6, 10).await;
    let february = detail.installments[1].id;

    let summary = send_due_reminders(&h.ctx, h.at(date(2024, 2, 7))).await.unwrap();
    assert_eq!(summary.client.updated, 1);
    assert_eq!(summary.admin.updated, 1);

    let sent = h.notifier.sent();
    let client = sent
        .iter()
        .find(|n| n.template == NotificationTemplate::PaymentDueSoon)
        .unwrap();
    assert!(client.recipient.ends_with("@tenant.example"));
    assert_eq!(client.params["installment_id"], february.to_string());
    let admin = sent
        .iter()
        .find(|n| n.template == NotificationTemplate::EnergyReadingDue)
        .unwrap();
    assert_eq!(admin.recipient, ADMIN_EMAIL);

    let stamped = h.installment(february).await;
    assert!(stamped.client_reminded_at.is_some());
    assert!(stamped.admin_reminded_at.is_some());

    let again = send_due_reminders(&h.ctx, h.at(date(2024, 2, 8))).await.unwrap();
    assert_eq!(again.client.examined, 0);
    assert_eq!(again.admin.examined, 0);
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn test_admin_window_opens_before_client_window() {
    let h = Harness::on(date(2024, 1, 2));
    h.active_contract(date(2024, 1, 10), 6, 10).await;

    send_due_reminders(&h.ctx, h.at(date(2024, 2, 3))).await.unwrap();

    assert_eq!(h.notifier.count(NotificationTemplate::EnergyReadingDue), 1);
    assert_eq!(h.notifier.count(NotificationTemplate::PaymentDueSoon), 0);
}

#[tokio::test]
async fn test_admin_reminder_skipped_after_reading() {
    let h = Harness::on(date(2024, 1, 2));
    let detail = h.active_contract(date(2024, 1, 10), 6, 10).await;
    record_meter_reading(&h.ctx, detail.installments[1].id, dec!(150))
        .await
        .unwrap();

    send_due_reminders(&h.ctx, h.at(date(2024, 2, 3))).await.unwrap();

    assert_eq!(h.notifier.count(NotificationTemplate::EnergyReadingDue), 0);
}

#[tokio::test]
async fn test_admin_reminder_needs_recipient() {
    let mut h = Harness::on(date(2024, 1, 2));
    h.ctx.admin_recipient = None;
    h.active_contract(date(2024, 1, 10), 6, 10).await;

    let summary = send_due_reminders(&h.ctx, h.at(date(2024, 2, 3))).await.unwrap();

    assert_eq!(summary.admin.examined, 0);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_failed_reminder_retried_until_attempts_exhausted() {
    let h = Harness::on(date(2024, 1, 2));
    let detail = h.active_contract(date(2024, 1, 10), 6, 10).await;
    let february = detail.installments[1].id;

    h.notifier.set_failing(true);
    for _ in 0..MAX_REMINDER_ATTEMPTS {
        let summary = send_due_reminders(&h.ctx, h.at(date(2024, 2, 8))).await.unwrap();
        assert_eq!(summary.client.failed, 1);
    }
    h.notifier.set_failing(false);

    let exhausted = h.installment(february).await;
    assert_eq!(exhausted.client_reminder_attempts, MAX_REMINDER_ATTEMPTS);
    assert!(exhausted.client_reminded_at.is_none());

    let summary = send_due_reminders(&h.ctx, h.at(date(2024, 2, 8))).await.unwrap();
    assert_eq!(summary.client.examined, 0);
    assert_eq!(h.notifier.count(NotificationTemplate::PaymentDueSoon), 0);
}

#[tokio::test]
async fn test_retry_succeeds_after_transient_failure() {
    let h = Harness::on(date(2024, 1, 2));
    let detail = h.active_contract(date(2024, 1, 10), 6, 10).await;
    let february = detail.installments[1].id;

    h.notifier.set_failing(true);
    send_due_reminders(&h.ctx, h.at(date(2024, 2, 8))).await.unwrap();
    h.notifier.set_failing(false);
    send_due_reminders(&h.ctx, h.at(date(2024, 2, 9))).await.unwrap();

    let reminded = h.installment(february).await;
    assert_eq!(reminded.client_reminder_attempts, 2);
    assert!(reminded.client_reminded_at.is_some());
    assert_eq!(h.notifier.count(NotificationTemplate::PaymentDueSoon), 1);
}

#[tokio::test]
async fn test_no_reminders_for_closed_contracts() {
    let h = Harness::on(date(2024, 2, 1));
    let detail = h.active_contract(date(2024, 1, 10), 6, 10).await;
    // the January deposit is past due and stays owed after cancellation
    cancel_contract(&h.ctx, detail.contract.id, "moved out").await.unwrap();
    let before = h.notifier.sent().len();

    send_due_reminders(&h.ctx, h.at(date(2024, 2, 8))).await.unwrap();

    assert_eq!(h.notifier.sent().len(), before);
}

// ==================== daily run tests ====================

#[tokio::test]
async fn test_daily_run_report() {
    let h = Harness::on(date(2023, 9, 1));
    let expiring = h.active_contract(date(2023, 9, 10), 6, 10).await;
    h.active_contract(date(2023, 12, 10), 6, 10).await;

    let now = h.at(date(2024, 3, 15));
    let report = run_daily_jobs(&h.ctx, now).await;

    // 7 rows of the expiring contract and 4 of the running one
    assert_eq!(report.overdue.updated, 11);
    assert_eq!(report.penalties.updated, 9);
    assert_eq!(report.expired_contracts.updated, 1);
    assert_eq!(report.occupancy.updated, 0);

    let ended = contract_detail(&h.ctx, expiring.contract.id).await.unwrap();
    assert_eq!(ended.contract.status, ContractStatus::Ended);

    let again = run_daily_jobs(&h.ctx, now).await;
    assert_eq!(again.overdue.updated, 0);
    assert_eq!(again.penalties.updated, 0);
    assert_eq!(again.expired_contracts.updated, 0);
}
