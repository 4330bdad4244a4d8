use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use tokio::time::sleep;

use crate::billing::scanner::run_daily_jobs;
use crate::AppState;

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Run the daily billing jobs once per calendar day.
///
/// The job set runs in its own `tokio::spawn` so a panic inside it never
/// stops the loop. Jobs fire on the first poll at or after
/// `DAILY_JOBS_HOUR_UTC`.
pub async fn run_background_scheduler(state: AppState) {
    let run_hour = state.config.daily_jobs_hour_utc;
    tracing::info!(run_hour, "Background scheduler started");

    let mut last_daily_run: Option<(i32, u32)> = None;

    loop {
        sleep(POLL_INTERVAL).await;

        let now = state.billing.clock.now();
        let today = (now.year(), now.ordinal());
        if last_daily_run == Some(today) || now.hour() < run_hour {
            continue;
        }
        last_daily_run = Some(today);

        tracing::info!("Scheduler: running daily jobs for {}", now.date_naive());
        let ctx = state.billing.clone();
        let handle = tokio::spawn(async move {
            let started = Utc::now();
            let report = run_daily_jobs(&ctx, now).await;
            tracing::info!(
                overdue = report.overdue.updated,
                penalties = report.penalties.updated,
                ended = report.expired_contracts.updated,
                occupancy_fixed = report.occupancy.updated,
                client_reminders = report.reminders.client.updated,
                admin_reminders = report.reminders.admin.updated,
                elapsed_ms = (Utc::now() - started).num_milliseconds(),
                "Scheduler: daily jobs completed"
            );
        });

        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Scheduler: daily jobs task aborted");
        }
    }
}
