//! Outbound notifications.
//!
//! The engine sends notifications after a state transition has committed.
//! Delivery problems are logged and never undo the transition.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTemplate {
    ContractApproved,
    ContractRejected,
    ContractCancelled,
    PaymentDueSoon,
    EnergyReadingDue,
}

impl NotificationTemplate {
    pub fn template_id(self) -> &'static str {
        match self {
            Self::ContractApproved => "contract_approved",
            Self::ContractRejected => "contract_rejected",
            Self::ContractCancelled => "contract_cancelled",
            Self::PaymentDueSoon => "payment_due_soon",
            Self::EnergyReadingDue => "energy_reading_due",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template: NotificationTemplate,
        params: Value,
    ) -> Result<(), NotifyError>;
}

/// Send and swallow the outcome, logging failures.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    recipient: &str,
    template: NotificationTemplate,
    params: Value,
) {
    if let Err(e) = notifier.send(recipient, template, params).await {
        warn!(
            recipient,
            template = template.template_id(),
            error = %e,
            "Notification failed"
        );
    }
}

/// Notifier that only writes to the log; used when no delivery channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &str,
        template: NotificationTemplate,
        params: Value,
    ) -> Result<(), NotifyError> {
        info!(
            recipient,
            template = template.template_id(),
            params = %params,
            "Notification queued"
        );
        Ok(())
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipient: String,
    pub template: NotificationTemplate,
    pub params: Value,
}

/// Keeps every notification in memory and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, template: NotificationTemplate) -> usize {
        self.sent()
            .iter()
            .filter(|n| n.template == template)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: &str,
        template: NotificationTemplate,
        params: Value,
    ) -> Result<(), NotifyError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(NotifyError::Delivery {
                recipient: recipient.to_string(),
                reason: "recording notifier set to fail".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotification {
                recipient: recipient.to_string(),
                template,
                params,
            });
        Ok(())
    }
}
