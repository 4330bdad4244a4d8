//! Collaborators the billing engine talks to through narrow interfaces.

pub mod notifier;
pub mod pix;

pub use notifier::{notify_best_effort, LogNotifier, NotificationTemplate, Notifier, RecordingNotifier};
pub use pix::{PayeeInfo, PaymentQrGenerator, PixCharge, PixQrGenerator};
