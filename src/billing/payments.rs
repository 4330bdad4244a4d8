//! Payment state machine for a single installment.
//!
//! ```text
//! PENDING ──submit──▶ AWAITING_CONFIRMATION ──confirm──▶ PAID
//!    ▲  │                      │
//!    │  └─mark late─▶ LATE ─submit─┘
//!    └────────reject───────────┘
//! ```
//!
//! Any non-terminal state may be cancelled or force-paid. PAID and
//! CANCELLED are terminal.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::AppCache;
use crate::error::{AppError, Result};
use crate::integrations::PixCharge;

use super::context::BillingContext;
use super::models::{Installment, InstallmentStatus, InstallmentUpdate};
use super::scanner::scan_overdue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Submit,
    Confirm,
    Reject,
    MarkLate,
    Cancel,
    ForcePaid,
    ForcePending,
}

/// Status an installment moves to when `event` is applied to `current`.
pub fn next_status(current: InstallmentStatus, event: PaymentEvent) -> Result<InstallmentStatus> {
    use crate::billing::models::InstallmentStatus::*;
    use PaymentEvent::*;

    if current.is_terminal() {
        return Err(AppError::Conflict(format!(
            "installment is {:?} and can no longer change",
            current
        )));
    }

    let next = match (current, event) {
        (Pending | Late, Submit) => AwaitingConfirmation,
        (AwaitingConfirmation, Confirm) => Paid,
        (AwaitingConfirmation, Reject) => Pending,
        (Pending, MarkLate) => Late,
        (Late | AwaitingConfirmation, ForcePending) => Pending,
        (_, Cancel) => Cancelled,
        (_, ForcePaid) => Paid,
        (current, event) => {
            return Err(AppError::Conflict(format!(
                "cannot apply {:?} to an installment in {:?}",
                event, current
            )))
        }
    };
    Ok(next)
}

/// Read, check and write one transition in its own unit of work.
async fn transition(
    ctx: &BillingContext,
    installment_id: Uuid,
    event: PaymentEvent,
    mut update: InstallmentUpdate,
) -> Result<Installment> {
    let mut uow = ctx.store.begin().await?;
    let installment = uow
        .installment(installment_id)
        .await?
        .ok_or_else(|| AppError::not_found("installment", installment_id))?;

    let next = next_status(installment.status, event)?;
    update.status = Some(next);

    let updated = uow.update_installment(installment_id, &update).await?;
    uow.commit().await?;

    info!(
        installment_id = %installment_id,
        from = ?installment.status,
        to = ?next,
        event = ?event,
        "Installment status changed"
    );
    Ok(updated)
}

/// Tenant reports a payment and attaches evidence.
pub async fn submit_payment(
    ctx: &BillingContext,
    installment_id: Uuid,
    evidence_ref: &str,
) -> Result<Installment> {
    let evidence_ref = evidence_ref.trim();
    if evidence_ref.is_empty() {
        return Err(AppError::InvalidArgument(
            "payment evidence reference is required".to_string(),
        ));
    }

    transition(
        ctx,
        installment_id,
        PaymentEvent::Submit,
        InstallmentUpdate {
            payment_evidence: Some(Some(evidence_ref.to_string())),
            ..InstallmentUpdate::default()
        },
    )
    .await
}

pub async fn confirm_payment(ctx: &BillingContext, installment_id: Uuid) -> Result<Installment> {
    transition(
        ctx,
        installment_id,
        PaymentEvent::Confirm,
        InstallmentUpdate {
            paid_at: Some(Some(ctx.clock.now())),
            ..InstallmentUpdate::default()
        },
    )
    .await
}

/// Send a submitted payment back to PENDING.
///
/// The overdue scan runs right after the rejection commits, so an
/// installment already past its due date comes back as LATE.
pub async fn reject_payment(ctx: &BillingContext, installment_id: Uuid) -> Result<Installment> {
    let rejected = transition(
        ctx,
        installment_id,
        PaymentEvent::Reject,
        InstallmentUpdate {
            payment_evidence: Some(None),
            ..InstallmentUpdate::default()
        },
    )
    .await?;

    if let Err(e) = scan_overdue(ctx, ctx.clock.now()).await {
        warn!(installment_id = %installment_id, error = %e, "Overdue scan after rejection failed");
        return Ok(rejected);
    }

    let mut uow = ctx.store.begin().await?;
    let current = uow
        .installment(installment_id)
        .await?
        .ok_or_else(|| AppError::not_found("installment", installment_id))?;
    Ok(current)
}

pub async fn force_mark_paid(ctx: &BillingContext, installment_id: Uuid) -> Result<Installment> {
    transition(
        ctx,
        installment_id,
        PaymentEvent::ForcePaid,
        InstallmentUpdate {
            paid_at: Some(Some(ctx.clock.now())),
            ..InstallmentUpdate::default()
        },
    )
    .await
}

pub async fn force_mark_pending(ctx: &BillingContext, installment_id: Uuid) -> Result<Installment> {
    transition(
        ctx,
        installment_id,
        PaymentEvent::ForcePending,
        InstallmentUpdate {
            payment_evidence: Some(None),
            ..InstallmentUpdate::default()
        },
    )
    .await
}

/// PIX charge for the installment's current total.
///
/// Read-only. Charges are cached per installment and total.
pub async fn payment_charge(ctx: &BillingContext, installment_id: Uuid) -> Result<Arc<PixCharge>> {
    let mut uow = ctx.store.begin().await?;
    let installment = uow
        .installment(installment_id)
        .await?
        .ok_or_else(|| AppError::not_found("installment", installment_id))?;
    drop(uow);

    if installment.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "installment {} is {:?}; no payment charge available",
            installment_id, installment.status
        )));
    }

    let total = installment.total_due();
    let cache_key = AppCache::pix_charge_key(installment_id, total);

    if let Some(cached) = ctx.cache.pix_charges.get(&cache_key).await {
        tracing::debug!("Cache HIT for PIX charge: {}", cache_key);
        return Ok(cached);
    }

    tracing::debug!("Cache MISS for PIX charge: {}", cache_key);
    let charge = Arc::new(ctx.qr.generate(&ctx.payee, total)?);
    ctx.cache
        .pix_charges
        .insert(cache_key, charge.clone())
        .await;
    Ok(charge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::billing::models::InstallmentStatus::*;

    const ALL_EVENTS: [PaymentEvent; 7] = [
        PaymentEvent::Submit,
        PaymentEvent::Confirm,
        PaymentEvent::Reject,
        PaymentEvent::MarkLate,
        PaymentEvent::Cancel,
        PaymentEvent::ForcePaid,
        PaymentEvent::ForcePending,
    ];

    #[test]
    fn test_happy_path() {
        let s = next_status(Pending, PaymentEvent::Submit).unwrap();
        assert_eq!(s, AwaitingConfirmation);
        assert_eq!(next_status(s, PaymentEvent::Confirm).unwrap(), Paid);
    }

    #[test]
    fn test_reject_returns_to_pending() {
        assert_eq!(
            next_status(AwaitingConfirmation, PaymentEvent::Reject).unwrap(),
            Pending
        );
    }

    #[test]
    fn test_late_can_still_be_paid() {
        assert_eq!(next_status(Pending, PaymentEvent::MarkLate).unwrap(), Late);
        assert_eq!(
            next_status(Late, PaymentEvent::Submit).unwrap(),
            AwaitingConfirmation
        );
    }

    #[test]
    fn test_terminal_states_reject_every_event() {
        for status in [Paid, Cancelled] {
            for event in ALL_EVENTS {
                let err = next_status(status, event).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Conflict, "{:?} {:?}", status, event);
            }
        }
    }

    #[test]
    fn test_out_of_order_events_conflict() {
        assert!(next_status(Pending, PaymentEvent::Confirm).is_err());
        assert!(next_status(Pending, PaymentEvent::Reject).is_err());
        assert!(next_status(Late, PaymentEvent::MarkLate).is_err());
        assert!(next_status(AwaitingConfirmation, PaymentEvent::Submit).is_err());
        assert!(next_status(AwaitingConfirmation, PaymentEvent::MarkLate).is_err());
        assert!(next_status(Pending, PaymentEvent::ForcePending).is_err());
    }

    #[test]
    fn test_overrides_from_any_open_state() {
        for status in [Pending, AwaitingConfirmation, Late] {
            assert_eq!(next_status(status, PaymentEvent::ForcePaid).unwrap(), Paid);
            assert_eq!(next_status(status, PaymentEvent::Cancel).unwrap(), Cancelled);
        }
        assert_eq!(next_status(Late, PaymentEvent::ForcePending).unwrap(), Pending);
    }
}
