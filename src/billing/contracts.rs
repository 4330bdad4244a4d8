//! Contract lifecycle.
//!
//! Owns every contract transition and is the only writer of an apartment's
//! occupancy status. Each transition runs in one unit of work: the contract
//! row, its installment schedule and the apartment status are committed
//! together or not at all. Client notifications go out after the commit.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::integrations::{notify_best_effort, NotificationTemplate};

use super::calculators::is_overdue;
use super::context::BillingContext;
use super::models::{
    Contract, ContractStatus, ContractUpdate, Installment, InstallmentUpdate,
    OccupancyStatus, TenancyRecord,
};
use super::payments::{next_status, PaymentEvent};
use super::scanner::ScanSummary;
use super::schedule::{generate_schedule, ScheduleTerms};
use super::store::UnitOfWork;
use super::validation::{
    validate_adjustment_period, validate_due_day, validate_non_negative, validate_rent,
    validate_term,
};

pub const TERM_EXPIRED_REASON: &str = "term expired";

/// A tenant asking for an apartment. Rent is set later, on approval.
#[derive(Debug, Clone)]
pub struct ContractRequest {
    pub client_id: Uuid,
    pub apartment_id: Uuid,
    pub term_months: i32,
    pub due_day: i32,
    pub start_date: NaiveDate,
}

/// A contract an administrator creates directly, already active.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub client_id: Uuid,
    pub apartment_id: Uuid,
    pub term_months: i32,
    pub due_day: i32,
    pub start_date: NaiveDate,
    pub terms: ApprovalTerms,
}

/// Financial terms fixed when a contract becomes active.
#[derive(Debug, Clone)]
pub struct ApprovalTerms {
    pub rent_amount: Decimal,
    pub adjustment_period_months: Option<i32>,
    pub energy_allowance: Option<Decimal>,
    pub initial_meter_reading: Decimal,
}

impl ApprovalTerms {
    fn validate(&self) -> Result<()> {
        validate_rent(self.rent_amount)?;
        validate_adjustment_period(self.adjustment_period_months)?;
        if let Some(allowance) = self.energy_allowance {
            validate_non_negative("energy allowance", allowance)?;
        }
        validate_non_negative("initial meter reading", self.initial_meter_reading)
    }

    fn as_update(&self) -> ContractUpdate {
        ContractUpdate {
            status: Some(ContractStatus::Active),
            rent_amount: Some(self.rent_amount),
            adjustment_period_months: Some(self.adjustment_period_months),
            energy_allowance: Some(self.energy_allowance),
            energy_credit: Some(Decimal::ZERO),
            meter_reading: Some(self.initial_meter_reading),
            cancellation_reason: None,
        }
    }
}

/// A contract with its installments in schedule order.
#[derive(Debug, Clone)]
pub struct ContractDetail {
    pub contract: Contract,
    pub installments: Vec<Installment>,
}

fn schedule_for(contract: &Contract, now: DateTime<Utc>) -> Result<Vec<Installment>> {
    let rent_amount = contract
        .rent_amount
        .ok_or_else(|| AppError::Internal(format!("contract {} has no rent amount", contract.id)))?;
    let terms = ScheduleTerms {
        contract_id: contract.id,
        start_date: contract.start_date,
        due_day: u32::try_from(contract.due_day)
            .map_err(|_| AppError::InvalidArgument("due day out of range".to_string()))?,
        term_months: u32::try_from(contract.term_months)
            .map_err(|_| AppError::InvalidArgument("term out of range".to_string()))?,
        rent_amount,
    };
    generate_schedule(&terms, now)
}

/// NotFound for a missing client or apartment, Conflict when either already
/// has an open contract.
async fn check_parties(
    uow: &mut Box<dyn UnitOfWork>,
    client_id: Uuid,
    apartment_id: Uuid,
) -> Result<()> {
    uow.client(client_id)
        .await?
        .ok_or_else(|| AppError::not_found("client", client_id))?;
    uow.apartment(apartment_id)
        .await?
        .ok_or_else(|| AppError::not_found("apartment", apartment_id))?;

    if let Some(open) = uow.open_contract_for(client_id, apartment_id).await? {
        let holder = if open.apartment_id == apartment_id {
            "apartment"
        } else {
            "client"
        };
        return Err(AppError::Conflict(format!(
            "{} already has open contract {} ({:?})",
            holder, open.id, open.status
        )));
    }
    Ok(())
}

async fn load_contract(uow: &mut Box<dyn UnitOfWork>, id: Uuid) -> Result<Contract> {
    uow.contract(id)
        .await?
        .ok_or_else(|| AppError::not_found("contract", id))
}

async fn client_email(uow: &mut Box<dyn UnitOfWork>, client_id: Uuid) -> Result<String> {
    let client = uow
        .client(client_id)
        .await?
        .ok_or_else(|| AppError::not_found("client", client_id))?;
    Ok(client.email)
}

/// Client solicits an apartment: AWAITING_APPROVAL, apartment AWAITING.
pub async fn solicit_contract(ctx: &BillingContext, request: ContractRequest) -> Result<Contract> {
    validate_term(request.term_months)?;
    validate_due_day(request.due_day)?;

    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await?;
    check_parties(&mut uow, request.client_id, request.apartment_id).await?;

    let contract = Contract {
        id: Uuid::new_v4(),
        apartment_id: request.apartment_id,
        client_id: request.client_id,
        term_months: request.term_months,
        due_day: request.due_day,
        start_date: request.start_date,
        rent_amount: None,
        adjustment_period_months: None,
        energy_allowance: None,
        energy_credit: Decimal::ZERO,
        meter_reading: Decimal::ZERO,
        status: ContractStatus::AwaitingApproval,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
    };
    uow.insert_contract(&contract).await?;
    uow.set_apartment_status(contract.apartment_id, OccupancyStatus::Awaiting)
        .await?;
    uow.commit().await?;

    info!(
        contract_id = %contract.id,
        client_id = %contract.client_id,
        apartment_id = %contract.apartment_id,
        "Contract solicited"
    );
    Ok(contract)
}

/// Administrator creates an ACTIVE contract with its schedule in one step.
pub async fn create_contract(ctx: &BillingContext, new: NewContract) -> Result<ContractDetail> {
    validate_term(new.term_months)?;
    validate_due_day(new.due_day)?;
    new.terms.validate()?;

    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await?;
    check_parties(&mut uow, new.client_id, new.apartment_id).await?;

    let contract = Contract {
        id: Uuid::new_v4(),
        apartment_id: new.apartment_id,
        client_id: new.client_id,
        term_months: new.term_months,
        due_day: new.due_day,
        start_date: new.start_date,
        rent_amount: Some(new.terms.rent_amount),
        adjustment_period_months: new.terms.adjustment_period_months,
        energy_allowance: new.terms.energy_allowance,
        energy_credit: Decimal::ZERO,
        meter_reading: new.terms.initial_meter_reading,
        status: ContractStatus::Active,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
    };
    let installments = schedule_for(&contract, now)?;

    uow.insert_contract(&contract).await?;
    uow.insert_installments(&installments).await?;
    uow.set_apartment_status(contract.apartment_id, OccupancyStatus::Occupied)
        .await?;
    uow.commit().await?;

    info!(
        contract_id = %contract.id,
        installments = installments.len(),
        "Contract created"
    );
    Ok(ContractDetail {
        contract,
        installments,
    })
}

/// AWAITING_APPROVAL -> ACTIVE with the supplied terms and a full schedule.
pub async fn approve_contract(
    ctx: &BillingContext,
    contract_id: Uuid,
    terms: ApprovalTerms,
) -> Result<ContractDetail> {
    terms.validate()?;

    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await?;
    let contract = load_contract(&mut uow, contract_id).await?;
    if contract.status != ContractStatus::AwaitingApproval {
        return Err(AppError::Conflict(format!(
            "contract {} is {:?}, only AWAITING_APPROVAL can be approved",
            contract_id, contract.status
        )));
    }

    let contract = uow.update_contract(contract_id, &terms.as_update()).await?;
    let installments = schedule_for(&contract, now)?;
    uow.insert_installments(&installments).await?;
    uow.set_apartment_status(contract.apartment_id, OccupancyStatus::Occupied)
        .await?;
    let recipient = client_email(&mut uow, contract.client_id).await?;
    uow.commit().await?;

    info!(
        contract_id = %contract_id,
        rent = %terms.rent_amount,
        installments = installments.len(),
        "Contract approved"
    );

    notify_best_effort(
        ctx.notifier.as_ref(),
        &recipient,
        NotificationTemplate::ContractApproved,
        json!({
            "contract_id": contract_id,
            "start_date": contract.start_date,
            "rent_amount": terms.rent_amount.to_string(),
        }),
    )
    .await;

    Ok(ContractDetail {
        contract,
        installments,
    })
}

/// AWAITING_APPROVAL -> CANCELLED, apartment back to VACANT.
pub async fn reject_contract(
    ctx: &BillingContext,
    contract_id: Uuid,
    reason: Option<String>,
) -> Result<Contract> {
    let mut uow = ctx.store.begin().await?;
    let contract = load_contract(&mut uow, contract_id).await?;
    if contract.status != ContractStatus::AwaitingApproval {
        return Err(AppError::Conflict(format!(
            "contract {} is {:?}, only AWAITING_APPROVAL can be rejected",
            contract_id, contract.status
        )));
    }

    let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let contract = uow
        .update_contract(
            contract_id,
            &ContractUpdate {
                status: Some(ContractStatus::Cancelled),
                cancellation_reason: Some(reason.clone()),
                ..ContractUpdate::default()
            },
        )
        .await?;
    uow.set_apartment_status(contract.apartment_id, OccupancyStatus::Vacant)
        .await?;
    let recipient = client_email(&mut uow, contract.client_id).await?;
    uow.commit().await?;

    info!(contract_id = %contract_id, "Contract rejected");

    notify_best_effort(
        ctx.notifier.as_ref(),
        &recipient,
        NotificationTemplate::ContractRejected,
        json!({ "contract_id": contract_id, "reason": reason }),
    )
    .await;

    Ok(contract)
}

/// ACTIVE or AWAITING_APPROVAL -> CANCELLED.
///
/// Open installments whose due day has not started are cancelled with it;
/// overdue ones stay owed. PAID installments are never touched.
pub async fn cancel_contract(
    ctx: &BillingContext,
    contract_id: Uuid,
    reason: &str,
) -> Result<ContractDetail> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::InvalidArgument(
            "a cancellation reason is required".to_string(),
        ));
    }

    let now = ctx.clock.now();
    let mut uow = ctx.store.begin().await?;
    let contract = load_contract(&mut uow, contract_id).await?;
    if !contract.status.is_open() {
        return Err(AppError::Conflict(format!(
            "contract {} is already {:?}",
            contract_id, contract.status
        )));
    }

    let contract = uow
        .update_contract(
            contract_id,
            &ContractUpdate {
                status: Some(ContractStatus::Cancelled),
                cancellation_reason: Some(Some(reason.to_string())),
                ..ContractUpdate::default()
            },
        )
        .await?;

    let mut cancelled = 0usize;
    for installment in uow.installments_for_contract(contract_id).await? {
        if installment.status.is_terminal() || is_overdue(installment.due_date, now) {
            continue;
        }
        let status = next_status(installment.status, PaymentEvent::Cancel)?;
        uow.update_installment(installment.id, &InstallmentUpdate::status(status))
            .await?;
        cancelled += 1;
    }

    uow.set_apartment_status(contract.apartment_id, OccupancyStatus::Vacant)
        .await?;
    let recipient = client_email(&mut uow, contract.client_id).await?;
    let installments = uow.installments_for_contract(contract_id).await?;
    uow.commit().await?;

    info!(
        contract_id = %contract_id,
        cancelled_installments = cancelled,
        reason,
        "Contract cancelled"
    );

    notify_best_effort(
        ctx.notifier.as_ref(),
        &recipient,
        NotificationTemplate::ContractCancelled,
        json!({ "contract_id": contract_id, "reason": reason }),
    )
    .await;

    Ok(ContractDetail {
        contract,
        installments,
    })
}

/// End every ACTIVE contract whose term has run out before `now`.
pub async fn scan_expired_contracts(ctx: &BillingContext, now: DateTime<Utc>) -> Result<ScanSummary> {
    let today = now.date_naive();
    let candidates = {
        let mut uow = ctx.store.begin().await?;
        let active = uow.contracts_with_status(ContractStatus::Active).await?;
        active
    };

    let mut summary = ScanSummary::default();
    for contract in candidates {
        if !contract.is_expired_on(today) {
            continue;
        }
        summary.examined += 1;
        match expire_contract(ctx, contract.id, today).await {
            Ok(true) => summary.updated += 1,
            Ok(false) => {}
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(contract_id = %contract.id, error = %e, "Contract expiry failed");
            }
        }
    }

    info!(
        examined = summary.examined,
        ended = summary.updated,
        failed = summary.failed,
        "Contract expiry scan completed"
    );
    Ok(summary)
}

async fn expire_contract(ctx: &BillingContext, contract_id: Uuid, today: NaiveDate) -> Result<bool> {
    let mut uow = ctx.store.begin().await?;
    let Some(contract) = uow.contract(contract_id).await? else {
        return Ok(false);
    };
    if contract.status != ContractStatus::Active || !contract.is_expired_on(today) {
        return Ok(false);
    }

    uow.update_contract(
        contract_id,
        &ContractUpdate {
            status: Some(ContractStatus::Ended),
            energy_credit: Some(Decimal::ZERO),
            ..ContractUpdate::default()
        },
    )
    .await?;
    uow.set_apartment_status(contract.apartment_id, OccupancyStatus::Vacant)
        .await?;
    uow.insert_tenancy_record(&TenancyRecord {
        id: Uuid::new_v4(),
        apartment_id: contract.apartment_id,
        client_id: contract.client_id,
        entry_date: contract.start_date,
        exit_date: today,
        exit_reason: TERM_EXPIRED_REASON.to_string(),
    })
    .await?;
    uow.commit().await?;

    info!(contract_id = %contract_id, "Contract ended");
    Ok(true)
}

fn occupancy_for(status: ContractStatus) -> OccupancyStatus {
    match status {
        ContractStatus::Active => OccupancyStatus::Occupied,
        ContractStatus::AwaitingApproval => OccupancyStatus::Awaiting,
        ContractStatus::Cancelled | ContractStatus::Ended => OccupancyStatus::Vacant,
    }
}

async fn expected_occupancy(uow: &mut Box<dyn UnitOfWork>) -> Result<HashMap<Uuid, OccupancyStatus>> {
    let mut expected = HashMap::new();
    for status in [ContractStatus::AwaitingApproval, ContractStatus::Active] {
        for contract in uow.contracts_with_status(status).await? {
            expected.insert(contract.apartment_id, occupancy_for(status));
        }
    }
    Ok(expected)
}

/// Rewrite the occupancy of every apartment that drifted from its open
/// contract (none means VACANT).
pub async fn reconcile_occupancy(ctx: &BillingContext) -> Result<ScanSummary> {
    let drifted: Vec<Uuid> = {
        let mut uow = ctx.store.begin().await?;
        let expected = expected_occupancy(&mut uow).await?;
        let apartments = uow.list_apartments().await?;
        let drifted = apartments
            .into_iter()
            .filter(|a| {
                a.status
                    != expected
                        .get(&a.id)
                        .copied()
                        .unwrap_or(OccupancyStatus::Vacant)
            })
            .map(|a| a.id)
            .collect();
        drifted
    };

    let mut summary = ScanSummary::default();
    for apartment_id in drifted {
        summary.examined += 1;
        match fix_occupancy(ctx, apartment_id).await {
            Ok(true) => summary.updated += 1,
            Ok(false) => {}
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(apartment_id = %apartment_id, error = %e, "Occupancy fix failed");
            }
        }
    }

    info!(
        drifted = summary.examined,
        fixed = summary.updated,
        failed = summary.failed,
        "Occupancy reconciliation completed"
    );
    Ok(summary)
}

async fn fix_occupancy(ctx: &BillingContext, apartment_id: Uuid) -> Result<bool> {
    let mut uow = ctx.store.begin().await?;
    let Some(apartment) = uow.apartment(apartment_id).await? else {
        return Ok(false);
    };
    let expected = expected_occupancy(&mut uow)
        .await?
        .get(&apartment_id)
        .copied()
        .unwrap_or(OccupancyStatus::Vacant);
    if apartment.status == expected {
        return Ok(false);
    }

    uow.set_apartment_status(apartment_id, expected).await?;
    uow.commit().await?;

    info!(
        apartment_id = %apartment_id,
        from = ?apartment.status,
        to = ?expected,
        "Apartment occupancy corrected"
    );
    Ok(true)
}

pub async fn contract_detail(ctx: &BillingContext, contract_id: Uuid) -> Result<ContractDetail> {
    let mut uow = ctx.store.begin().await?;
    let contract = load_contract(&mut uow, contract_id).await?;
    let installments = uow.installments_for_contract(contract_id).await?;
    Ok(ContractDetail {
        contract,
        installments,
    })
}

/// Installments carrying `reference_month` (0 is the deposit).
pub async fn installments_for_reference_month(
    ctx: &BillingContext,
    reference_month: i32,
) -> Result<Vec<Installment>> {
    if !(0..=12).contains(&reference_month) {
        return Err(AppError::InvalidArgument(format!(
            "reference month must be between 0 and 12, got {}",
            reference_month
        )));
    }
    let mut uow = ctx.store.begin().await?;
    let installments = uow.installments_for_reference_month(reference_month).await?;
    Ok(installments)
}
