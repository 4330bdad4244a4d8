//! Energy billing.
//!
//! A new meter reading is priced by an [`EnergyBillingCalculator`] strategy and
//! written onto exactly one installment, while the contract's stored reading
//! advances in the same unit of work.
//!
//! Two strategies exist and are never mixed:
//! - [`MeteredBilling`] charges every consumed unit (default).
//! - [`AllowanceCreditBilling`] grants a monthly free allowance. Unused units
//!   are banked as credit, and consumption over the allowance draws on the
//!   credit before anything is billed.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::EnergyBillingMode;
use crate::error::{AppError, Result};

use super::calculators::energy_surcharge;
use super::context::BillingContext;
use super::models::{ContractStatus, ContractUpdate, Installment, InstallmentKind, InstallmentUpdate};
use super::validation::validate_non_negative;

/// Everything a strategy needs to price one reading.
#[derive(Debug, Clone, Copy)]
pub struct MeterReading {
    pub previous: Decimal,
    pub current: Decimal,
    pub price_per_unit: Decimal,
    pub allowance: Decimal,
    pub credit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyCharge {
    pub consumption: Decimal,
    pub billable_units: Decimal,
    pub surcharge: Decimal,
    /// Credit left on the contract after this reading.
    pub credit_balance: Decimal,
}

pub trait EnergyBillingCalculator: Send + Sync {
    fn name(&self) -> &'static str;

    fn bill(&self, reading: &MeterReading) -> Result<EnergyCharge>;
}

fn consumption(reading: &MeterReading) -> Result<Decimal> {
    if reading.current < reading.previous {
        return Err(AppError::InvalidArgument(format!(
            "meter reading {} is below the recorded reading {}",
            reading.current, reading.previous
        )));
    }
    Ok(reading.current - reading.previous)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MeteredBilling;

impl EnergyBillingCalculator for MeteredBilling {
    fn name(&self) -> &'static str {
        "metered"
    }

    fn bill(&self, reading: &MeterReading) -> Result<EnergyCharge> {
        let consumption = consumption(reading)?;
        Ok(EnergyCharge {
            consumption,
            billable_units: consumption,
            surcharge: energy_surcharge(consumption, reading.price_per_unit),
            credit_balance: reading.credit,
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowanceCreditBilling;

impl EnergyBillingCalculator for AllowanceCreditBilling {
    fn name(&self) -> &'static str {
        "allowance"
    }

    fn bill(&self, reading: &MeterReading) -> Result<EnergyCharge> {
        let consumption = consumption(reading)?;
        let allowance = reading.allowance.max(Decimal::ZERO);
        let credit = reading.credit.max(Decimal::ZERO);

        if consumption <= allowance {
            return Ok(EnergyCharge {
                consumption,
                billable_units: Decimal::ZERO,
                surcharge: Decimal::ZERO,
                credit_balance: credit + (allowance - consumption),
            });
        }

        let excess = consumption - allowance;
        let drawn = excess.min(credit);
        let billable_units = excess - drawn;
        Ok(EnergyCharge {
            consumption,
            billable_units,
            surcharge: energy_surcharge(billable_units, reading.price_per_unit),
            credit_balance: credit - drawn,
        })
    }
}

pub fn calculator_for(mode: EnergyBillingMode) -> Arc<dyn EnergyBillingCalculator> {
    match mode {
        EnergyBillingMode::Metered => Arc::new(MeteredBilling),
        EnergyBillingMode::AllowanceCredit => Arc::new(AllowanceCreditBilling),
    }
}

/// Record a meter reading against a rent installment.
///
/// The installment's consumption and surcharge and the contract's stored
/// reading (and credit) are written together or not at all. The contract is
/// locked before the installment.
pub async fn record_meter_reading(
    ctx: &BillingContext,
    installment_id: Uuid,
    reading: Decimal,
) -> Result<Installment> {
    validate_non_negative("meter reading", reading)?;

    let mut uow = ctx.store.begin().await?;

    let contract_id = uow
        .installment_contract_id(installment_id)
        .await?
        .ok_or_else(|| AppError::not_found("installment", installment_id))?;
    let contract = uow
        .contract(contract_id)
        .await?
        .ok_or_else(|| AppError::not_found("contract", contract_id))?;
    let installment = uow
        .installment(installment_id)
        .await?
        .ok_or_else(|| AppError::not_found("installment", installment_id))?;

    if installment.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "installment {} is {:?} and can no longer change",
            installment_id, installment.status
        )));
    }
    if installment.kind == InstallmentKind::Deposit {
        return Err(AppError::InvalidArgument(
            "energy is not billed on the deposit installment".to_string(),
        ));
    }
    if installment.energy_consumption.is_some() {
        return Err(AppError::Conflict(format!(
            "installment {} already has a meter reading",
            installment_id
        )));
    }
    if contract.status != ContractStatus::Active {
        return Err(AppError::Conflict(format!(
            "contract {} is not active",
            contract.id
        )));
    }

    let apartment = uow
        .apartment(contract.apartment_id)
        .await?
        .ok_or_else(|| AppError::not_found("apartment", contract.apartment_id))?;

    let charge = ctx.energy.bill(&MeterReading {
        previous: contract.meter_reading,
        current: reading,
        price_per_unit: apartment.energy_price_per_unit,
        allowance: contract.energy_allowance.unwrap_or_default(),
        credit: contract.energy_credit,
    })?;

    let updated = uow
        .update_installment(
            installment_id,
            &InstallmentUpdate {
                energy_consumption: Some(Some(charge.consumption)),
                energy_surcharge: Some(charge.surcharge),
                ..InstallmentUpdate::default()
            },
        )
        .await?;
    uow.update_contract(
        contract.id,
        &ContractUpdate {
            meter_reading: Some(reading),
            energy_credit: Some(charge.credit_balance),
            ..ContractUpdate::default()
        },
    )
    .await?;
    uow.commit().await?;

    info!(
        installment_id = %installment_id,
        contract_id = %contract.id,
        strategy = ctx.energy.name(),
        consumption = %charge.consumption,
        surcharge = %charge.surcharge,
        "Meter reading recorded"
    );

    Ok(updated)
}
