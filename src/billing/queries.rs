//! Postgres implementation of the billing store.
//!
//! Each unit of work wraps one sqlx transaction; rows read for mutation are
//! locked with `FOR UPDATE` until the unit commits or is dropped.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::models::{
    Apartment, Client, Contract, ContractStatus, ContractUpdate, Installment, InstallmentStatus,
    InstallmentUpdate, OccupancyStatus, TenancyRecord,
};
use super::store::{BillingStore, UnitOfWork};

const APARTMENT_SELECT: &str = r#"
    SELECT a.id, a.number, a.building_id, a.status, b.energy_price_per_unit
    FROM apartments a
    JOIN buildings b ON b.id = a.building_id
"#;

const CONTRACT_COLUMNS: &str = "id, apartment_id, client_id, term_months, due_day, start_date, \
     rent_amount, adjustment_period_months, energy_allowance, energy_credit, meter_reading, \
     status, cancellation_reason, created_at, updated_at";

const INSTALLMENT_COLUMNS: &str = "id, contract_id, sequence, reference_month, kind, due_date, \
     base_amount, energy_consumption, energy_surcharge, penalty, status, payment_evidence, \
     paid_at, client_reminded_at, client_reminder_attempts, admin_reminded_at, \
     admin_reminder_attempts, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl BillingStore for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

/// Unique-index violations on open contracts surface as conflicts.
fn map_write_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("write rejected by constraint: {}", db.message()))
        }
        _ => AppError::Database(err),
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn apartment(&mut self, id: Uuid) -> Result<Option<Apartment>> {
        let sql = format!("{} WHERE a.id = $1 FOR UPDATE OF a", APARTMENT_SELECT);
        let apartment = sqlx::query_as::<_, Apartment>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(apartment)
    }

    async fn list_apartments(&mut self) -> Result<Vec<Apartment>> {
        let sql = format!("{} ORDER BY a.number", APARTMENT_SELECT);
        let apartments = sqlx::query_as::<_, Apartment>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(apartments)
    }

    async fn set_apartment_status(&mut self, id: Uuid, status: OccupancyStatus) -> Result<()> {
        let result = sqlx::query("UPDATE apartments SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("apartment", id));
        }
        Ok(())
    }

    async fn client(&mut self, id: Uuid) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT id, name, email FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(client)
    }

    async fn contract(&mut self, id: Uuid) -> Result<Option<Contract>> {
        let sql = format!("SELECT {} FROM contracts WHERE id = $1 FOR UPDATE", CONTRACT_COLUMNS);
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(contract)
    }

    async fn open_contract_for(&mut self, client_id: Uuid, apartment_id: Uuid) -> Result<Option<Contract>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM contracts
            WHERE status IN ('AWAITING_APPROVAL', 'ACTIVE')
              AND (client_id = $1 OR apartment_id = $2)
            LIMIT 1
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, Contract>(&sql)
            .bind(client_id)
            .bind(apartment_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(contract)
    }

    async fn contracts_with_status(&mut self, status: ContractStatus) -> Result<Vec<Contract>> {
        let sql = format!(
            "SELECT {} FROM contracts WHERE status = $1 ORDER BY start_date, id",
            CONTRACT_COLUMNS
        );
        let contracts = sqlx::query_as::<_, Contract>(&sql)
            .bind(status)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(contracts)
    }

    async fn insert_contract(&mut self, contract: &Contract) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts (
                id, apartment_id, client_id, term_months, due_day, start_date,
                rent_amount, adjustment_period_months, energy_allowance, energy_credit,
                meter_reading, status, cancellation_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(contract.id)
        .bind(contract.apartment_id)
        .bind(contract.client_id)
        .bind(contract.term_months)
        .bind(contract.due_day)
        .bind(contract.start_date)
        .bind(contract.rent_amount)
        .bind(contract.adjustment_period_months)
        .bind(contract.energy_allowance)
        .bind(contract.energy_credit)
        .bind(contract.meter_reading)
        .bind(contract.status)
        .bind(&contract.cancellation_reason)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn update_contract(&mut self, id: Uuid, update: &ContractUpdate) -> Result<Contract> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE contracts SET updated_at = now()");
        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(rent) = update.rent_amount {
            qb.push(", rent_amount = ").push_bind(rent);
        }
        if let Some(period) = update.adjustment_period_months {
            qb.push(", adjustment_period_months = ").push_bind(period);
        }
        if let Some(allowance) = update.energy_allowance {
            qb.push(", energy_allowance = ").push_bind(allowance);
        }
        if let Some(credit) = update.energy_credit {
            qb.push(", energy_credit = ").push_bind(credit);
        }
        if let Some(reading) = update.meter_reading {
            qb.push(", meter_reading = ").push_bind(reading);
        }
        if let Some(reason) = &update.cancellation_reason {
            qb.push(", cancellation_reason = ").push_bind(reason.clone());
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(CONTRACT_COLUMNS);

        qb.build_query_as::<Contract>()
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_write_error)?
            .ok_or_else(|| AppError::not_found("contract", id))
    }

    async fn insert_installments(&mut self, installments: &[Installment]) -> Result<()> {
        if installments.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO installments ({}) ", INSTALLMENT_COLUMNS));
        qb.push_values(installments, |mut row, i| {
            row.push_bind(i.id)
                .push_bind(i.contract_id)
                .push_bind(i.sequence)
                .push_bind(i.reference_month)
                .push_bind(i.kind)
                .push_bind(i.due_date)
                .push_bind(i.base_amount)
                .push_bind(i.energy_consumption)
                .push_bind(i.energy_surcharge)
                .push_bind(i.penalty)
                .push_bind(i.status)
                .push_bind(i.payment_evidence.clone())
                .push_bind(i.paid_at)
                .push_bind(i.client_reminded_at)
                .push_bind(i.client_reminder_attempts)
                .push_bind(i.admin_reminded_at)
                .push_bind(i.admin_reminder_attempts)
                .push_bind(i.created_at)
                .push_bind(i.updated_at);
        });

        qb.build()
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn installment_contract_id(&mut self, id: Uuid) -> Result<Option<Uuid>> {
        let contract_id = sqlx::query_scalar::<_, Uuid>("SELECT contract_id FROM installments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(contract_id)
    }

    async fn installment(&mut self, id: Uuid) -> Result<Option<Installment>> {
        let sql = format!("SELECT {} FROM installments WHERE id = $1 FOR UPDATE", INSTALLMENT_COLUMNS);
        let installment = sqlx::query_as::<_, Installment>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(installment)
    }

    async fn installments_for_contract(&mut self, contract_id: Uuid) -> Result<Vec<Installment>> {
        let sql = format!(
            "SELECT {} FROM installments WHERE contract_id = $1 ORDER BY sequence",
            INSTALLMENT_COLUMNS
        );
        let installments = sqlx::query_as::<_, Installment>(&sql)
            .bind(contract_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(installments)
    }

    async fn installments_with_status(&mut self, status: InstallmentStatus) -> Result<Vec<Installment>> {
        let sql = format!(
            "SELECT {} FROM installments WHERE status = $1 ORDER BY contract_id, sequence",
            INSTALLMENT_COLUMNS
        );
        let installments = sqlx::query_as::<_, Installment>(&sql)
            .bind(status)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(installments)
    }

    async fn installments_for_reference_month(&mut self, reference_month: i32) -> Result<Vec<Installment>> {
        let sql = format!(
            "SELECT {} FROM installments WHERE reference_month = $1 ORDER BY contract_id, sequence",
            INSTALLMENT_COLUMNS
        );
        let installments = sqlx::query_as::<_, Installment>(&sql)
            .bind(reference_month)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(installments)
    }

    async fn update_installment(&mut self, id: Uuid, update: &InstallmentUpdate) -> Result<Installment> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE installments SET updated_at = now()");
        if let Some(status) = update.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(consumption) = update.energy_consumption {
            qb.push(", energy_consumption = ").push_bind(consumption);
        }
        if let Some(surcharge) = update.energy_surcharge {
            qb.push(", energy_surcharge = ").push_bind(surcharge);
        }
        if let Some(penalty) = update.penalty {
            qb.push(", penalty = ").push_bind(penalty);
        }
        if let Some(evidence) = &update.payment_evidence {
            qb.push(", payment_evidence = ").push_bind(evidence.clone());
        }
        if let Some(paid_at) = update.paid_at {
            qb.push(", paid_at = ").push_bind(paid_at);
        }
        if let Some(at) = update.client_reminded_at {
            qb.push(", client_reminded_at = ").push_bind(at);
        }
        if let Some(attempts) = update.client_reminder_attempts {
            qb.push(", client_reminder_attempts = ").push_bind(attempts);
        }
        if let Some(at) = update.admin_reminded_at {
            qb.push(", admin_reminded_at = ").push_bind(at);
        }
        if let Some(attempts) = update.admin_reminder_attempts {
            qb.push(", admin_reminder_attempts = ").push_bind(attempts);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(INSTALLMENT_COLUMNS);

        qb.build_query_as::<Installment>()
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| AppError::not_found("installment", id))
    }

    async fn insert_tenancy_record(&mut self, record: &TenancyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenancy_history (id, apartment_id, client_id, entry_date, exit_date, exit_reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.apartment_id)
        .bind(record.client_id)
        .bind(record.entry_date)
        .bind(record.exit_date)
        .bind(&record.exit_reason)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
