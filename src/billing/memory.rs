//! In-memory billing store.
//!
//! A unit of work holds the store's lock for its whole life and edits a copy
//! of the state, which replaces the shared state on commit. Used by the test
//! suite and by development runs without a database.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::models::{
    Apartment, Client, Contract, ContractStatus, ContractUpdate, Installment, InstallmentStatus,
    InstallmentUpdate, OccupancyStatus, TenancyRecord,
};
use super::store::{BillingStore, UnitOfWork};

/// Writes that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    SetApartmentStatus,
    InsertInstallments,
    UpdateInstallment(Uuid),
}

/// A row a unit of work would hold locked under Postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    Contract(Uuid),
    Installment(Uuid),
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    apartments: HashMap<Uuid, Apartment>,
    clients: HashMap<Uuid, Client>,
    contracts: HashMap<Uuid, Contract>,
    installments: HashMap<Uuid, Installment>,
    tenancy: Vec<TenancyRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_points: Arc<StdMutex<Vec<FailPoint>>>,
    lock_log: Arc<StdMutex<Vec<RowLock>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_apartment(&self, number: &str, energy_price_per_unit: Decimal) -> Apartment {
        let apartment = Apartment {
            id: Uuid::new_v4(),
            number: number.to_string(),
            building_id: Uuid::new_v4(),
            status: OccupancyStatus::Vacant,
            energy_price_per_unit,
        };
        self.state
            .lock()
            .await
            .apartments
            .insert(apartment.id, apartment.clone());
        apartment
    }

    pub async fn add_client(&self, name: &str, email: &str) -> Client {
        let client = Client {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
        };
        self.state
            .lock()
            .await
            .clients
            .insert(client.id, client.clone());
        client
    }

    pub async fn apartment_status(&self, id: Uuid) -> Option<OccupancyStatus> {
        self.state.lock().await.apartments.get(&id).map(|a| a.status)
    }

    /// Overwrite an apartment's status behind the engine's back, to simulate drift.
    pub async fn force_apartment_status(&self, id: Uuid, status: OccupancyStatus) {
        if let Some(apartment) = self.state.lock().await.apartments.get_mut(&id) {
            apartment.status = status;
        }
    }

    pub async fn contract_count(&self) -> usize {
        self.state.lock().await.contracts.len()
    }

    pub async fn installment_count(&self) -> usize {
        self.state.lock().await.installments.len()
    }

    pub async fn tenancy_records(&self) -> Vec<TenancyRecord> {
        self.state.lock().await.tenancy.clone()
    }

    pub fn fail_on(&self, point: FailPoint) {
        self.fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(point);
    }

    pub fn clear_fail_points(&self) {
        self.fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Rows locked since the last call, in the order they were taken.
    pub fn take_lock_log(&self) -> Vec<RowLock> {
        std::mem::take(&mut *self.lock_log.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            fail_points: self.fail_points.clone(),
            lock_log: self.lock_log.clone(),
        }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_points: Arc<StdMutex<Vec<FailPoint>>>,
    lock_log: Arc<StdMutex<Vec<RowLock>>>,
}

impl MemoryUnitOfWork {
    fn lock(&self, row: RowLock) {
        self.lock_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(row);
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        let armed = self
            .fail_points
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&point);
        if armed {
            return Err(AppError::Internal(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

fn sorted(mut installments: Vec<Installment>) -> Vec<Installment> {
    installments.sort_by_key(|i| (i.contract_id, i.sequence));
    installments
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn apartment(&mut self, id: Uuid) -> Result<Option<Apartment>> {
        Ok(self.working.apartments.get(&id).cloned())
    }

    async fn list_apartments(&mut self) -> Result<Vec<Apartment>> {
        let mut apartments: Vec<Apartment> = self.working.apartments.values().cloned().collect();
        apartments.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(apartments)
    }

    async fn set_apartment_status(&mut self, id: Uuid, status: OccupancyStatus) -> Result<()> {
        self.check(FailPoint::SetApartmentStatus)?;
        let apartment = self
            .working
            .apartments
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("apartment", id))?;
        apartment.status = status;
        Ok(())
    }

    async fn client(&mut self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.working.clients.get(&id).cloned())
    }

    async fn contract(&mut self, id: Uuid) -> Result<Option<Contract>> {
        self.lock(RowLock::Contract(id));
        Ok(self.working.contracts.get(&id).cloned())
    }

    async fn open_contract_for(&mut self, client_id: Uuid, apartment_id: Uuid) -> Result<Option<Contract>> {
        Ok(self
            .working
            .contracts
            .values()
            .find(|c| {
                c.status.is_open() && (c.client_id == client_id || c.apartment_id == apartment_id)
            })
            .cloned())
    }

    async fn contracts_with_status(&mut self, status: ContractStatus) -> Result<Vec<Contract>> {
        let mut contracts: Vec<Contract> = self
            .working
            .contracts
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        contracts.sort_by_key(|c| (c.start_date, c.id));
        Ok(contracts)
    }

    async fn insert_contract(&mut self, contract: &Contract) -> Result<()> {
        if self.working.contracts.contains_key(&contract.id) {
            return Err(AppError::Conflict(format!("contract {} already exists", contract.id)));
        }
        self.working.contracts.insert(contract.id, contract.clone());
        Ok(())
    }

    async fn update_contract(&mut self, id: Uuid, update: &ContractUpdate) -> Result<Contract> {
        self.lock(RowLock::Contract(id));
        let contract = self
            .working
            .contracts
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("contract", id))?;
        update.apply(contract);
        contract.updated_at = Utc::now();
        Ok(contract.clone())
    }

    async fn insert_installments(&mut self, installments: &[Installment]) -> Result<()> {
        self.check(FailPoint::InsertInstallments)?;
        for installment in installments {
            self.working
                .installments
                .insert(installment.id, installment.clone());
        }
        Ok(())
    }

    async fn installment_contract_id(&mut self, id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.working.installments.get(&id).map(|i| i.contract_id))
    }

    async fn installment(&mut self, id: Uuid) -> Result<Option<Installment>> {
        self.lock(RowLock::Installment(id));
        Ok(self.working.installments.get(&id).cloned())
    }

    async fn installments_for_contract(&mut self, contract_id: Uuid) -> Result<Vec<Installment>> {
        Ok(sorted(
            self.working
                .installments
                .values()
                .filter(|i| i.contract_id == contract_id)
                .cloned()
                .collect(),
        ))
    }

    async fn installments_with_status(&mut self, status: InstallmentStatus) -> Result<Vec<Installment>> {
        Ok(sorted(
            self.working
                .installments
                .values()
                .filter(|i| i.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn installments_for_reference_month(&mut self, reference_month: i32) -> Result<Vec<Installment>> {
        Ok(sorted(
            self.working
                .installments
                .values()
                .filter(|i| i.reference_month == reference_month)
                .cloned()
                .collect(),
        ))
    }

    async fn update_installment(&mut self, id: Uuid, update: &InstallmentUpdate) -> Result<Installment> {
        self.check(FailPoint::UpdateInstallment(id))?;
        self.lock(RowLock::Installment(id));
        let installment = self
            .working
            .installments
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("installment", id))?;
        update.apply(installment);
        installment.updated_at = Utc::now();
        Ok(installment.clone())
    }

    async fn insert_tenancy_record(&mut self, record: &TenancyRecord) -> Result<()> {
        self.working.tenancy.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
