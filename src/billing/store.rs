//! Persistence boundary for the billing engine.
//!
//! Every operation runs inside one [`UnitOfWork`]: reads and writes made
//! through it become visible together on [`UnitOfWork::commit`], and a unit
//! dropped without committing leaves no trace.
//!
//! Row locks are taken contract first, then its installments.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::models::{
    Apartment, Client, Contract, ContractStatus, ContractUpdate, Installment, InstallmentStatus,
    InstallmentUpdate, OccupancyStatus, TenancyRecord,
};

#[async_trait]
pub trait BillingStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    async fn apartment(&mut self, id: Uuid) -> Result<Option<Apartment>>;

    async fn list_apartments(&mut self) -> Result<Vec<Apartment>>;

    async fn set_apartment_status(&mut self, id: Uuid, status: OccupancyStatus) -> Result<()>;

    async fn client(&mut self, id: Uuid) -> Result<Option<Client>>;

    /// Reads a contract and holds it for the rest of the unit.
    async fn contract(&mut self, id: Uuid) -> Result<Option<Contract>>;

    /// Any AWAITING_APPROVAL or ACTIVE contract held by the client or on the apartment.
    async fn open_contract_for(&mut self, client_id: Uuid, apartment_id: Uuid) -> Result<Option<Contract>>;

    async fn contracts_with_status(&mut self, status: ContractStatus) -> Result<Vec<Contract>>;

    async fn insert_contract(&mut self, contract: &Contract) -> Result<()>;

    async fn update_contract(&mut self, id: Uuid, update: &ContractUpdate) -> Result<Contract>;

    async fn insert_installments(&mut self, installments: &[Installment]) -> Result<()>;

    /// Contract owning an installment. Takes no row lock.
    async fn installment_contract_id(&mut self, id: Uuid) -> Result<Option<Uuid>>;

    /// Reads an installment and holds it for the rest of the unit.
    async fn installment(&mut self, id: Uuid) -> Result<Option<Installment>>;

    /// Installments of a contract ordered by schedule sequence.
    async fn installments_for_contract(&mut self, contract_id: Uuid) -> Result<Vec<Installment>>;

    async fn installments_with_status(&mut self, status: InstallmentStatus) -> Result<Vec<Installment>>;

    async fn installments_for_reference_month(&mut self, reference_month: i32) -> Result<Vec<Installment>>;

    async fn update_installment(&mut self, id: Uuid, update: &InstallmentUpdate) -> Result<Installment>;

    async fn insert_tenancy_record(&mut self, record: &TenancyRecord) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
