//! Contract and installment billing engine.
//!
//! Contracts, their installment schedules, energy surcharges, payment
//! confirmation and the daily overdue/penalty passes. Exposed over HTTP
//! through [`routes::router`].

pub mod calculators;
pub mod context;
pub mod contracts;
pub mod energy;
pub mod memory;
pub mod models;
pub mod payments;
pub mod queries;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod scanner;
pub mod schedule;
pub mod store;
pub mod validation;

// Re-export commonly used items
pub use calculators::{compound_penalty, is_overdue, months_late, round_money};
pub use context::BillingContext;
pub use contracts::{
    approve_contract, cancel_contract, contract_detail, create_contract,
    installments_for_reference_month, reconcile_occupancy, reject_contract, scan_expired_contracts,
    solicit_contract, ApprovalTerms, ContractDetail, ContractRequest, NewContract,
};
pub use energy::{
    record_meter_reading, AllowanceCreditBilling, EnergyBillingCalculator, EnergyCharge,
    MeterReading, MeteredBilling,
};
pub use memory::{FailPoint, MemoryStore, RowLock};
pub use payments::{
    confirm_payment, force_mark_paid, force_mark_pending, next_status, payment_charge,
    reject_payment, submit_payment, PaymentEvent,
};
pub use queries::PgStore;
pub use routes::router;
pub use scanner::{
    compound_penalties, run_daily_jobs, scan_overdue, send_due_reminders, DailyJobsReport,
    ReminderSummary, ScanSummary,
};
pub use store::{BillingStore, UnitOfWork};
