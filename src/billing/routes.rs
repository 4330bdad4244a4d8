//! HTTP route handlers for the billing engine.
//!
//! Handlers are thin: they check the caller's role, translate DTOs and call
//! the engine. The role is set by the upstream gateway in `x-actor-role`.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::AppState;

use super::requests::{
    ApproveContractRequest, CancelContractRequest, CreateContractRequest, MeterReadingRequest,
    RejectContractRequest, SolicitContractRequest, SubmitPaymentRequest,
};
use super::responses::{
    ContractDetailResponse, ContractResponse, HealthResponse, InstallmentResponse,
    PixChargeResponse,
};
use super::scanner::DailyJobsReport;
use super::{contracts, energy, payments, scanner};

pub const ROLE_HEADER: &str = "x-actor-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Admin,
    Tenant,
}

impl Caller {
    fn require_admin(self) -> Result<()> {
        match self {
            Caller::Admin => Ok(()),
            Caller::Tenant => Err(AppError::Forbidden(
                "this operation requires the admin role".to_string(),
            )),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let role = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if role.eq_ignore_ascii_case("admin") {
            Ok(Caller::Admin)
        } else if role.eq_ignore_ascii_case("tenant") {
            Ok(Caller::Tenant)
        } else {
            Err(AppError::Forbidden(format!("missing or unknown {} header", ROLE_HEADER)))
        }
    }
}

/// Build the billing router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/contracts", post(create_contract))
        .route("/contracts/solicit", post(solicit_contract))
        .route("/contracts/:id", get(get_contract))
        .route("/contracts/:id/approve", post(approve_contract))
        .route("/contracts/:id/reject", post(reject_contract))
        .route("/contracts/:id/cancel", post(cancel_contract))
        .route("/installments/:id/payment", post(submit_payment))
        .route("/installments/:id/confirm", post(confirm_payment))
        .route("/installments/:id/reject", post(reject_payment))
        .route("/installments/:id/force-paid", post(force_mark_paid))
        .route("/installments/:id/force-pending", post(force_mark_pending))
        .route("/installments/:id/meter-reading", post(record_meter_reading))
        .route("/installments/:id/pix", get(payment_charge))
        .route("/reports/reference-month/:month", get(installments_by_reference_month))
        .route("/jobs/daily", post(run_daily_jobs))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.config.app_name.clone(),
        store: state.billing.store.backend_tag(),
        energy_billing: state.billing.energy.name(),
        cache: state.billing.cache.stats(),
    })
}

// ==================== contracts ====================

async fn solicit_contract(
    State(state): State<AppState>,
    _caller: Caller,
    Json(req): Json<SolicitContractRequest>,
) -> Result<(StatusCode, Json<ContractResponse>)> {
    let contract = contracts::solicit_contract(&state.billing, req.into()).await?;
    Ok((StatusCode::CREATED, Json(contract.into())))
}

async fn create_contract(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateContractRequest>,
) -> Result<(StatusCode, Json<ContractDetailResponse>)> {
    caller.require_admin()?;
    let detail = contracts::create_contract(&state.billing, req.into()).await?;
    Ok((StatusCode::CREATED, Json(detail.into())))
}

async fn get_contract(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ContractDetailResponse>> {
    let detail = contracts::contract_detail(&state.billing, id).await?;
    Ok(Json(detail.into()))
}

async fn approve_contract(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<ApproveContractRequest>,
) -> Result<Json<ContractDetailResponse>> {
    caller.require_admin()?;
    let detail = contracts::approve_contract(&state.billing, id, req.into()).await?;
    Ok(Json(detail.into()))
}

async fn reject_contract(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectContractRequest>,
) -> Result<Json<ContractResponse>> {
    caller.require_admin()?;
    let contract = contracts::reject_contract(&state.billing, id, req.reason).await?;
    Ok(Json(contract.into()))
}

async fn cancel_contract(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelContractRequest>,
) -> Result<Json<ContractDetailResponse>> {
    caller.require_admin()?;
    let detail = contracts::cancel_contract(&state.billing, id, &req.reason).await?;
    Ok(Json(detail.into()))
}

// ==================== installments ====================

async fn submit_payment(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitPaymentRequest>,
) -> Result<Json<InstallmentResponse>> {
    let installment = payments::submit_payment(&state.billing, id, &req.evidence_ref).await?;
    Ok(Json(installment.into()))
}

async fn confirm_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<InstallmentResponse>> {
    caller.require_admin()?;
    let installment = payments::confirm_payment(&state.billing, id).await?;
    Ok(Json(installment.into()))
}

async fn reject_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<InstallmentResponse>> {
    caller.require_admin()?;
    let installment = payments::reject_payment(&state.billing, id).await?;
    Ok(Json(installment.into()))
}

async fn force_mark_paid(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<InstallmentResponse>> {
    caller.require_admin()?;
    let installment = payments::force_mark_paid(&state.billing, id).await?;
    Ok(Json(installment.into()))
}

async fn force_mark_pending(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<InstallmentResponse>> {
    caller.require_admin()?;
    let installment = payments::force_mark_pending(&state.billing, id).await?;
    Ok(Json(installment.into()))
}

async fn record_meter_reading(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<MeterReadingRequest>,
) -> Result<Json<InstallmentResponse>> {
    caller.require_admin()?;
    let installment = energy::record_meter_reading(&state.billing, id, req.reading).await?;
    Ok(Json(installment.into()))
}

async fn payment_charge(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<PixChargeResponse>> {
    let charge = payments::payment_charge(&state.billing, id).await?;
    Ok(Json(PixChargeResponse::new(id, &charge)))
}

async fn installments_by_reference_month(
    State(state): State<AppState>,
    caller: Caller,
    Path(month): Path<i32>,
) -> Result<Json<Vec<InstallmentResponse>>> {
    caller.require_admin()?;
    let installments = contracts::installments_for_reference_month(&state.billing, month).await?;
    Ok(Json(installments.into_iter().map(Into::into).collect()))
}

// ==================== jobs ====================

/// Run the daily job set now, outside the scheduler.
async fn run_daily_jobs(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<DailyJobsReport>> {
    caller.require_admin()?;
    let now = state.billing.clock.now();
    Ok(Json(scanner::run_daily_jobs(&state.billing, now).await))
}
