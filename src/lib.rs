//! Lease contract and installment billing service.

pub mod billing;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod integrations;
pub mod scheduler;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use billing::BillingContext;
use config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub billing: BillingContext,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, billing: BillingContext) -> Self {
        Self {
            billing,
            config: Arc::new(config),
        }
    }
}

/// Full HTTP application with tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(billing::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
