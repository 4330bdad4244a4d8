use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use flat_lease_billing::billing::{BillingContext, BillingStore, MemoryStore, PgStore};
use flat_lease_billing::config::AppConfig;
use flat_lease_billing::scheduler::run_background_scheduler;
use flat_lease_billing::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env();
    let store = build_store(&config).await?;
    let billing = BillingContext::from_config(&config, store);

    if config.pix_key.is_empty() {
        tracing::warn!("PIX_KEY is not set; payment charges will fail");
    }
    if config.admin_email.is_none() {
        tracing::warn!("ADMIN_EMAIL is not set; energy reading reminders are disabled");
    }

    let state = AppState::new(config, billing);

    if state.config.scheduler_enabled {
        tokio::spawn(run_background_scheduler(state.clone()));
    }

    let socket_addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .context("invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        app_name = %state.config.app_name,
        environment = %state.config.environment,
        store = state.billing.store.backend_tag(),
        energy_billing = state.config.energy_billing_mode.as_str(),
        "Billing service listening on {}",
        socket_addr
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn BillingStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_pool_max_connections)
                .connect(url)
                .await
                .context("failed to connect to database")?;
            let store = PgStore::new(pool);
            store.migrate().await.context("failed to run migrations")?;
            tracing::info!("Database connection established");
            Ok(Arc::new(store))
        }
        None if config.is_production() => {
            anyhow::bail!("DATABASE_URL must be set in production")
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; using the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    tracing::info!("Shutdown signal received, finishing in-flight requests");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
