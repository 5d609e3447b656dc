use prescription_engine::{MemoryLedger, PrescriptionContract, SystemClock, UuidSource};
use prescription_server::config::{AppConfig, LedgerBackend};
use prescription_server::db::{run_migrations, PgLedger};
use prescription_server::{app, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let contract = PrescriptionContract::new(Arc::new(SystemClock), Arc::new(UuidSource))
        .with_guard(config.guard());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        backend = %config.backend,
        "prescription server listening"
    );

    match config.backend {
        LedgerBackend::Memory => {
            let state = AppState::new(MemoryLedger::default(), contract);
            axum::serve(listener, app(state)).await?;
        }
        LedgerBackend::Postgres => {
            let pool = config.database.connect().await?;
            run_migrations(&pool).await?;
            let state = AppState::new(PgLedger::new(pool, Arc::new(UuidSource)), contract);
            axum::serve(listener, app(state)).await?;
        }
    }

    Ok(())
}
