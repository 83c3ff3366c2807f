pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod store;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, shutdown::ShutdownTrigger, state::AppState, telemetry};
use crate::store::PgGradingStore;

async fn build_state() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    Ok(AppState::new(settings, Arc::new(PgGradingStore::new(db_pool))))
}

pub async fn run() -> anyhow::Result<()> {
    let state = build_state().await?;

    let (trigger, shutdown_rx) = ShutdownTrigger::new();
    let dispatcher = if state.settings().dispatcher().enabled {
        Some(tasks::scheduler::spawn(&state, shutdown_rx)?)
    } else {
        tracing::info!("Background dispatcher disabled");
        None
    };

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "DTA grader API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    trigger.fire();
    if let Some(handle) = dispatcher {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Dispatcher task join failed");
        }
    }

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    let state = build_state().await?;
    tasks::scheduler::run(state).await
}
