pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use anyhow::Context;

use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::services::ai_client::AiClient;
use crate::services::storage::StorageService;

/// Serves the HTTP API until a shutdown signal arrives.
pub async fn run() -> anyhow::Result<()> {
    let state = build_state().await?;

    if let Err(err) = core::bootstrap::ensure_superuser(&state).await {
        tracing::error!(error = %err, "Failed to ensure default superuser");
    }

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr())
        .await
        .with_context(|| format!("Failed to bind {}", state.settings().server_addr()))?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "exam-assist API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    close(&state).await;
    result?;
    Ok(())
}

/// Runs the grading workers and the timer sweeper until a shutdown signal arrives.
pub async fn run_worker() -> anyhow::Result<()> {
    let state = build_state().await?;

    tracing::info!(
        concurrency = state.settings().exam().grading_worker_concurrency,
        sweep_interval_seconds = state.settings().exam().timer_sweep_interval_seconds,
        "exam-assist worker starting"
    );

    let result = tasks::scheduler::run(state.clone()).await;

    close(&state).await;
    result
}

async fn build_state() -> anyhow::Result<AppState> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("Invalid configuration")?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await.context("Failed to connect to Postgres")?;
    db::run_migrations(&db_pool).await.context("Failed to run migrations")?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    match redis.connect().await {
        Ok(()) => tracing::info!("Redis connected successfully"),
        Err(err) => {
            tracing::error!(error = %err, "Failed to connect to Redis; rate limits are disabled")
        }
    }

    let storage = StorageService::from_settings(&settings).await?;
    if storage.is_none() {
        tracing::warn!("S3 storage not configured; exam documents are disabled");
    }

    let ai = AiClient::from_settings(&settings)?;
    if !ai.is_configured() {
        tracing::warn!("OPENAI_API_KEY not configured; extraction and grading will fail");
    }

    Ok(AppState::new(settings, db_pool, redis, storage, ai))
}

async fn close(state: &AppState) {
    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");
}
