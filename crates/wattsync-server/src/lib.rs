//! HTTP trigger endpoints for reconciliation cycles.
//!
//! An external scheduler hits `/update` on its polling cadence and `/seed`
//! once to backfill. Neither takes a body. Both answer with a bare status:
//!
//! - `204 No Content`: the cycle finished (including "nothing new")
//! - `424 Failed Dependency`: an upstream or the store failed the cycle
//!
//! Cycles are blocking and run on tokio's blocking pool. Overlapping triggers
//! are not serialized.

use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::Json, routing::get};
use serde::Serialize;

use wattsync_core::{CycleError, CycleKind, CycleOutcome, Logger, Reconciler};

/// Shared server state.
struct AppState {
    reconciler: Arc<Reconciler>,
    logger: Logger,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Wire status for a finished cycle. `NoUpdate` and `Persisted` are not
/// distinguished here.
pub fn status_for(result: &Result<CycleOutcome, CycleError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(CycleError::DependencyFailure { .. }) => StatusCode::FAILED_DEPENDENCY,
    }
}

async fn run_cycle(state: Arc<AppState>, kind: CycleKind) -> StatusCode {
    let reconciler = Arc::clone(&state.reconciler);
    let joined = tokio::task::spawn_blocking(move || match kind {
        CycleKind::Incremental => reconciler.run_incremental(),
        CycleKind::Seed => reconciler.run_seed(),
    })
    .await;

    match joined {
        Ok(result) => {
            let status = status_for(&result);
            match &result {
                Ok(outcome) => state
                    .logger
                    .info(format_args!("{kind} trigger: {outcome:?} -> {status}")),
                Err(err) => state
                    .logger
                    .warn(format_args!("{kind} trigger: {err} -> {status}")),
            }
            status
        }
        Err(err) => {
            state
                .logger
                .error(format_args!("{kind} cycle task did not complete: {err}"));
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn handle_update(State(state): State<Arc<AppState>>) -> StatusCode {
    run_cycle(state, CycleKind::Incremental).await
}

async fn handle_seed(State(state): State<Arc<AppState>>) -> StatusCode {
    run_cycle(state, CycleKind::Seed).await
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: wattsync_core::VERSION,
    })
}

async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "wattsync",
        "version": wattsync_core::VERSION,
        "endpoints": {
            "/": "This API index",
            "/update": {
                "method": "GET | POST",
                "description": "Persist readings newer than the stored ones",
                "responses": {"204": "cycle finished", "424": "upstream or store failure"},
            },
            "/seed": {
                "method": "GET | POST",
                "description": "Backfill the trailing 24 hours from both sources",
                "responses": {"204": "cycle finished", "424": "upstream or store failure"},
            },
            "/health": "Health check",
        }
    }))
}

/// Build the axum router.
pub fn build_router(reconciler: Arc<Reconciler>, logger: Logger) -> Router {
    let state = Arc::new(AppState { reconciler, logger });

    Router::new()
        .route("/", get(handle_index))
        .route("/update", get(handle_update).post(handle_update))
        .route("/seed", get(handle_seed).post(handle_seed))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Serve the trigger endpoints until Ctrl-C.
pub async fn run_server(
    reconciler: Arc<Reconciler>,
    host: &str,
    port: u16,
    logger: Logger,
) -> std::io::Result<()> {
    let app = build_router(reconciler, logger.clone());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    logger.info(format_args!("listening on http://{addr}"));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(logger.clone()))
        .await?;
    logger.info("server stopped");
    Ok(())
}

async fn shutdown_signal(logger: Logger) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        logger.error(format_args!("cannot listen for Ctrl-C: {err}"));
        std::future::pending::<()>().await;
    }
    logger.info("shutdown requested");
}
