//! Health, readiness, and metrics HTTP endpoints.
//!
//! Served on a separate listener, concurrently with the daemon loop. The
//! handlers only read the pruner's atomic flags and issue their own
//! connectivity probe; they never mutate daemon state.
//!
//! - `/healthz`: liveness, always `200` while the process runs.
//! - `/readyz`: `503` until the first cycle attempt, then `200` if the
//!   cluster is reachable (noting whether a cycle has succeeded yet).
//! - `/metrics`: Prometheus exposition.

use crate::pruner::Pruner;
use crate::shutdown::Shutdown;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared state for the health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// The pruner whose readiness is being reported.
    pub pruner: Arc<Pruner>,
    /// Handle for rendering Prometheus metrics.
    pub metrics: PrometheusHandle,
}

/// Builds the health/metrics router.
#[must_use]
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serves the health endpoints until shutdown is requested.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: HealthState, shutdown: Shutdown) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "health server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<HealthState>) -> (StatusCode, String) {
    if !state.pruner.initialized() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready: initializing".to_string(),
        );
    }

    if let Err(err) = state.pruner.check_connectivity().await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("not ready: {err}"),
        );
    }

    let status = if state.pruner.ready() {
        "ok"
    } else {
        "ok (no successful cycle yet)"
    };
    (StatusCode::OK, status.to_string())
}

async fn metrics(State(state): State<HealthState>) -> String {
    state.metrics.render()
}
