use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable.
    pub db_healthy: bool,
    /// Active WebSocket connections.
    pub connections: usize,
    /// Inference gate occupancy.
    pub gate: GateSnapshot,
}

/// Gate occupancy as reported by the health endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateSnapshot {
    pub active: usize,
    pub pending: usize,
    pub max_concurrent: usize,
}

/// GET /health -- returns service, database, and gate health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = annolab_db::health_check(&state.pool).await.is_ok();
    let status = if db_healthy { "ok" } else { "degraded" };
    let stats = state.gate.stats();

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        connections: state.hub.connection_count().await,
        gate: GateSnapshot {
            active: stats.active,
            pending: stats.pending,
            max_concurrent: stats.max_concurrent,
        },
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
