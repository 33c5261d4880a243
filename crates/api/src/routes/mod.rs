pub mod health;
pub mod jobs;
pub mod models;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                          WebSocket upgrade
/// /models                      available model names
/// /annotations/job             submit job (POST)
/// /annotations/job/{job_id}    job status (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/models", get(models::list_models))
        .nest("/annotations", jobs::router())
}
