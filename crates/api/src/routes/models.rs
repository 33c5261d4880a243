//! Model discovery endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response of `GET /api/models`.
#[derive(Serialize)]
pub struct ModelsResponse {
    /// Model names available on the inference server.
    pub models: Vec<String>,
    /// The model new jobs are configured to use.
    pub default: String,
}

/// GET /models -- list the models available on the inference server.
pub async fn list_models(State(state): State<AppState>) -> AppResult<Json<ModelsResponse>> {
    let models = state
        .inference
        .list_models()
        .await
        .map_err(|e| AppError::InternalError(format!("Model server unavailable: {e}")))?;

    Ok(Json(ModelsResponse {
        models,
        default: state.inference.model().to_string(),
    }))
}
