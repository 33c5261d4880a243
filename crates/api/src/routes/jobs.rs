//! Annotation job submission and status endpoints.

use annolab_core::annotation::AnnotationRequest;
use annolab_core::error::CoreError;
use annolab_core::types::{JobId, Timestamp};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

/// Body of `POST /api/annotations/job`.
///
/// The annotation request fields are flattened alongside the optional
/// callback URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobBody {
    #[serde(flatten)]
    pub request: AnnotationRequest,
    /// URL to POST the job outcome to, if any.
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// Response to a successful submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub status: String,
}

/// Response of `GET /api/annotations/job/{job_id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// The produced annotation, present once the job completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<serde_json::Value>,
}

/// POST /annotations/job -- validate and enqueue an annotation job.
///
/// Returns `202 Accepted`: the work happens asynchronously and the caller
/// polls (or listens on the WebSocket / callback) for the outcome.
async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobBody>,
) -> AppResult<(StatusCode, Json<SubmitJobResponse>)> {
    let job = state.queue.submit(body.request, body.callback_url).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// GET /annotations/job/{job_id} -- report a job's current state.
async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<Json<JobStatusResponse>> {
    let job = state
        .queue
        .status(job_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "Job",
            id: job_id.to_string(),
        })?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status,
        error: job.error,
        created_at: job.created_at,
        updated_at: job.updated_at,
        annotation: job.result,
    }))
}

/// Mount the annotation job routes (under `/api/annotations`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/job", post(submit_job))
        .route("/job/{job_id}", get(job_status))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_body_parses_flattened_request() {
        let raw = r#"{
            "personaId": "critic",
            "content": "annotate me",
            "callbackUrl": "https://example.com/hook"
        }"#;
        let body: SubmitJobBody = serde_json::from_str(raw).unwrap();
        assert_eq!(body.request.persona_id, "critic");
        assert_eq!(body.callback_url.as_deref(), Some("https://example.com/hook"));
    }

    #[test]
    fn submit_body_callback_optional() {
        let raw = r#"{"personaId": "critic", "content": "annotate me"}"#;
        let body: SubmitJobBody = serde_json::from_str(raw).unwrap();
        assert!(body.callback_url.is_none());
    }

    #[test]
    fn status_response_uses_camel_case_and_omits_empty() {
        let response = JobStatusResponse {
            job_id: uuid::Uuid::nil(),
            status: "pending".to_string(),
            error: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            annotation: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("jobId").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("error").is_none());
        assert!(json.get("annotation").is_none());
    }
}
