//! Webhook delivery for terminal job transitions.
//!
//! Delivery is best effort and single shot: a callback failure is logged and
//! never affects the job's stored outcome.

use std::time::Duration;

use annolab_core::types::JobId;
use serde_json::json;
use tracing::{debug, warn};

/// Timeout for a single callback request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload sent when a job completes.
pub fn completed_payload(job_id: JobId, annotation_id: uuid::Uuid) -> serde_json::Value {
    json!({
        "jobId": job_id,
        "annotationId": annotation_id,
        "status": "completed",
    })
}

/// Payload sent when a job fails permanently.
pub fn failed_payload(job_id: JobId, error: &str) -> serde_json::Value {
    json!({
        "jobId": job_id,
        "status": "failed",
        "error": error,
    })
}

/// POSTs job outcomes to caller-supplied callback URLs.
#[derive(Clone)]
pub struct CallbackNotifier {
    client: reqwest::Client,
}

impl Default for CallbackNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackNotifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self { client }
    }

    /// Notify that a job completed with the given annotation.
    pub async fn notify_completed(&self, url: &str, job_id: JobId, annotation_id: uuid::Uuid) {
        self.send(url, job_id, completed_payload(job_id, annotation_id))
            .await;
    }

    /// Notify that a job failed permanently.
    pub async fn notify_failed(&self, url: &str, job_id: JobId, error: &str) {
        self.send(url, job_id, failed_payload(job_id, error)).await;
    }

    async fn send(&self, url: &str, job_id: JobId, payload: serde_json::Value) {
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(job_id = %job_id, url = %url, "Callback delivered");
            }
            Ok(response) => {
                warn!(
                    job_id = %job_id,
                    url = %url,
                    status = %response.status(),
                    "Callback rejected"
                );
            }
            Err(e) => {
                warn!(job_id = %job_id, url = %url, error = %e, "Callback delivery failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
