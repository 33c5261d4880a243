//! Annotation job entity model.

use annolab_core::types::{JobId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `annotation_jobs` table.
///
/// The persisted row is the single source of truth for job status; worker
/// state is a cache that is written through to this record before any
/// externally observable effect (callback, broadcast).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnnotationJob {
    pub id: JobId,
    /// One of `pending`, `active`, `completed`, `failed`.
    pub status: String,
    /// Opaque inference request payload.
    pub request: serde_json::Value,
    pub callback_url: Option<String>,
    /// Execution attempts so far; incremented on each claim.
    pub attempts: i32,
    /// Last failure message; set only on transition to `failed`.
    pub error: Option<String>,
    /// Reference to the produced annotation; set only on completion.
    pub annotation_id: Option<uuid::Uuid>,
    /// The full annotation document; set only on completion.
    pub result: Option<serde_json::Value>,
    /// Earliest time the job is eligible to be claimed (retry backoff).
    pub run_after: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
