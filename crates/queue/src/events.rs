//! Terminal-transition notifications emitted by the queue.
//!
//! Events are published on a `tokio::sync::broadcast` channel; subscribers
//! that fall behind lose the oldest events rather than blocking the workers.

use annolab_core::types::JobId;

/// A job reached a terminal state.
///
/// Emitted exactly once per job, on the real `active -> completed` or
/// `active -> failed` transition.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// The job produced an annotation.
    Completed {
        job_id: JobId,
        annotation: serde_json::Value,
    },
    /// The job exhausted its attempts (or its payload was unusable).
    Failed { job_id: JobId, error: String },
}
