use std::sync::Arc;

use annolab_gate::ConcurrencyGate;
use annolab_inference::InferenceClient;
use annolab_queue::{JobQueue, PgJobStore};

use crate::ws::BroadcastHub;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Configuration is consumed at startup in `main`; handlers only see the
/// live objects built from it.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: annolab_db::DbPool,
    /// WebSocket broadcast hub.
    pub hub: Arc<BroadcastHub>,
    /// Annotation job queue.
    pub queue: Arc<JobQueue<PgJobStore>>,
    /// Inference admission gate (shared with the queue's processor).
    pub gate: Arc<ConcurrencyGate>,
    /// Model server client.
    pub inference: Arc<InferenceClient>,
}
