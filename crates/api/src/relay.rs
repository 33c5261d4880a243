//! Bridges job queue terminal events onto the realtime hub.
//!
//! The queue knows nothing about WebSockets; it only publishes [`JobEvent`]s
//! on a broadcast channel. This relay subscribes and turns completions into
//! `annotation_created` system messages for every connected client.

use std::sync::Arc;

use annolab_core::realtime::{Envelope, MessageType};
use annolab_queue::JobEvent;
use tokio::sync::broadcast;

use crate::ws::BroadcastHub;

/// Run the relay loop until the queue's event channel closes.
///
/// Lagging behind the queue drops the oldest events; the jobs themselves
/// remain durable and queryable, only the push notification is lost.
pub async fn run(hub: Arc<BroadcastHub>, mut receiver: broadcast::Receiver<JobEvent>) {
    loop {
        match receiver.recv().await {
            Ok(JobEvent::Completed { job_id, annotation }) => {
                let envelope = Envelope::system(
                    MessageType::AnnotationCreated,
                    serde_json::json!({
                        "jobId": job_id,
                        "annotation": annotation,
                    }),
                );
                hub.publish(envelope).await;
            }
            Ok(JobEvent::Failed { job_id, error }) => {
                // Failures are reported through job status and callbacks,
                // not broadcast to collaborators.
                tracing::debug!(job_id = %job_id, error = %error, "Job failure not relayed");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event relay lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Queue event channel closed, relay shutting down");
                break;
            }
        }
    }
}
