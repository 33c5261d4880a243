//! Durable, retrying annotation job queue.
//!
//! Building blocks:
//!
//! - [`JobStore`] — the narrow persistence seam the queue needs
//!   (create/get/claim/complete/fail/retry), with a Postgres
//!   implementation over `annolab-db`.
//! - [`JobProcessor`] — executes a job payload; the production
//!   implementation wraps the inference client in the concurrency gate.
//! - [`JobQueue`] — the worker pool that drives the per-job state machine
//!   (`pending -> active -> completed | pending(retry) | failed`) with
//!   exponential backoff and best-effort webhook callbacks.
//! - [`JobEvent`] — broadcast notifications emitted on terminal
//!   transitions, consumed by the realtime relay.

pub mod backoff;
pub mod callback;
pub mod events;
pub mod processor;
pub mod queue;
pub mod store;

pub use backoff::BackoffPolicy;
pub use callback::CallbackNotifier;
pub use events::JobEvent;
pub use processor::{InferenceProcessor, JobProcessor, ProcessorError};
pub use queue::{JobQueue, QueueConfig, QueueError};
pub use store::{JobStore, PgJobStore, StoreError};
