//! The job queue worker pool and per-job state machine.
//!
//! Lifecycle of a job:
//!
//! ```text
//! pending --claim--> active --success--> completed
//!                      |                     ^ (terminal)
//!                      |--transient failure, attempts left--> pending (run_after)
//!                      '--attempts exhausted / bad payload--> failed (terminal)
//! ```
//!
//! Workers poll the store on an interval and drain all eligible jobs each
//! tick. Completion effects (event broadcast, callback delivery) fire only
//! when the store confirms a real `active -> terminal` transition, so a job
//! observed twice never notifies twice.

use std::sync::Arc;
use std::time::Duration;

use annolab_core::annotation::AnnotationRequest;
use annolab_core::types::JobId;
use annolab_core::CoreError;
use annolab_db::models::AnnotationJob;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::callback::CallbackNotifier;
use crate::events::JobEvent;
use crate::processor::JobProcessor;
use crate::store::{JobStore, StoreError};

/// Capacity of the terminal-event broadcast channel. Slow subscribers lag
/// and drop rather than block the workers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Grace period for each worker to finish its in-flight job on shutdown.
const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the worker pool.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of concurrent worker tasks.
    pub worker_count: usize,
    /// Maximum processing attempts per job.
    pub max_attempts: u32,
    /// Retry delay policy.
    pub backoff: BackoffPolicy,
    /// How often idle workers poll for claimable jobs.
    pub poll_interval: Duration,
    /// Ceiling on a single processing attempt. A timed-out attempt counts
    /// as a transient failure.
    pub job_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(120),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced to queue callers (submission and status lookup).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

/// Durable annotation job queue with retrying workers.
pub struct JobQueue<S: JobStore> {
    store: S,
    processor: Arc<dyn JobProcessor>,
    notifier: CallbackNotifier,
    event_tx: broadcast::Sender<JobEvent>,
    config: QueueConfig,
    cancel: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl<S: JobStore> JobQueue<S> {
    pub fn new(store: S, processor: Arc<dyn JobProcessor>, config: QueueConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            store,
            processor,
            notifier: CallbackNotifier::new(),
            event_tx,
            config,
            cancel: CancellationToken::new(),
            workers: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Validate and enqueue a request. The returned job is in `pending`
    /// status; processing happens asynchronously.
    pub async fn submit(
        &self,
        request: AnnotationRequest,
        callback_url: Option<String>,
    ) -> Result<AnnotationJob, QueueError> {
        request.validate()?;
        let payload = serde_json::to_value(&request)?;
        let job = self.store.create(payload, callback_url).await?;
        info!(job_id = %job.id, persona_id = %request.persona_id, "Job enqueued");
        Ok(job)
    }

    /// Look up a job's current state.
    pub async fn status(&self, id: JobId) -> Result<Option<AnnotationJob>, QueueError> {
        Ok(self.store.get(id).await?)
    }

    /// Subscribe to terminal-transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn the worker pool. Idempotent start is not supported; call once.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock().expect("worker list lock poisoned");
        for worker_id in 0..self.config.worker_count {
            let queue = Arc::clone(self);
            workers.push(tokio::spawn(async move {
                queue.run_worker(worker_id).await;
            }));
        }
        info!(worker_count = self.config.worker_count, "Job queue started");
    }

    /// Stop polling and wait for in-flight jobs to finish, bounded by a
    /// per-worker grace period.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().expect("worker list lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            if tokio::time::timeout(WORKER_SHUTDOWN_TIMEOUT, handle)
                .await
                .is_err()
            {
                warn!("Worker did not stop within grace period");
            }
        }
        info!("Job queue stopped");
    }

    // ---- worker loop ----

    async fn run_worker(&self, worker_id: usize) {
        debug!(worker_id, "Worker started");
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(worker_id, "Worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.drain(worker_id).await;
                }
            }
        }
    }

    /// Claim and execute jobs until the store runs dry or shutdown begins.
    async fn drain(&self, worker_id: usize) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.store.claim_next().await {
                Ok(Some(job)) => self.execute(job).await,
                Ok(None) => return,
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to claim job");
                    return;
                }
            }
        }
    }

    // ---- per-job state machine ----

    async fn execute(&self, job: AnnotationJob) {
        let request: AnnotationRequest = match serde_json::from_value(job.request.clone()) {
            Ok(request) => request,
            Err(e) => {
                // A payload that no longer deserializes will never succeed;
                // fail it without burning the remaining attempts.
                self.finalize_failure(&job, format!("Invalid job payload: {e}"))
                    .await;
                return;
            }
        };

        debug!(job_id = %job.id, attempt = job.attempts, "Processing job");
        let outcome =
            tokio::time::timeout(self.config.job_timeout, self.processor.process(&request)).await;

        match outcome {
            Ok(Ok(annotation)) => self.handle_success(&job, annotation).await,
            Ok(Err(e)) => self.handle_failure(&job, e.to_string()).await,
            Err(_) => {
                self.handle_failure(
                    &job,
                    format!(
                        "Processing attempt exceeded {}s timeout",
                        self.config.job_timeout.as_secs()
                    ),
                )
                .await
            }
        }
    }

    async fn handle_success(&self, job: &AnnotationJob, annotation: annolab_core::annotation::Annotation) {
        let result = match serde_json::to_value(&annotation) {
            Ok(value) => value,
            Err(e) => {
                self.handle_failure(job, format!("Failed to serialize annotation: {e}"))
                    .await;
                return;
            }
        };

        match self.store.complete(job.id, annotation.id, result.clone()).await {
            Ok(true) => {
                info!(job_id = %job.id, annotation_id = %annotation.id, "Job completed");
                let _ = self.event_tx.send(JobEvent::Completed {
                    job_id: job.id,
                    annotation: result,
                });
                if let Some(url) = &job.callback_url {
                    self.notifier
                        .notify_completed(url, job.id, annotation.id)
                        .await;
                }
            }
            Ok(false) => {
                debug!(job_id = %job.id, "Job already terminal, skipping completion effects");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to persist completion");
            }
        }
    }

    async fn handle_failure(&self, job: &AnnotationJob, error: String) {
        // `attempts` was incremented by the claim, so it counts this attempt.
        let attempts = job.attempts.max(0) as u32;
        if attempts < self.config.max_attempts {
            let delay = self.config.backoff.delay_for_attempt(attempts);
            let run_after = Utc::now()
                + chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
            match self.store.retry(job.id, run_after).await {
                Ok(true) => {
                    warn!(
                        job_id = %job.id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Job attempt failed, scheduling retry"
                    );
                }
                Ok(false) => {
                    debug!(job_id = %job.id, "Job already terminal, skipping retry");
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to persist retry");
                }
            }
        } else {
            self.finalize_failure(job, error).await;
        }
    }

    async fn finalize_failure(&self, job: &AnnotationJob, error: String) {
        match self.store.fail(job.id, error.clone()).await {
            Ok(true) => {
                error!(job_id = %job.id, attempts = job.attempts, error = %error, "Job failed permanently");
                let _ = self.event_tx.send(JobEvent::Failed {
                    job_id: job.id,
                    error: error.clone(),
                });
                if let Some(url) = &job.callback_url {
                    self.notifier.notify_failed(url, job.id, &error).await;
                }
            }
            Ok(false) => {
                debug!(job_id = %job.id, "Job already terminal, skipping failure effects");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Failed to persist failure");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use annolab_core::annotation::Annotation;
    use annolab_db::models::JobStatus;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::processor::ProcessorError;
    use crate::store::memory::MemoryJobStore;

    /// Processor that replays a scripted list of outcomes.
    struct StubProcessor {
        outcomes: Mutex<VecDeque<Result<(), String>>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl StubProcessor {
        fn new(outcomes: Vec<Result<(), String>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                delay: None,
            })
        }

        fn slow(delay: Duration, outcomes: Vec<Result<(), String>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                delay: Some(delay),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobProcessor for StubProcessor {
        async fn process(&self, request: &AnnotationRequest) -> Result<Annotation, ProcessorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.content.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()));
            match outcome {
                Ok(()) => Ok(Annotation {
                    id: uuid::Uuid::new_v4(),
                    persona_id: request.persona_id.clone(),
                    item_id: request.item_id.clone(),
                    annotation: format!("Annotated: {}", request.content),
                    confidence: 0.5,
                    created_at: Utc::now(),
                }),
                Err(e) => Err(ProcessorError::Inference(e)),
            }
        }
    }

    fn test_config(max_attempts: u32) -> QueueConfig {
        QueueConfig {
            worker_count: 1,
            max_attempts,
            backoff: BackoffPolicy {
                base: Duration::from_millis(1),
                multiplier: 2.0,
                max_delay: Duration::from_millis(10),
                jitter: false,
            },
            poll_interval: Duration::from_millis(5),
            job_timeout: Duration::from_secs(5),
        }
    }

    fn request(content: &str) -> AnnotationRequest {
        AnnotationRequest {
            persona_id: "persona-1".to_string(),
            content: content.to_string(),
            item_id: None,
            media_type: None,
            media_url: None,
        }
    }

    /// Poll the store until the job reaches the expected status.
    async fn wait_for_status(
        queue: &JobQueue<MemoryJobStore>,
        id: JobId,
        status: JobStatus,
    ) -> AnnotationJob {
        for _ in 0..500 {
            let job = queue.status(id).await.unwrap().unwrap();
            if job.status == status.as_str() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("job never reached status {status}");
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let processor = StubProcessor::new(vec![Ok(())]);
        let queue = JobQueue::new(MemoryJobStore::default(), processor.clone(), test_config(3));
        let mut events = queue.subscribe();
        queue.start();

        let job = queue.submit(request("hello"), None).await.unwrap();
        let done = wait_for_status(&queue, job.id, JobStatus::Completed).await;

        assert_eq!(done.attempts, 1);
        assert!(done.annotation_id.is_some());
        assert_eq!(
            done.result.as_ref().unwrap()["annotation"],
            "Annotated: hello"
        );
        match events.recv().await.unwrap() {
            JobEvent::Completed { job_id, .. } => assert_eq!(job_id, job.id),
            other => panic!("unexpected event: {other:?}"),
        }
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn retries_transient_failure_then_succeeds() {
        let processor = StubProcessor::new(vec![Err("model hiccup".to_string()), Ok(())]);
        let queue = JobQueue::new(MemoryJobStore::default(), processor.clone(), test_config(3));
        queue.start();

        let job = queue.submit(request("retry me"), None).await.unwrap();
        let done = wait_for_status(&queue, job.id, JobStatus::Completed).await;

        assert_eq!(done.attempts, 2);
        assert_eq!(processor.calls(), 2);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn exhausted_attempts_fail_permanently() {
        let processor = StubProcessor::new(vec![
            Err("down".to_string()),
            Err("down".to_string()),
            Err("down".to_string()),
        ]);
        let queue = JobQueue::new(MemoryJobStore::default(), processor.clone(), test_config(3));
        let mut events = queue.subscribe();
        queue.start();

        let job = queue.submit(request("doomed"), None).await.unwrap();
        let failed = wait_for_status(&queue, job.id, JobStatus::Failed).await;

        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.error.as_deref(), Some("down"));
        assert_eq!(processor.calls(), 3);
        match events.recv().await.unwrap() {
            JobEvent::Failed { job_id, error } => {
                assert_eq!(job_id, job.id);
                assert_eq!(error, "down");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // Terminal jobs are never claimed again.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(processor.calls(), 3);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn timed_out_attempt_is_transient() {
        let processor = StubProcessor::slow(Duration::from_millis(50), vec![]);
        let mut config = test_config(2);
        config.job_timeout = Duration::from_millis(10);
        let queue = JobQueue::new(MemoryJobStore::default(), processor.clone(), config);
        queue.start();

        let job = queue.submit(request("slow"), None).await.unwrap();
        let failed = wait_for_status(&queue, job.id, JobStatus::Failed).await;

        assert_eq!(failed.attempts, 2);
        assert!(failed.error.as_deref().unwrap().contains("timeout"));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn undeserializable_payload_fails_without_retries() {
        let processor = StubProcessor::new(vec![]);
        let store = MemoryJobStore::default();
        // Bypass submit() validation to plant a corrupt payload.
        let planted = store
            .create(serde_json::json!({"not": "a request"}), None)
            .await
            .unwrap();
        let queue = JobQueue::new(store, processor.clone(), test_config(3));
        queue.start();

        let failed = wait_for_status(&queue, planted.id, JobStatus::Failed).await;
        assert!(failed
            .error
            .as_deref()
            .unwrap()
            .starts_with("Invalid job payload"));
        assert_eq!(processor.calls(), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn completion_effects_fire_once() {
        let processor = StubProcessor::new(vec![Ok(())]);
        let queue = JobQueue::new(MemoryJobStore::default(), processor.clone(), test_config(3));
        let mut events = queue.subscribe();
        queue.start();

        let job = queue.submit(request("once"), None).await.unwrap();
        let done = wait_for_status(&queue, job.id, JobStatus::Completed).await;
        events.recv().await.unwrap();

        // Replaying success against a terminal job emits nothing.
        let annotation = Annotation {
            id: uuid::Uuid::new_v4(),
            persona_id: "persona-1".to_string(),
            item_id: None,
            annotation: "again".to_string(),
            confidence: 0.5,
            created_at: Utc::now(),
        };
        queue.handle_success(&done, annotation).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn jobs_processed_in_submission_order() {
        let processor = StubProcessor::new(vec![]);
        let queue = JobQueue::new(MemoryJobStore::default(), processor.clone(), test_config(3));

        let mut ids = Vec::new();
        for content in ["a", "b", "c"] {
            ids.push(queue.submit(request(content), None).await.unwrap().id);
        }
        queue.start();
        for id in &ids {
            wait_for_status(&queue, *id, JobStatus::Completed).await;
        }

        assert_eq!(*processor.seen.lock().unwrap(), vec!["a", "b", "c"]);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn submit_rejects_invalid_request() {
        let processor = StubProcessor::new(vec![]);
        let queue = JobQueue::new(MemoryJobStore::default(), processor, test_config(3));

        let mut bad = request("hello");
        bad.persona_id = String::new();
        let err = queue.submit(bad, None).await.unwrap_err();
        assert_matches!(err, QueueError::Validation(_));
    }

    #[tokio::test]
    async fn shutdown_stops_claiming() {
        let processor = StubProcessor::new(vec![]);
        let queue = JobQueue::new(MemoryJobStore::default(), processor.clone(), test_config(3));
        queue.start();
        queue.shutdown().await;

        queue.submit(request("late"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(processor.calls(), 0);
    }
}
