//! Persistence seam for the job queue.
//!
//! The queue only needs a handful of operations on the job record; they are
//! expressed as the [`JobStore`] trait so the worker logic can be exercised
//! against an in-memory store in tests while production runs on Postgres.
//!
//! Transition guards live behind this seam: `complete`, `fail`, and `retry`
//! return `false` when the job was not in `active` status, which is how the
//! queue detects (and skips) duplicate terminal handling.

use annolab_core::types::{JobId, Timestamp};
use annolab_db::models::AnnotationJob;
use annolab_db::repositories::JobRepo;
use annolab_db::DbPool;
use async_trait::async_trait;

/// Errors surfaced by a job store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The narrow persistence interface the queue depends on.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Persist a new job in `pending` status.
    async fn create(
        &self,
        request: serde_json::Value,
        callback_url: Option<String>,
    ) -> Result<AnnotationJob, StoreError>;

    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Option<AnnotationJob>, StoreError>;

    /// Atomically claim the next eligible pending job (FIFO by enqueue
    /// time), marking it `active` and incrementing `attempts`. No two
    /// callers ever receive the same job.
    async fn claim_next(&self) -> Result<Option<AnnotationJob>, StoreError>;

    /// Transition `active -> completed`, storing the annotation. Returns
    /// `false` if the job was not `active`.
    async fn complete(
        &self,
        id: JobId,
        annotation_id: uuid::Uuid,
        result: serde_json::Value,
    ) -> Result<bool, StoreError>;

    /// Transition `active -> failed`, storing the final error. Returns
    /// `false` if the job was not `active`.
    async fn fail(&self, id: JobId, error: String) -> Result<bool, StoreError>;

    /// Transition `active -> pending` with a backoff deadline. Returns
    /// `false` if the job was not `active`.
    async fn retry(&self, id: JobId, run_after: Timestamp) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

/// [`JobStore`] backed by the `annotation_jobs` table.
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(
        &self,
        request: serde_json::Value,
        callback_url: Option<String>,
    ) -> Result<AnnotationJob, StoreError> {
        Ok(JobRepo::create(&self.pool, &request, callback_url.as_deref()).await?)
    }

    async fn get(&self, id: JobId) -> Result<Option<AnnotationJob>, StoreError> {
        Ok(JobRepo::get(&self.pool, id).await?)
    }

    async fn claim_next(&self) -> Result<Option<AnnotationJob>, StoreError> {
        Ok(JobRepo::claim_next(&self.pool).await?)
    }

    async fn complete(
        &self,
        id: JobId,
        annotation_id: uuid::Uuid,
        result: serde_json::Value,
    ) -> Result<bool, StoreError> {
        Ok(JobRepo::complete(&self.pool, id, annotation_id, &result).await?)
    }

    async fn fail(&self, id: JobId, error: String) -> Result<bool, StoreError> {
        Ok(JobRepo::fail(&self.pool, id, &error).await?)
    }

    async fn retry(&self, id: JobId, run_after: Timestamp) -> Result<bool, StoreError> {
        Ok(JobRepo::retry(&self.pool, id, run_after).await?)
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (tests)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod memory {
    //! Mutex-protected in-memory store mirroring the Postgres transition
    //! guards, used by the queue worker tests.

    use std::collections::HashMap;

    use annolab_db::models::JobStatus;
    use chrono::Utc;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MemoryInner {
        jobs: HashMap<JobId, AnnotationJob>,
        /// Insertion order, for FIFO claiming.
        order: Vec<JobId>,
    }

    #[derive(Default)]
    pub struct MemoryJobStore {
        inner: Mutex<MemoryInner>,
    }

    #[async_trait]
    impl JobStore for MemoryJobStore {
        async fn create(
            &self,
            request: serde_json::Value,
            callback_url: Option<String>,
        ) -> Result<AnnotationJob, StoreError> {
            let now = Utc::now();
            let job = AnnotationJob {
                id: uuid::Uuid::new_v4(),
                status: JobStatus::Pending.as_str().to_string(),
                request,
                callback_url,
                attempts: 0,
                error: None,
                annotation_id: None,
                result: None,
                run_after: now,
                created_at: now,
                updated_at: now,
            };
            let mut inner = self.inner.lock().await;
            inner.order.push(job.id);
            inner.jobs.insert(job.id, job.clone());
            Ok(job)
        }

        async fn get(&self, id: JobId) -> Result<Option<AnnotationJob>, StoreError> {
            Ok(self.inner.lock().await.jobs.get(&id).cloned())
        }

        async fn claim_next(&self) -> Result<Option<AnnotationJob>, StoreError> {
            let now = Utc::now();
            let mut inner = self.inner.lock().await;
            let next_id = inner.order.iter().copied().find(|id| {
                inner
                    .jobs
                    .get(id)
                    .is_some_and(|job| job.status == JobStatus::Pending.as_str() && job.run_after <= now)
            });
            let Some(id) = next_id else {
                return Ok(None);
            };
            let job = inner.jobs.get_mut(&id).expect("job indexed in order list");
            job.status = JobStatus::Active.as_str().to_string();
            job.attempts += 1;
            job.updated_at = now;
            Ok(Some(job.clone()))
        }

        async fn complete(
            &self,
            id: JobId,
            annotation_id: uuid::Uuid,
            result: serde_json::Value,
        ) -> Result<bool, StoreError> {
            let mut inner = self.inner.lock().await;
            let Some(job) = inner.jobs.get_mut(&id) else {
                return Ok(false);
            };
            if job.status != JobStatus::Active.as_str() {
                return Ok(false);
            }
            job.status = JobStatus::Completed.as_str().to_string();
            job.annotation_id = Some(annotation_id);
            job.result = Some(result);
            job.updated_at = Utc::now();
            Ok(true)
        }

        async fn fail(&self, id: JobId, error: String) -> Result<bool, StoreError> {
            let mut inner = self.inner.lock().await;
            let Some(job) = inner.jobs.get_mut(&id) else {
                return Ok(false);
            };
            if job.status != JobStatus::Active.as_str() {
                return Ok(false);
            }
            job.status = JobStatus::Failed.as_str().to_string();
            job.error = Some(error);
            job.updated_at = Utc::now();
            Ok(true)
        }

        async fn retry(&self, id: JobId, run_after: Timestamp) -> Result<bool, StoreError> {
            let mut inner = self.inner.lock().await;
            let Some(job) = inner.jobs.get_mut(&id) else {
                return Ok(false);
            };
            if job.status != JobStatus::Active.as_str() {
                return Ok(false);
            }
            job.status = JobStatus::Pending.as_str().to_string();
            job.run_after = run_after;
            job.updated_at = Utc::now();
            Ok(true)
        }
    }
}
