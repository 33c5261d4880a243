//! Repository for the `annotation_jobs` table.
//!
//! Status transitions are enforced in SQL: every mutation is guarded by a
//! `WHERE status = ...` clause, so a terminal job can never be reopened and
//! duplicate completion handling is a no-op (the caller observes `false`).

use annolab_core::types::{JobId, Timestamp};
use sqlx::PgPool;

use crate::models::annotation_job::AnnotationJob;
use crate::models::status::JobStatus;

/// Column list for `annotation_jobs` queries.
const COLUMNS: &str = "\
    id, status, request, callback_url, attempts, error, \
    annotation_id, result, run_after, created_at, updated_at";

/// Provides persistence operations for annotation jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job and return the stored row.
    pub async fn create(
        pool: &PgPool,
        request: &serde_json::Value,
        callback_url: Option<&str>,
    ) -> Result<AnnotationJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO annotation_jobs (status, request, callback_url) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnnotationJob>(&query)
            .bind(JobStatus::Pending.as_str())
            .bind(request)
            .bind(callback_url)
            .fetch_one(pool)
            .await
    }

    /// Fetch a job by id.
    pub async fn get(pool: &PgPool, id: JobId) -> Result<Option<AnnotationJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM annotation_jobs WHERE id = $1");
        sqlx::query_as::<_, AnnotationJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the next eligible pending job.
    ///
    /// FIFO by enqueue time among jobs whose `run_after` has elapsed.
    /// `FOR UPDATE SKIP LOCKED` guarantees no two workers ever own the same
    /// job; the claim also increments `attempts`.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<AnnotationJob>, sqlx::Error> {
        let query = format!(
            "UPDATE annotation_jobs \
             SET status = $1, attempts = attempts + 1, updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM annotation_jobs \
                 WHERE status = $2 AND run_after <= NOW() \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AnnotationJob>(&query)
            .bind(JobStatus::Active.as_str())
            .bind(JobStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Mark an active job completed with its annotation.
    ///
    /// Returns `true` if the transition happened, `false` if the job was
    /// not in `active` status (already terminal, or stolen — must not
    /// trigger callbacks or broadcasts again).
    pub async fn complete(
        pool: &PgPool,
        id: JobId,
        annotation_id: uuid::Uuid,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE annotation_jobs \
             SET status = $2, annotation_id = $3, result = $4, updated_at = NOW() \
             WHERE id = $1 AND status = $5",
        )
        .bind(id)
        .bind(JobStatus::Completed.as_str())
        .bind(annotation_id)
        .bind(result)
        .bind(JobStatus::Active.as_str())
        .execute(pool)
        .await?;
        Ok(rows.rows_affected() > 0)
    }

    /// Mark an active job failed with its final error message.
    ///
    /// Same transition guard as [`JobRepo::complete`].
    pub async fn fail(pool: &PgPool, id: JobId, error: &str) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE annotation_jobs \
             SET status = $2, error = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(id)
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .bind(JobStatus::Active.as_str())
        .execute(pool)
        .await?;
        Ok(rows.rows_affected() > 0)
    }

    /// Return an active job to `pending` for a later retry.
    ///
    /// `run_after` carries the backoff deadline; the job is invisible to
    /// [`JobRepo::claim_next`] until it elapses.
    pub async fn retry(pool: &PgPool, id: JobId, run_after: Timestamp) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE annotation_jobs \
             SET status = $2, run_after = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(id)
        .bind(JobStatus::Pending.as_str())
        .bind(run_after)
        .bind(JobStatus::Active.as_str())
        .execute(pool)
        .await?;
        Ok(rows.rows_affected() > 0)
    }
}
