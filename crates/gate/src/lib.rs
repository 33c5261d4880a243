//! Bounded-admission gate for calls against a capacity-limited backend.
//!
//! [`ConcurrencyGate`] caps how many tasks execute simultaneously,
//! regardless of how many logical callers submit work. Extra submitters
//! suspend (no busy wait) until a slot frees, and are admitted in
//! submission order via the FIFO fairness of [`tokio::sync::Semaphore`].
//!
//! The gate owns no business logic and holds no state about task identity,
//! only occupancy counts. Task errors never cross the gate boundary as
//! panics; callers always receive a [`QueueResult`] carrying either a value
//! or the task's own error.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Gate construction errors. The gate itself never errors for task
/// failures, only for misuse.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Capacity must be a positive integer.
    #[error("Gate capacity must be positive, got {0}")]
    InvalidCapacity(usize),
}

// ---------------------------------------------------------------------------
// QueueResult
// ---------------------------------------------------------------------------

/// Outcome of a gated task, with wall-clock timing breakdown.
///
/// `result` carries exactly one of value/error by construction, and
/// `total_time() == queue_time + processing_time`.
#[derive(Debug)]
pub struct QueueResult<T, E> {
    /// The task's own outcome.
    pub result: Result<T, E>,
    /// Wall-clock time spent waiting for a free execution slot.
    pub queue_time: Duration,
    /// Wall-clock time spent executing once admitted.
    pub processing_time: Duration,
}

impl<T, E> QueueResult<T, E> {
    /// Total wall-clock time from submission to completion.
    pub fn total_time(&self) -> Duration {
        self.queue_time + self.processing_time
    }

    /// `true` if the task produced a value.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

// ---------------------------------------------------------------------------
// GateStats
// ---------------------------------------------------------------------------

/// Read-only occupancy snapshot, for observability only.
///
/// Counts are sampled independently and may be momentarily inconsistent
/// under concurrent load; callers must not base control decisions on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    /// Tasks currently executing.
    pub active: usize,
    /// Submissions waiting for a slot.
    pub pending: usize,
    /// Configured capacity.
    pub max_concurrent: usize,
}

// ---------------------------------------------------------------------------
// ConcurrencyGate
// ---------------------------------------------------------------------------

/// Bounds the number of simultaneously in-flight calls to a backend.
///
/// Capacity is fixed at construction. Designed to be wrapped in `Arc` and
/// shared across workers.
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    max_concurrent: usize,
    active: AtomicUsize,
    pending: AtomicUsize,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `max_concurrent` tasks at once.
    pub fn new(max_concurrent: usize) -> Result<Self, GateError> {
        if max_concurrent == 0 {
            return Err(GateError::InvalidCapacity(max_concurrent));
        }
        Ok(Self {
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            active: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
        })
    }

    /// Run `task` under the gate, suspending until a slot is free.
    ///
    /// At most `max_concurrent` tasks execute concurrently; waiters are
    /// admitted first-submitted, first-admitted. A task error is returned
    /// inside the [`QueueResult`], never propagated as a panic.
    ///
    /// Cancellation-safe: the occupancy counters are released by drop
    /// guards, so a caller that drops this future mid-wait or mid-task
    /// (e.g. a `tokio::time::timeout`) leaves the stats accurate.
    pub async fn submit<T, E, F, Fut>(&self, task: F) -> QueueResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let submitted_at = Instant::now();

        let permit = {
            let _pending = CounterGuard::arm(&self.pending);
            self.semaphore.acquire().await
        };

        // The semaphore is owned by the gate and never closed.
        let _permit = permit.expect("gate semaphore is never closed");
        let queue_time = submitted_at.elapsed();

        let _active = CounterGuard::arm(&self.active);
        let started_at = Instant::now();
        let result = task().await;
        let processing_time = started_at.elapsed();

        QueueResult {
            result,
            queue_time,
            processing_time,
        }
    }

    /// Sample the current occupancy.
    pub fn stats(&self) -> GateStats {
        GateStats {
            active: self.active.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
            max_concurrent: self.max_concurrent,
        }
    }
}

/// Increments a counter while armed, decrements on drop.
///
/// Occupancy bookkeeping must survive cancellation: `submit` futures are
/// routinely dropped at an await point by caller-side timeouts.
struct CounterGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> CounterGuard<'a> {
    fn arm(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
