//! Where jobs live.
//!
//! The store is the single arbiter of job state: workers and schedulers never
//! share job records in memory, they go through these operations. `claim` is
//! the one operation that must be linearizable across every process using the
//! same store; the others only touch one job at a time.

use std::future::Future;

use chrono::{DateTime, Utc};
use fabric_submit_queue_job::{Job, JobCounts, JobId};
use serde_json::Value;

use crate::errors::Result;

mod memory;
mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::{PgJobStore, PgStoreOptions};

/// Failure reason recorded on a job whose lease expired on its last attempt.
pub const STALLED_FAILURE_REASON: &str = "job stalled more than allowable limit";

/// Jobs moved out of `active` by a lease-recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StalledJobs {
    /// Back in `waiting`, they still had attempts left
    pub requeued: Vec<JobId>,
    /// Moved to `failed`
    pub failed: Vec<JobId>,
}

impl StalledJobs {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed.is_empty()
    }
}

/// Persistence for one named queue.
///
/// Every state-changing operation takes the current time from the caller.
/// `complete`, `retry` and `fail` only apply while `worker_id` still holds the
/// job's lease; they return `false` when the lease was lost in the meantime.
/// Terminal transitions trim the matching retention window down to `keep`
/// jobs, evicting the oldest finished first.
pub trait JobStore: Send + Sync + 'static {
    fn queue_name(&self) -> &str;

    /// Persists a new job in `waiting`.
    fn insert(&self, job: Job) -> impl Future<Output = Result<Job>> + Send;

    fn get(&self, id: JobId) -> impl Future<Output = Result<Option<Job>>> + Send;

    fn counts(&self) -> impl Future<Output = Result<JobCounts>> + Send;

    /// Atomically moves the oldest ready job to `active` for `worker_id`.
    ///
    /// A job is ready when it is `waiting`, or `delayed` with
    /// `process_at <= now`. Two concurrent claims never return the same job.
    fn claim(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Job>>> + Send;

    /// Moves the end of the lease `worker_id` holds on the job to `lock_until`.
    ///
    /// Returns `false` when the lease was already lost.
    fn extend_lease(
        &self,
        id: JobId,
        worker_id: &str,
        lock_until: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// `active -> completed`
    fn complete(
        &self,
        id: JobId,
        worker_id: &str,
        result: Value,
        now: DateTime<Utc>,
        keep: usize,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// `active -> delayed`, eligible again at `process_at`.
    fn retry(
        &self,
        id: JobId,
        worker_id: &str,
        error: &str,
        process_at: DateTime<Utc>,
        state: Option<Value>,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// `active -> failed`
    fn fail(
        &self,
        id: JobId,
        worker_id: &str,
        reason: &str,
        now: DateTime<Utc>,
        keep: usize,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Moves every `delayed` job due at `now` back to `waiting`.
    fn promote_delayed(&self, now: DateTime<Utc>)
        -> impl Future<Output = Result<Vec<JobId>>> + Send;

    /// Takes back every `active` job whose lease ended before `now`.
    fn recover_stalled(
        &self,
        now: DateTime<Utc>,
        keep_failed: usize,
    ) -> impl Future<Output = Result<StalledJobs>> + Send;
}
