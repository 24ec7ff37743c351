use std::sync::Arc;

use chrono::Utc;
use fabric_submit_queue_job::{Job, JobCounts, JobId, JobSummary};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::info;

use crate::errors::Result;
use crate::store::JobStore;
use crate::JobSpec;

/// Producer side of a queue: accepts submissions and answers status polls.
///
/// Enqueueing is fire-and-forget. The caller gets the job id back once the
/// job is persisted and learns the outcome by polling [`JobQueue::get_job_summary`].
pub struct JobQueue<S> {
    store: Arc<S>,
    /// Wakes idle workers of this process when a job is added
    notifier: Arc<Notify>,
    default_max_attempts: i32,
}

impl<S> Clone for JobQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            default_max_attempts: self.default_max_attempts,
        }
    }
}

impl<S: JobStore> JobQueue<S> {
    /// A queue over `store` with no worker attached in this process.
    pub fn new(store: Arc<S>, default_max_attempts: i32) -> Self {
        Self::with_notifier(store, Arc::new(Notify::new()), default_max_attempts)
    }

    pub(crate) fn with_notifier(
        store: Arc<S>,
        notifier: Arc<Notify>,
        default_max_attempts: i32,
    ) -> Self {
        Self {
            store,
            notifier,
            default_max_attempts,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persists a new waiting job and returns its id.
    ///
    /// Returns only once the job is visible to workers. Fails with
    /// [`crate::SubmitQueueError::InvalidJobSpec`] when `spec` allows fewer
    /// than one attempt.
    pub async fn enqueue<P: Serialize>(&self, payload: P, spec: Option<JobSpec>) -> Result<JobId> {
        let spec = JobSpec::from(spec);
        let max_attempts = spec.resolve_max_attempts(self.default_max_attempts)?;
        let payload = serde_json::to_value(payload)?;

        let job = Job::new_waiting(self.store.queue_name(), payload, max_attempts, Utc::now());
        let job = self.store.insert(job).await?;

        info!(
            job_id = %job.id(),
            queue_name = job.queue_name(),
            max_attempts,
            "Enqueued submission"
        );
        self.notifier.notify_waiters();

        Ok(*job.id())
    }

    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        self.store.get(id).await
    }

    /// Status of a job as shown to the client that submitted it.
    pub async fn get_job_summary(&self, id: JobId) -> Result<Option<JobSummary>> {
        Ok(self.store.get(id).await?.as_ref().map(Job::summary))
    }

    /// Number of jobs in each status.
    pub async fn get_counts(&self) -> Result<JobCounts> {
        self.store.counts().await
    }
}
