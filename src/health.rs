use std::time::Duration;

use fabric_submit_queue_job::JobCounts;
use tracing::warn;

use crate::errors::SubmitQueueError;
use crate::queue::JobQueue;
use crate::store::JobStore;

/// Answer of a liveness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// The store answered; job counts per status
    Healthy(JobCounts),
    Unhealthy(String),
}

impl Liveness {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Liveness::Healthy(_))
    }
}

/// Checks that the queue's store answers within `timeout`.
///
/// Any store error, or no answer in time, reports the queue as unhealthy.
pub async fn check_liveness<S: JobStore>(queue: &JobQueue<S>, timeout: Duration) -> Liveness {
    let result = match tokio::time::timeout(timeout, queue.get_counts()).await {
        Ok(result) => result,
        Err(_) => Err(SubmitQueueError::Timeout(timeout)),
    };

    match result {
        Ok(counts) => Liveness::Healthy(counts),
        Err(e) => {
            warn!(error = %e, "Job queue liveness check failed");
            Liveness::Unhealthy(e.to_string())
        }
    }
}
