use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fabric_submit_queue_job::JobId;
use fabric_submit_queue_shutdown_signal::ShutdownSignal;
use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::store::{JobStore, StalledJobs};

/// Outcome of one scheduler pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchedulerTick {
    /// Delayed jobs moved back to waiting
    pub promoted: Vec<JobId>,
    pub stalled: StalledJobs,
}

impl SchedulerTick {
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.stalled.is_empty()
    }
}

/// Keeps jobs from getting stuck.
///
/// On every interval it moves due `delayed` jobs back to `waiting` and takes
/// back `active` jobs whose lease ran out. Any number of schedulers may run
/// against the same store.
pub struct QueueScheduler<S> {
    store: Arc<S>,
    interval: Duration,
    max_failed_jobs: usize,
    /// Wakes the workers of this process when jobs become ready
    notifier: Arc<Notify>,
}

impl<S> Clone for QueueScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            interval: self.interval,
            max_failed_jobs: self.max_failed_jobs,
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: JobStore> QueueScheduler<S> {
    pub fn new(store: Arc<S>, interval: Duration, max_failed_jobs: usize) -> Self {
        Self::with_notifier(store, interval, max_failed_jobs, Arc::new(Notify::new()))
    }

    pub(crate) fn with_notifier(
        store: Arc<S>,
        interval: Duration,
        max_failed_jobs: usize,
        notifier: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            interval,
            max_failed_jobs,
            notifier,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one promotion and lease-recovery pass as of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<SchedulerTick> {
        let promoted = self.store.promote_delayed(now).await?;
        let stalled = self
            .store
            .recover_stalled(now, self.max_failed_jobs)
            .await?;

        if !promoted.is_empty() {
            info!(count = promoted.len(), "Promoted delayed jobs");
        }
        for job_id in &stalled.requeued {
            warn!(%job_id, "Job lease expired, job moved back to waiting");
        }
        for job_id in &stalled.failed {
            error!(%job_id, "Job lease expired on its last attempt, job failed");
        }

        let tick = SchedulerTick { promoted, stalled };
        if !tick.promoted.is_empty() || !tick.stalled.requeued.is_empty() {
            self.notifier.notify_waiters();
        }

        Ok(tick)
    }

    /// Ticks on every interval until `shutdown_signal` resolves.
    ///
    /// A failed pass is logged and retried on the next interval.
    pub async fn run(&self, mut shutdown_signal: ShutdownSignal) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(interval = ?self.interval, "Stalled job scheduler started");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_signal => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "Stalled job scheduler pass failed");
                    }
                }
            }
        }
        debug!("Stalled job scheduler stopped");
    }

    /// Runs the scheduler on its own task until the handle is stopped.
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shutdown_signal: ShutdownSignal = token.cancelled_owned().boxed().shared();
        let join = tokio::spawn(async move { self.run(shutdown_signal).await });

        SchedulerHandle { cancel, join }
    }
}

/// A scheduler running in the background.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the scheduler, waiting for a pass in progress to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            error!(error = %e, "Stalled job scheduler task ended abnormally");
        }
    }
}
