use std::sync::Arc;
use std::time::Duration;

use fabric_submit_queue_handler::SubmissionHandler;
use fabric_submit_queue_shutdown_signal::{shutdown_signal, ShutdownSignal};
use rand::RngCore;
use tokio::sync::Notify;

use crate::backoff::BackoffPolicy;
use crate::store::JobStore;
use crate::Worker;

/// Configuration of a worker pool.
///
/// Every setting has a default; [`crate::SubmitQueueConfig::worker_options`]
/// fills them from the environment.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use fabric_submit_queue::{
///     handler_fn, MemoryJobStore, SubmitFailure, SubmitRequest, SubmitTransaction,
///     WorkerOptions,
/// };
///
/// # async fn example() {
/// let handler = handler_fn(|request: SubmitRequest<SubmitTransaction>| async move {
///     Ok::<_, SubmitFailure>(request.payload.transaction_name)
/// });
///
/// let worker = WorkerOptions::default()
///     .concurrency(5)
///     .poll_interval(Duration::from_millis(500))
///     .init(MemoryJobStore::default(), handler);
///
/// worker.run().await;
/// # }
/// ```
#[derive(Default)]
pub struct WorkerOptions {
    /// Number of jobs processed at the same time
    concurrency: Option<usize>,
    /// How often idle slots look for ready jobs without being notified
    poll_interval: Option<Duration>,
    /// How long a claimed job stays leased to this worker
    lease_duration: Option<Duration>,
    backoff: Option<BackoffPolicy>,
    /// Attempts given to jobs enqueued without an explicit `JobSpec`
    max_attempts: Option<i32>,
    max_completed_jobs: Option<usize>,
    max_failed_jobs: Option<usize>,
    /// Whether `run` also drives the stalled-job scheduler
    scheduler: Option<bool>,
    stalled_interval: Option<Duration>,
    shutdown_signal: Option<ShutdownSignal>,
}

impl WorkerOptions {
    /// Builds a worker around `store` and `handler`.
    ///
    /// The worker gets a random id of the form `fabric_submit_queue_<hex>`,
    /// which is what the store records as the lease holder of its jobs.
    pub fn init<S, H>(self, store: S, handler: H) -> Worker<S, H>
    where
        S: JobStore,
        H: SubmissionHandler,
    {
        let mut random_bytes = [0u8; 9];
        rand::rng().fill_bytes(&mut random_bytes);

        Worker {
            worker_id: format!("fabric_submit_queue_{}", hex::encode(random_bytes)),
            concurrency: self.concurrency.unwrap_or(5),
            poll_interval: self.poll_interval.unwrap_or(Duration::from_millis(1000)),
            lease_duration: self.lease_duration.unwrap_or(Duration::from_secs(30)),
            backoff: self.backoff.unwrap_or_default(),
            max_attempts: self.max_attempts.unwrap_or(5),
            max_completed_jobs: self.max_completed_jobs.unwrap_or(1000),
            max_failed_jobs: self.max_failed_jobs.unwrap_or(1000),
            scheduler_enabled: self.scheduler.unwrap_or(true),
            stalled_interval: self.stalled_interval.unwrap_or(Duration::from_secs(30)),
            store: Arc::new(store),
            handler: Arc::new(handler),
            notifier: Arc::new(Notify::new()),
            shutdown_signal: self.shutdown_signal.unwrap_or_else(shutdown_signal),
        }
    }

    /// Sets how many jobs the worker runs at once.
    ///
    /// # Default
    /// 5
    ///
    /// # Panics
    /// Panics if the value is 0.
    pub fn concurrency(mut self, value: usize) -> Self {
        assert!(value > 0, "Concurrency must be greater than 0");
        self.concurrency = Some(value);
        self
    }

    /// Sets how often idle slots check the store for ready jobs.
    ///
    /// Jobs enqueued through this worker's [`crate::JobQueue`] wake the slots
    /// right away; polling picks up everything else, such as jobs enqueued by
    /// another process or retries coming due.
    ///
    /// # Default
    /// 1 second
    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = Some(value);
        self
    }

    /// Sets how long a job stays leased after being claimed.
    ///
    /// The worker renews the lease every half duration while the submission
    /// runs. A worker that stops renewing, because it crashed or lost the
    /// store, has its jobs recovered by the scheduler once the lease ends.
    ///
    /// # Default
    /// 30 seconds
    pub fn lease_duration(mut self, value: Duration) -> Self {
        self.lease_duration = Some(value);
        self
    }

    /// # Default
    /// Fixed, 3 seconds
    pub fn backoff(mut self, value: BackoffPolicy) -> Self {
        self.backoff = Some(value);
        self
    }

    /// Sets the attempts given to jobs that do not override them.
    ///
    /// # Default
    /// 5
    ///
    /// # Panics
    /// Panics if the value is less than 1.
    pub fn max_attempts(mut self, value: i32) -> Self {
        assert!(value > 0, "Max attempts must be greater than 0");
        self.max_attempts = Some(value);
        self
    }

    /// Sets how many completed jobs are kept. Older ones are deleted.
    ///
    /// # Default
    /// 1000
    pub fn max_completed_jobs(mut self, value: usize) -> Self {
        self.max_completed_jobs = Some(value);
        self
    }

    /// Sets how many failed jobs are kept. Older ones are deleted.
    ///
    /// # Default
    /// 1000
    pub fn max_failed_jobs(mut self, value: usize) -> Self {
        self.max_failed_jobs = Some(value);
        self
    }

    /// Sets whether [`Worker::run`] also runs the stalled-job scheduler.
    ///
    /// At least one process sharing the store must run a scheduler, or jobs
    /// held by a crashed worker stay active forever.
    ///
    /// # Default
    /// true
    pub fn scheduler(mut self, value: bool) -> Self {
        self.scheduler = Some(value);
        self
    }

    /// Sets how often the scheduler promotes due jobs and recovers expired leases.
    ///
    /// # Default
    /// 30 seconds
    pub fn stalled_interval(mut self, value: Duration) -> Self {
        self.stalled_interval = Some(value);
        self
    }

    /// Replaces the OS signal handler as the trigger for graceful shutdown.
    ///
    /// # Default
    /// SIGINT, SIGTERM or SIGHUP (Ctrl-C on windows)
    pub fn shutdown_signal(mut self, value: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(value);
        self
    }
}
