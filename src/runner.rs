use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fabric_submit_queue_handler::{
    spawn_submission, RunSubmissionError, SpawnSubmissionResult, SubmissionHandler, SubmitRequest,
};
use fabric_submit_queue_job::{Job, JobId};
use fabric_submit_queue_shutdown_signal::ShutdownSignal;
use futures::{FutureExt, StreamExt};
use getset::Getters;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::backoff::BackoffPolicy;
use crate::builder::WorkerOptions;
use crate::errors::SubmitQueueError;
use crate::queue::JobQueue;
use crate::scheduler::QueueScheduler;
use crate::store::JobStore;
use crate::streams::{job_signal_stream, job_stream, StreamSource};
use crate::utils::add_duration;

/// A pool of worker slots pulling jobs from one store and handing them to a
/// submission handler.
///
/// At most `concurrency` jobs are active at once through this worker. When all
/// slots are busy, ready jobs stay in the store until one frees up.
#[derive(Getters)]
#[getset(get = "pub")]
pub struct Worker<S, H> {
    /// Recorded as the lease holder of every job this worker claims
    pub(crate) worker_id: String,
    pub(crate) concurrency: usize,
    /// How often idle slots check the store without being notified
    pub(crate) poll_interval: Duration,
    pub(crate) lease_duration: Duration,
    pub(crate) backoff: BackoffPolicy,
    /// Default for jobs enqueued through [`Worker::create_queue`]
    pub(crate) max_attempts: i32,
    pub(crate) max_completed_jobs: usize,
    pub(crate) max_failed_jobs: usize,
    pub(crate) scheduler_enabled: bool,
    pub(crate) stalled_interval: Duration,
    pub(crate) store: Arc<S>,
    pub(crate) handler: Arc<H>,
    /// Shared with the queues and schedulers created from this worker
    #[getset(skip)]
    pub(crate) notifier: Arc<Notify>,
    pub(crate) shutdown_signal: ShutdownSignal,
}

impl<S: JobStore, H: SubmissionHandler> Worker<S, H> {
    pub fn options() -> WorkerOptions {
        WorkerOptions::default()
    }

    /// Processes jobs until the shutdown signal resolves.
    ///
    /// Every poll tick or enqueue notification lets each idle slot claim and
    /// run jobs until none is ready. When the scheduler is enabled it runs
    /// alongside the slots. On shutdown no new job is claimed and the
    /// submissions in flight run to completion before this returns.
    pub async fn run(&self) {
        info!(
            worker_id = %self.worker_id,
            concurrency = self.concurrency,
            queue_name = self.store.queue_name(),
            "Worker started"
        );

        let job_runner = self.job_runner();
        let scheduler = async {
            if self.scheduler_enabled {
                self.create_scheduler()
                    .run(self.shutdown_signal.clone())
                    .await;
            }
        };
        tokio::join!(job_runner, scheduler);

        info!(worker_id = %self.worker_id, "Worker stopped");
    }

    /// Processes every job ready right now, `concurrency` at a time, then
    /// returns.
    ///
    /// A job retried with a backoff that has already elapsed is ready again and
    /// is picked up by the same call.
    pub async fn run_once(&self) {
        let job_stream = job_stream(
            self.store.clone(),
            self.worker_id.clone(),
            self.lease_duration,
            self.shutdown_signal.clone(),
        );

        job_stream
            .for_each_concurrent(self.concurrency, |job| async move {
                let job_id = *job.id();
                match run_and_release_job(job, self, StreamSource::RunOnce).await {
                    Ok(()) => debug!(%job_id, "Job processed"),
                    Err(e) => error!(error = %e, "Error while processing job"),
                }
                // The stream ends at the first empty claim, jobs that became
                // ready since are drained from here
                self.drain(StreamSource::RunOnce).await;
            })
            .await;
    }

    async fn job_runner(&self) {
        let job_signal = job_signal_stream(
            self.poll_interval,
            self.notifier.clone(),
            self.shutdown_signal.clone(),
            self.concurrency,
        );

        debug!("Listening for jobs...");
        job_signal
            .for_each_concurrent(self.concurrency, |source| self.drain(source))
            .await;
    }

    /// Claims and runs jobs one after the other until none is ready.
    ///
    /// Stops early on shutdown or on a store error; the slot then waits for
    /// the next signal before trying again.
    async fn drain(&self, source: StreamSource) {
        while !self.is_shutting_down() {
            match process_one_job(self, source).await {
                Ok(Some(job_id)) => debug!(%job_id, "Job processed"),
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Slot stopped after an error");
                    break;
                }
            }
        }
    }

    /// Busy slots do not poll the shared signal, so look at it directly.
    fn is_shutting_down(&self) -> bool {
        self.shutdown_signal.clone().now_or_never().is_some()
    }

    /// A producer handle on the same store, waking this worker's slots.
    pub fn create_queue(&self) -> JobQueue<S> {
        JobQueue::with_notifier(self.store.clone(), self.notifier.clone(), self.max_attempts)
    }

    /// A scheduler on the same store, waking this worker's slots.
    ///
    /// Use it to run the scheduler apart from the worker when
    /// [`WorkerOptions::scheduler`] is disabled.
    pub fn create_scheduler(&self) -> QueueScheduler<S> {
        QueueScheduler::with_notifier(
            self.store.clone(),
            self.stalled_interval,
            self.max_failed_jobs,
            self.notifier.clone(),
        )
    }
}

/// Errors that can occur while processing a job.
#[derive(Error, Debug)]
pub enum ProcessJobError {
    /// Error occurred when trying to complete or fail a job after processing
    #[error("An error occured while releasing a job : '{0}'")]
    ReleaseJobError(#[from] ReleaseJobError),
    /// Error occurred when trying to claim a job from the store
    #[error("An error occured while claiming a job to run : '{0}'")]
    ClaimJobError(#[from] SubmitQueueError),
}

/// Claims a single job and runs it.
///
/// Returns the id of the processed job, or `None` when nothing was ready.
async fn process_one_job<S: JobStore, H: SubmissionHandler>(
    worker: &Worker<S, H>,
    source: StreamSource,
) -> Result<Option<JobId>, ProcessJobError> {
    let now = Utc::now();
    let job = worker
        .store
        .claim(
            &worker.worker_id,
            now,
            add_duration(now, worker.lease_duration),
        )
        .await?;

    match job {
        Some(job) => {
            let job_id = *job.id();
            run_and_release_job(job, worker, source).await?;
            Ok(Some(job_id))
        }
        None => {
            trace!(source = ?source, "No job found");
            Ok(None)
        }
    }
}

async fn run_and_release_job<S: JobStore, H: SubmissionHandler>(
    job: Job,
    worker: &Worker<S, H>,
    source: StreamSource,
) -> Result<(), ReleaseJobError> {
    debug!(
        source = ?source,
        job_id = %job.id(),
        attempt = job.attempts_made(),
        handler = worker.handler.identifier(),
        "Running submission"
    );

    let request = SubmitRequest {
        job_id: *job.id(),
        attempt: *job.attempts_made(),
        max_attempts: *job.max_attempts(),
        payload: job.payload().clone(),
        state: job.state().clone(),
    };
    let submission = spawn_submission(worker.handler.clone(), request);
    let spawn_result = renew_lease_during(submission, *job.id(), worker).await;

    release_job(spawn_result, &job, worker).await
}

/// Awaits `submission`, pushing the job's lease forward every half lease so
/// the scheduler does not take back a job that is still running.
///
/// Renewal stops once the lease is found lost; the outcome is then discarded
/// when released.
async fn renew_lease_during<S: JobStore, H: SubmissionHandler, F: Future>(
    submission: F,
    job_id: JobId,
    worker: &Worker<S, H>,
) -> F::Output {
    let period = (worker.lease_duration / 2).max(Duration::from_millis(1));
    let mut renewal = interval_at(Instant::now() + period, period);
    renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(submission);

    loop {
        tokio::select! {
            output = &mut submission => return output,
            _ = renewal.tick() => {
                let lock_until = add_duration(Utc::now(), worker.lease_duration);
                match worker
                    .store
                    .extend_lease(job_id, &worker.worker_id, lock_until)
                    .await
                {
                    Ok(true) => trace!(%job_id, %lock_until, "Job lease renewed"),
                    Ok(false) => {
                        warn!(%job_id, "Job lease lost while its submission was running");
                        return submission.await;
                    }
                    Err(e) => warn!(error = %e, %job_id, "Failed to renew job lease"),
                }
            }
        }
    }
}

/// Error that occurs when trying to record the outcome of a job.
///
/// The job stays active and is taken back once its lease expires.
#[derive(Error, Debug)]
#[error("Failed to release job '{job_id}'. {source}")]
pub struct ReleaseJobError {
    job_id: JobId,
    #[source]
    source: SubmitQueueError,
}

/// Records the outcome of an attempt in the store.
///
/// Success completes the job. A retryable failure with attempts left delays it
/// by the backoff for the attempt just made; any other failure fails it.
async fn release_job<S: JobStore, H: SubmissionHandler>(
    spawn_result: SpawnSubmissionResult,
    job: &Job,
    worker: &Worker<S, H>,
) -> Result<(), ReleaseJobError> {
    let job_id = *job.id();
    let duration = spawn_result.duration.as_millis();
    let now = Utc::now();
    let to_release_error = |source| ReleaseJobError { job_id, source };

    let (released, outcome) = match spawn_result.result {
        Ok(output) => {
            let released = worker
                .store
                .complete(
                    job_id,
                    &worker.worker_id,
                    output,
                    now,
                    worker.max_completed_jobs,
                )
                .await
                .map_err(to_release_error)?;
            if released {
                info!(
                    %job_id,
                    attempts = job.attempts_made(),
                    duration,
                    "Completed submission with success"
                );
            }
            (released, "completed")
        }
        Err(e) if e.is_retryable() && job.has_attempts_left() => {
            let delay = worker.backoff.delay_for(*job.attempts_made());
            let released = worker
                .store
                .retry(
                    job_id,
                    &worker.worker_id,
                    &e.to_string(),
                    add_duration(now, delay),
                    e.state().cloned(),
                )
                .await
                .map_err(to_release_error)?;
            if released {
                warn!(
                    error = %e,
                    %job_id,
                    attempts = job.attempts_made(),
                    max_attempts = job.max_attempts(),
                    retry_in = ?delay,
                    duration,
                    "Failed submission, will retry"
                );
            }
            (released, "delayed")
        }
        Err(e) => {
            let released = worker
                .store
                .fail(
                    job_id,
                    &worker.worker_id,
                    &e.to_string(),
                    now,
                    worker.max_failed_jobs,
                )
                .await
                .map_err(to_release_error)?;
            if released {
                log_failure(&e, job, duration);
            }
            (released, "failed")
        }
    };

    if !released {
        warn!(
            %job_id,
            outcome,
            "Job lease lost before its outcome was recorded, outcome discarded"
        );
    }

    Ok(())
}

fn log_failure(e: &RunSubmissionError, job: &Job, duration: u128) {
    if e.is_retryable() {
        error!(
            error = %e,
            job_id = %job.id(),
            attempts = job.attempts_made(),
            duration,
            "Job max attempts reached"
        );
    } else {
        error!(
            error = %e,
            job_id = %job.id(),
            attempts = job.attempts_made(),
            duration,
            "Submission failed permanently"
        );
    }
}
