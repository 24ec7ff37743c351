//! Durable queue for ledger transaction submissions.
//!
//! A client enqueues a transaction and gets a job id back right away. Workers
//! claim jobs from a shared store, hand them to a [`SubmissionHandler`], and
//! record the outcome: transient failures are retried with backoff, permanent
//! ones and exhausted jobs fail. A scheduler promotes due retries and takes
//! back jobs whose worker went away. Clients learn the outcome by polling
//! [`JobQueue::get_job_summary`].
//!
//! ```no_run
//! use fabric_submit_queue::{
//!     handler_fn, PgStoreOptions, SubmitFailure, SubmitQueueConfig, SubmitRequest,
//!     SubmitTransaction,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SubmitQueueConfig::from_env()?;
//! let store = config
//!     .pg_store_options()
//!     .unwrap_or_else(|| PgStoreOptions::default().database_url("postgres://localhost/fabric"))
//!     .connect()
//!     .await?;
//!
//! let handler = handler_fn(|request: SubmitRequest<SubmitTransaction>| async move {
//!     // Submit to the ledger gateway here
//!     Ok::<_, SubmitFailure>(request.payload.transaction_name)
//! });
//!
//! let worker = config.worker_options().init(store, handler);
//! let queue = worker.create_queue();
//!
//! let job_id = queue
//!     .enqueue(SubmitTransaction::new("AirtelMSP", "CreateAsset").arg("asset1"), None)
//!     .await?;
//! println!("enqueued {job_id}");
//!
//! worker.run().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
mod builder;
pub mod config;
pub mod errors;
mod health;
mod job_spec;
mod queue;
mod runner;
mod scheduler;
mod sql;
pub mod store;
mod streams;
mod utils;

pub use crate::backoff::{BackoffPolicy, BackoffStrategy};
pub use crate::builder::WorkerOptions;
pub use crate::config::{ConfigError, LogLevel, SubmitQueueConfig};
pub use crate::errors::SubmitQueueError;
pub use crate::health::{check_liveness, Liveness};
pub use crate::job_spec::{JobSpec, JobSpecBuilder};
pub use crate::queue::JobQueue;
pub use crate::runner::{ProcessJobError, ReleaseJobError, Worker};
pub use crate::scheduler::{QueueScheduler, SchedulerHandle, SchedulerTick};
pub use crate::store::{
    JobStore, MemoryJobStore, PgJobStore, PgStoreOptions, StalledJobs, STALLED_FAILURE_REASON,
};
pub use crate::streams::StreamSource;

pub use fabric_submit_queue_handler::{
    handler_fn, HandlerFn, RunSubmissionError, SubmissionHandler, SubmitFailure, SubmitRequest,
};
pub use fabric_submit_queue_job::{
    DbJob, Job, JobBuilder, JobCounts, JobId, JobStatus, JobSummary, SubmitTransaction,
    UnknownJobStatus,
};
pub use fabric_submit_queue_shutdown_signal::{shutdown_signal, ShutdownSignal, ShutdownTrigger};
