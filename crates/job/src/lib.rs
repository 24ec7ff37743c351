use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

mod payload;
mod status;
mod summary;

pub use payload::SubmitTransaction;
pub use status::{JobStatus, UnknownJobStatus};
pub use summary::{JobCounts, JobSummary};

/// Opaque identifier of a job, assigned once at enqueue time.
///
/// Identifiers are UUIDv7 so that they sort by creation time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        JobId::new()
    }
}

impl From<Uuid> for JobId {
    fn from(value: Uuid) -> Self {
        JobId(value)
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

/// `DbJob` is a job row exactly as stored in the database.
///
/// The status is kept as raw text; converting into a [`Job`] validates it.
#[derive(FromRow, Getters, Debug, Clone, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct DbJob {
    id: Uuid,
    queue_name: String,
    payload: Value,
    state: Option<Value>,
    status: String,
    attempts_made: i32,
    max_attempts: i32,
    result: Option<Value>,
    failure_reason: Option<String>,
    last_error: Option<String>,
    enqueued_at: DateTime<Utc>,
    process_at: DateTime<Utc>,
    lock_until: Option<DateTime<Utc>>,
    locked_by: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

/// A submit job and everything known about its progress.
#[derive(Getters, Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[getset(get = "pub")]
#[builder(build_fn(private, name = "build_internal"), pattern = "owned")]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[builder(default)]
    id: JobId,
    #[builder(default = "String::from(\"submit\")", setter(into))]
    queue_name: String,
    /// Data needed by the submission handler, never modified after enqueue
    #[builder(default = "serde_json::json!({})")]
    payload: Value,
    /// Checkpoint carried from one attempt to the next
    #[builder(default, setter(strip_option))]
    state: Option<Value>,
    #[builder(default = "JobStatus::Waiting")]
    status: JobStatus,
    /// Incremented each time a worker claims the job
    #[builder(default)]
    attempts_made: i32,
    #[builder(default = "5")]
    max_attempts: i32,
    #[builder(default, setter(strip_option))]
    result: Option<Value>,
    #[builder(default, setter(strip_option, into))]
    failure_reason: Option<String>,
    /// Message of the last failed attempt, kept while the job is retried
    #[builder(default, setter(strip_option, into))]
    last_error: Option<String>,
    #[builder(default = "Utc::now()")]
    enqueued_at: DateTime<Utc>,
    /// Earliest time the job may be claimed
    #[builder(default = "Utc::now()")]
    process_at: DateTime<Utc>,
    /// Lease expiry while active
    #[builder(default, setter(strip_option))]
    lock_until: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option, into))]
    locked_by: Option<String>,
    #[builder(default, setter(strip_option))]
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbJob> for Job {
    type Error = UnknownJobStatus;

    fn try_from(db_job: DbJob) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId(db_job.id),
            queue_name: db_job.queue_name,
            payload: db_job.payload,
            state: db_job.state,
            status: db_job.status.parse()?,
            attempts_made: db_job.attempts_made,
            max_attempts: db_job.max_attempts,
            result: db_job.result,
            failure_reason: db_job.failure_reason,
            last_error: db_job.last_error,
            enqueued_at: db_job.enqueued_at,
            process_at: db_job.process_at,
            lock_until: db_job.lock_until,
            locked_by: db_job.locked_by,
            finished_at: db_job.finished_at,
        })
    }
}

impl Job {
    /// Creates a new builder for constructing a `Job`.
    pub fn builder() -> JobBuilder {
        JobBuilder::default()
    }

    /// A freshly enqueued job, waiting and never attempted.
    pub fn new_waiting(
        queue_name: impl Into<String>,
        payload: Value,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Job {
        Job {
            id: JobId::new(),
            queue_name: queue_name.into(),
            payload,
            state: None,
            status: JobStatus::Waiting,
            attempts_made: 0,
            max_attempts,
            result: None,
            failure_reason: None,
            last_error: None,
            enqueued_at: now,
            process_at: now,
            lock_until: None,
            locked_by: None,
            finished_at: None,
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary::from(self)
    }

    /// Whether another attempt is allowed after the current one.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    /// Whether the job may be claimed at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Waiting | JobStatus::Delayed => self.process_at <= now,
            _ => false,
        }
    }

    /// Whether `worker_id` still holds the lease on this job.
    pub fn is_leased_by(&self, worker_id: &str) -> bool {
        self.status == JobStatus::Active && self.locked_by.as_deref() == Some(worker_id)
    }

    /// Whether the job is active and its lease has run out.
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Active && self.lock_until.is_some_and(|until| until < now)
    }

    /// `waiting | delayed -> active`, counting the attempt.
    pub fn mark_active(&mut self, worker_id: &str, lock_until: DateTime<Utc>) {
        debug_assert!(self.status.can_transition_to(JobStatus::Active));
        self.status = JobStatus::Active;
        self.attempts_made += 1;
        self.lock_until = Some(lock_until);
        self.locked_by = Some(worker_id.to_string());
    }

    /// Pushes the end of the current lease back to `lock_until`.
    pub fn extend_lease(&mut self, lock_until: DateTime<Utc>) {
        debug_assert_eq!(self.status, JobStatus::Active);
        self.lock_until = Some(lock_until);
    }

    /// `active -> completed`
    pub fn mark_completed(&mut self, result: Value, now: DateTime<Utc>) {
        debug_assert!(self.status.can_transition_to(JobStatus::Completed));
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.failure_reason = None;
        self.finished_at = Some(now);
        self.release_lease();
    }

    /// `active -> delayed`, to be retried at `process_at`.
    pub fn mark_delayed(&mut self, error: &str, process_at: DateTime<Utc>, state: Option<Value>) {
        debug_assert!(self.status.can_transition_to(JobStatus::Delayed));
        self.status = JobStatus::Delayed;
        self.last_error = Some(error.to_string());
        self.process_at = process_at;
        if state.is_some() {
            self.state = state;
        }
        self.release_lease();
    }

    /// `active -> failed`
    pub fn mark_failed(&mut self, reason: &str, now: DateTime<Utc>) {
        debug_assert!(self.status.can_transition_to(JobStatus::Failed));
        self.status = JobStatus::Failed;
        self.result = None;
        self.failure_reason = Some(reason.to_string());
        self.last_error = Some(reason.to_string());
        self.finished_at = Some(now);
        self.release_lease();
    }

    /// `active | delayed -> waiting`; does not touch the attempt count.
    pub fn mark_waiting(&mut self, now: DateTime<Utc>) {
        debug_assert!(self.status.can_transition_to(JobStatus::Waiting));
        if self.status == JobStatus::Active {
            self.process_at = now;
        }
        self.status = JobStatus::Waiting;
        self.release_lease();
    }

    fn release_lease(&mut self) {
        self.lock_until = None;
        self.locked_by = None;
    }
}

impl JobBuilder {
    /// Builds the Job with all configured values.
    pub fn build(self) -> Job {
        self.build_internal()
            .expect("All fields have defaults, build should never fail")
    }
}
