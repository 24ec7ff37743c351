use getset::Getters;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Job, JobId, JobStatus};

/// Number of jobs in each status index of a queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobCounts {
    pub fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Waiting => self.waiting,
            JobStatus::Active => self.active,
            JobStatus::Delayed => self.delayed,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
        }
    }

    pub fn get_mut(&mut self, status: JobStatus) -> &mut u64 {
        match status {
            JobStatus::Waiting => &mut self.waiting,
            JobStatus::Active => &mut self.active,
            JobStatus::Delayed => &mut self.delayed,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.waiting + self.active + self.delayed + self.completed + self.failed
    }
}

/// What a client polling for the outcome of its submission gets to see.
#[derive(Getters, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[getset(get = "pub")]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    job_id: JobId,
    status: JobStatus,
    attempts_made: i32,
    max_attempts: i32,
    result: Option<Value>,
    failure_reason: Option<String>,
    last_error: Option<String>,
    state: Option<Value>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        JobSummary {
            job_id: *job.id(),
            status: *job.status(),
            attempts_made: *job.attempts_made(),
            max_attempts: *job.max_attempts(),
            result: job.result().clone(),
            failure_reason: job.failure_reason().clone(),
            last_error: job.last_error().clone(),
            state: job.state().clone(),
        }
    }
}
