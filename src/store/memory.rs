use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fabric_submit_queue_job::{Job, JobCounts, JobId, JobStatus};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{JobStore, StalledJobs, STALLED_FAILURE_REASON};
use crate::config::DEFAULT_QUEUE_NAME;
use crate::errors::Result;

/// Position of a job in a ready index: by due time, then by enqueue order.
type ReadyKey = (DateTime<Utc>, u64, JobId);

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<JobId, Job>,
    /// Enqueue order, breaks ties between jobs due at the same instant
    seqs: HashMap<JobId, u64>,
    next_seq: u64,
    waiting: BTreeSet<ReadyKey>,
    delayed: BTreeSet<ReadyKey>,
    active: HashSet<JobId>,
    /// Oldest finished at the front
    completed: VecDeque<JobId>,
    failed: VecDeque<JobId>,
}

impl MemoryState {
    fn ready_key(&self, job: &Job) -> ReadyKey {
        let seq = self.seqs.get(job.id()).copied().unwrap_or_default();
        (*job.process_at(), seq, *job.id())
    }

    fn unindex(&mut self, job: &Job) {
        let key = self.ready_key(job);
        match job.status() {
            JobStatus::Waiting => {
                self.waiting.remove(&key);
            }
            JobStatus::Delayed => {
                self.delayed.remove(&key);
            }
            JobStatus::Active => {
                self.active.remove(job.id());
            }
            JobStatus::Completed => self.completed.retain(|id| id != job.id()),
            JobStatus::Failed => self.failed.retain(|id| id != job.id()),
        }
    }

    fn index(&mut self, job: &Job) {
        let key = self.ready_key(job);
        match job.status() {
            JobStatus::Waiting => {
                self.waiting.insert(key);
            }
            JobStatus::Delayed => {
                self.delayed.insert(key);
            }
            JobStatus::Active => {
                self.active.insert(*job.id());
            }
            JobStatus::Completed => self.completed.push_back(*job.id()),
            JobStatus::Failed => self.failed.push_back(*job.id()),
        }
    }

    /// Applies `change` to a job, keeping its index membership in step.
    fn transition(&mut self, id: &JobId, change: impl FnOnce(&mut Job)) -> Option<JobStatus> {
        let mut job = self.jobs.remove(id)?;
        self.unindex(&job);
        change(&mut job);
        self.index(&job);
        let status = *job.status();
        self.jobs.insert(*id, job);
        Some(status)
    }

    fn is_leased_by(&self, id: &JobId, worker_id: &str) -> bool {
        self.jobs
            .get(id)
            .is_some_and(|job| job.is_leased_by(worker_id))
    }

    fn next_ready(&self, now: DateTime<Utc>) -> Option<JobId> {
        let due = |key: &&ReadyKey| key.0 <= now;
        let waiting = self.waiting.first().filter(due);
        let delayed = self.delayed.first().filter(due);
        match (waiting, delayed) {
            (Some(w), Some(d)) => Some(w.min(d).2),
            (Some(key), None) | (None, Some(key)) => Some(key.2),
            (None, None) => None,
        }
    }

    fn trim(&mut self, status: JobStatus, keep: usize) {
        loop {
            let ring = match status {
                JobStatus::Completed => &mut self.completed,
                JobStatus::Failed => &mut self.failed,
                _ => return,
            };
            if ring.len() <= keep {
                return;
            }
            if let Some(id) = ring.pop_front() {
                self.jobs.remove(&id);
                self.seqs.remove(&id);
            }
        }
    }
}

/// Job store kept in process memory.
///
/// Nothing survives a restart; use [`super::PgJobStore`] when jobs must be
/// durable. All operations serialize on one lock, which makes `claim`
/// trivially linearizable between the workers sharing this instance.
#[derive(Clone)]
pub struct MemoryJobStore {
    queue_name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_NAME)
    }
}

impl MemoryJobStore {
    pub fn new(queue_name: impl Into<String>) -> Self {
        MemoryJobStore {
            queue_name: queue_name.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Ids in one status index, in index order.
    pub async fn job_ids(&self, status: JobStatus) -> Vec<JobId> {
        let state = self.state.lock().await;
        match status {
            JobStatus::Waiting => state.waiting.iter().map(|key| key.2).collect(),
            JobStatus::Delayed => state.delayed.iter().map(|key| key.2).collect(),
            JobStatus::Active => state.active.iter().copied().collect(),
            JobStatus::Completed => state.completed.iter().copied().collect(),
            JobStatus::Failed => state.failed.iter().copied().collect(),
        }
    }
}

impl JobStore for MemoryJobStore {
    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn insert(&self, job: Job) -> Result<Job> {
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.seqs.insert(*job.id(), seq);
        state.index(&job);
        state.jobs.insert(*job.id(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn counts(&self) -> Result<JobCounts> {
        let state = self.state.lock().await;
        Ok(JobCounts {
            waiting: state.waiting.len() as u64,
            active: state.active.len() as u64,
            delayed: state.delayed.len() as u64,
            completed: state.completed.len() as u64,
            failed: state.failed.len() as u64,
        })
    }

    async fn claim(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let mut state = self.state.lock().await;
        let Some(id) = state.next_ready(now) else {
            return Ok(None);
        };
        state.transition(&id, |job| job.mark_active(worker_id, lock_until));
        Ok(state.jobs.get(&id).cloned())
    }

    async fn extend_lease(
        &self,
        id: JobId,
        worker_id: &str,
        lock_until: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if job.is_leased_by(worker_id) => {
                job.extend_lease(lock_until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        id: JobId,
        worker_id: &str,
        result: Value,
        now: DateTime<Utc>,
        keep: usize,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.is_leased_by(&id, worker_id) {
            return Ok(false);
        }
        state.transition(&id, |job| job.mark_completed(result, now));
        state.trim(JobStatus::Completed, keep);
        Ok(true)
    }

    async fn retry(
        &self,
        id: JobId,
        worker_id: &str,
        error: &str,
        process_at: DateTime<Utc>,
        job_state: Option<Value>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.is_leased_by(&id, worker_id) {
            return Ok(false);
        }
        state.transition(&id, |job| job.mark_delayed(error, process_at, job_state));
        Ok(true)
    }

    async fn fail(
        &self,
        id: JobId,
        worker_id: &str,
        reason: &str,
        now: DateTime<Utc>,
        keep: usize,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.is_leased_by(&id, worker_id) {
            return Ok(false);
        }
        state.transition(&id, |job| job.mark_failed(reason, now));
        state.trim(JobStatus::Failed, keep);
        Ok(true)
    }

    async fn promote_delayed(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        let mut state = self.state.lock().await;
        let due: Vec<JobId> = state
            .delayed
            .iter()
            .take_while(|key| key.0 <= now)
            .map(|key| key.2)
            .collect();
        for id in &due {
            state.transition(id, |job| job.mark_waiting(now));
        }
        Ok(due)
    }

    async fn recover_stalled(&self, now: DateTime<Utc>, keep_failed: usize) -> Result<StalledJobs> {
        let mut state = self.state.lock().await;
        let mut stalled: Vec<(DateTime<Utc>, JobId)> = state
            .active
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| job.is_stalled(now))
            .map(|job| (*job.process_at(), *job.id()))
            .collect();
        stalled.sort();

        let mut recovered = StalledJobs::default();
        for (_, id) in stalled {
            let status = state.transition(&id, |job| {
                if job.has_attempts_left() {
                    job.mark_waiting(now);
                } else {
                    job.mark_failed(STALLED_FAILURE_REASON, now);
                }
            });
            match status {
                Some(JobStatus::Waiting) => recovered.requeued.push(id),
                Some(JobStatus::Failed) => recovered.failed.push(id),
                _ => {}
            }
        }
        state.trim(JobStatus::Failed, keep_failed);
        Ok(recovered)
    }
}
