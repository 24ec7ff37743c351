use fabric_submit_queue_job::JobId;
use serde_json::Value;

/// One attempt at submitting a job's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest<P> {
    pub job_id: JobId,
    /// 1 for the first attempt
    pub attempt: i32,
    pub max_attempts: i32,
    pub payload: P,
    /// Checkpoint left by the previous attempt, if any
    pub state: Option<Value>,
}

impl<P> SubmitRequest<P> {
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> SubmitRequest<Q> {
        SubmitRequest {
            job_id: self.job_id,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            payload: f(self.payload),
            state: self.state,
        }
    }
}
