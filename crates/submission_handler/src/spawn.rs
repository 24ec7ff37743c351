use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::{SubmissionHandler, SubmitFailure, SubmitRequest};

/// Why an attempt produced no output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunSubmissionError {
    #[error("Submission handler panicked")]
    Panic,
    #[error("Submission handler task was aborted")]
    Aborted,
    #[error("Job payload does not match the handler's payload type: {0}")]
    InvalidPayload(String),
    #[error("Submission output could not be serialized: {0}")]
    InvalidOutput(String),
    #[error(transparent)]
    Failed(#[from] SubmitFailure),
}

impl RunSubmissionError {
    /// Whether another attempt could succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RunSubmissionError::Panic | RunSubmissionError::Aborted => true,
            RunSubmissionError::Failed(failure) => failure.is_transient(),
            RunSubmissionError::InvalidPayload(_) | RunSubmissionError::InvalidOutput(_) => false,
        }
    }

    /// Checkpoint to store for the next attempt.
    pub fn state(&self) -> Option<&Value> {
        match self {
            RunSubmissionError::Failed(failure) => failure.state(),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct SpawnSubmissionResult {
    pub duration: Duration,
    pub result: Result<Value, RunSubmissionError>,
}

impl SpawnSubmissionResult {
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn result(&self) -> &Result<Value, RunSubmissionError> {
        &self.result
    }
}

/// Runs one attempt of `handler` on its own task.
///
/// The JSON payload is decoded into the handler's payload type first and the
/// handler output encoded back to JSON afterwards. Running on a separate task
/// turns a panicking handler into a [`RunSubmissionError::Panic`] instead of
/// taking the worker slot down with it.
pub async fn spawn_submission<H: SubmissionHandler>(
    handler: Arc<H>,
    request: SubmitRequest<Value>,
) -> SpawnSubmissionResult {
    let start = Instant::now();
    let result = run_submission(handler, request).await;
    SpawnSubmissionResult {
        duration: start.elapsed(),
        result,
    }
}

async fn run_submission<H: SubmissionHandler>(
    handler: Arc<H>,
    request: SubmitRequest<Value>,
) -> Result<Value, RunSubmissionError> {
    let payload = serde_json::from_value::<H::Payload>(request.payload.clone())
        .map_err(|e| RunSubmissionError::InvalidPayload(e.to_string()))?;
    let request = request.map_payload(|_| payload);

    let output = tokio::spawn(async move { handler.submit(request).await })
        .await
        .map_err(|e| {
            if e.is_panic() {
                RunSubmissionError::Panic
            } else {
                RunSubmissionError::Aborted
            }
        })??;

    serde_json::to_value(output).map_err(|e| RunSubmissionError::InvalidOutput(e.to_string()))
}
