use serde_json::Value;
use thiserror::Error;

/// Why a submission attempt did not succeed, as classified by the handler.
///
/// `Transient` failures (network errors, endorsement or commit timeouts) are
/// retried until the job runs out of attempts. `Permanent` failures (the
/// contract rejected the transaction) fail the job straight away.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitFailure {
    #[error("{message}")]
    Transient {
        message: String,
        /// Checkpoint handed back to the next attempt
        state: Option<Value>,
    },
    #[error("{message}")]
    Permanent { message: String },
}

impl SubmitFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        SubmitFailure::Transient {
            message: message.into(),
            state: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        SubmitFailure::Permanent {
            message: message.into(),
        }
    }

    /// Attaches a checkpoint to a transient failure. Permanent failures have
    /// no next attempt, so the state is dropped.
    pub fn with_state(self, value: Value) -> Self {
        match self {
            SubmitFailure::Transient { message, .. } => SubmitFailure::Transient {
                message,
                state: Some(value),
            },
            permanent => permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SubmitFailure::Transient { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            SubmitFailure::Transient { message, .. } | SubmitFailure::Permanent { message } => {
                message
            }
        }
    }

    pub fn state(&self) -> Option<&Value> {
        match self {
            SubmitFailure::Transient { state, .. } => state.as_ref(),
            SubmitFailure::Permanent { .. } => None,
        }
    }
}
