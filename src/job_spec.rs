use derive_builder::Builder;
use getset::{Getters, Setters};

use crate::errors::{Result, SubmitQueueError};

/// Per-job overrides applied at enqueue time.
///
/// ```
/// use fabric_submit_queue::JobSpec;
///
/// let spec = JobSpec::builder().max_attempts(3).build();
/// assert_eq!(spec.max_attempts(), &Some(3));
/// ```
#[derive(Getters, Setters, Debug, Default, Clone, PartialEq, Eq, Builder)]
#[getset(get = "pub", set = "pub")]
#[builder(
    build_fn(private, name = "build_internal"),
    setter(strip_option),
    default,
    pattern = "owned"
)]
pub struct JobSpec {
    /// Attempts allowed before the job fails for good.
    ///
    /// Falls back to the worker-wide setting (`SUBMIT_JOB_ATTEMPTS`) when unset.
    pub max_attempts: Option<i32>,
}

impl JobSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> JobSpecBuilder {
        JobSpecBuilder::new()
    }

    /// Attempts the job gets, given the queue-wide default.
    pub(crate) fn resolve_max_attempts(&self, default: i32) -> Result<i32> {
        match self.max_attempts {
            Some(n) if n < 1 => Err(SubmitQueueError::InvalidJobSpec(format!(
                "max_attempts must be at least 1, got {n}"
            ))),
            Some(n) => Ok(n),
            None => Ok(default),
        }
    }
}

impl JobSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> JobSpec {
        self.build_internal()
            .expect("There is a default value for all fields")
    }
}

impl From<Option<JobSpec>> for JobSpec {
    fn from(spec: Option<JobSpec>) -> Self {
        spec.unwrap_or_default()
    }
}
