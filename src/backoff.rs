use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the delay between retries evolves.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay doubles after every attempt
    Exponential,
}

impl Display for BackoffStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffStrategy::Fixed => write!(f, "fixed"),
            BackoffStrategy::Exponential => write!(f, "exponential"),
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "exponential" => Ok(BackoffStrategy::Exponential),
            other => Err(format!("unknown backoff type '{other}'")),
        }
    }
}

/// Delay before the next attempt of a job that failed transiently.
///
/// The policy is a pure function of the number of attempts already made, so
/// the same job always gets the same schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    strategy: BackoffStrategy,
    delay: Duration,
    /// Upper bound on exponential growth; unbounded when `None`
    max_delay: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::fixed(Duration::from_millis(3000))
    }
}

impl BackoffPolicy {
    pub fn new(strategy: BackoffStrategy, delay: Duration) -> Self {
        BackoffPolicy {
            strategy,
            delay,
            max_delay: None,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(BackoffStrategy::Fixed, delay)
    }

    pub fn exponential(delay: Duration) -> Self {
        Self::new(BackoffStrategy::Exponential, delay)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    pub fn base_delay(&self) -> Duration {
        self.delay
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Delay to wait after attempt number `attempts_made` failed.
    ///
    /// Attempt numbers start at 1; 0 is treated as 1.
    pub fn delay_for(&self, attempts_made: i32) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.delay,
            BackoffStrategy::Exponential => {
                let exponent = attempts_made.max(1) as u32 - 1;
                let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
                self.delay.checked_mul(factor).unwrap_or(Duration::MAX)
            }
        };

        match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }
}
