//! Process configuration for the submit queue, read from environment
//! variables.
//!
//! In development the variables can be kept in a `.env` file, which
//! [`SubmitQueueConfig::from_env`] loads before reading the environment.

use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::backoff::{BackoffPolicy, BackoffStrategy};
use crate::builder::WorkerOptions;
use crate::store::PgStoreOptions;

/// Queue name used when `JOB_QUEUE_NAME` is not set
pub const DEFAULT_QUEUE_NAME: &str = "submit";
/// Postgres schema used when `SUBMIT_JOB_SCHEMA` is not set
pub const DEFAULT_SCHEMA: &str = "fabric_submit_queue";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("\"{name}\" should be one of [{allowed}]")]
    NotOneOf {
        name: &'static str,
        allowed: &'static str,
    },
    #[error("\"{name}\" should be a positive integer, got \"{value}\"")]
    NotPositiveInteger { name: &'static str, value: String },
    #[error("\"{name}\" should be either \"true\", \"false\", \"TRUE\", or \"FALSE\", got \"{value}\"")]
    NotBool { name: &'static str, value: String },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Silent,
}

impl LogLevel {
    /// `tracing` has no fatal level and calls silence `off`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Fatal | LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::Silent => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fatal" => LogLevel::Fatal,
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            "silent" => LogLevel::Silent,
            _ => return Err(()),
        })
    }
}

/// Everything the submit queue reads from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitQueueConfig {
    pub log_level: LogLevel,
    /// `SUBMIT_JOB_BACKOFF_TYPE`
    pub submit_job_backoff_type: BackoffStrategy,
    /// `SUBMIT_JOB_BACKOFF_DELAY`, in milliseconds
    pub submit_job_backoff_delay: u64,
    /// `SUBMIT_JOB_BACKOFF_MAX_DELAY`, in milliseconds
    pub submit_job_backoff_max_delay: Option<u64>,
    /// `SUBMIT_JOB_ATTEMPTS`
    pub submit_job_attempts: i32,
    /// `SUBMIT_JOB_CONCURRENCY`
    pub submit_job_concurrency: usize,
    /// `MAX_COMPLETED_SUBMIT_JOBS`
    pub max_completed_submit_jobs: usize,
    /// `MAX_FAILED_SUBMIT_JOBS`
    pub max_failed_submit_jobs: usize,
    /// `SUBMIT_JOB_QUEUE_SCHEDULER`; there must be at least one scheduler
    /// for retries to happen, more than one gives redundancy
    pub submit_job_queue_scheduler: bool,
    /// `SUBMIT_JOB_LOCK_DURATION`, in milliseconds
    pub submit_job_lock_duration: u64,
    /// `SUBMIT_JOB_STALLED_INTERVAL`, in milliseconds
    pub submit_job_stalled_interval: u64,
    /// `SUBMIT_JOB_POLL_INTERVAL`, in milliseconds
    pub submit_job_poll_interval: u64,
    pub database_url: Option<String>,
    pub schema: String,
    pub queue_name: String,
}

impl Default for SubmitQueueConfig {
    fn default() -> Self {
        SubmitQueueConfig {
            log_level: LogLevel::Info,
            submit_job_backoff_type: BackoffStrategy::Fixed,
            submit_job_backoff_delay: 3000,
            submit_job_backoff_max_delay: None,
            submit_job_attempts: 5,
            submit_job_concurrency: 5,
            max_completed_submit_jobs: 1000,
            max_failed_submit_jobs: 1000,
            submit_job_queue_scheduler: true,
            submit_job_lock_duration: 30_000,
            submit_job_stalled_interval: 30_000,
            submit_job_poll_interval: 1000,
            database_url: None,
            schema: DEFAULT_SCHEMA.to_string(),
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
        }
    }
}

impl SubmitQueueConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SubmitQueueConfig::default();
        let env = Lookup(lookup);

        Ok(SubmitQueueConfig {
            log_level: env.one_of(
                "LOG_LEVEL",
                "fatal, error, warn, info, debug, trace, silent",
                defaults.log_level,
            )?,
            submit_job_backoff_type: env.one_of(
                "SUBMIT_JOB_BACKOFF_TYPE",
                "fixed, exponential",
                defaults.submit_job_backoff_type,
            )?,
            submit_job_backoff_delay: env
                .positive("SUBMIT_JOB_BACKOFF_DELAY")?
                .unwrap_or(defaults.submit_job_backoff_delay),
            submit_job_backoff_max_delay: env.positive("SUBMIT_JOB_BACKOFF_MAX_DELAY")?,
            submit_job_attempts: env
                .positive("SUBMIT_JOB_ATTEMPTS")?
                .unwrap_or(defaults.submit_job_attempts),
            submit_job_concurrency: env
                .positive("SUBMIT_JOB_CONCURRENCY")?
                .unwrap_or(defaults.submit_job_concurrency),
            max_completed_submit_jobs: env
                .positive("MAX_COMPLETED_SUBMIT_JOBS")?
                .unwrap_or(defaults.max_completed_submit_jobs),
            max_failed_submit_jobs: env
                .positive("MAX_FAILED_SUBMIT_JOBS")?
                .unwrap_or(defaults.max_failed_submit_jobs),
            submit_job_queue_scheduler: env
                .strict_bool("SUBMIT_JOB_QUEUE_SCHEDULER")?
                .unwrap_or(defaults.submit_job_queue_scheduler),
            submit_job_lock_duration: env
                .positive("SUBMIT_JOB_LOCK_DURATION")?
                .unwrap_or(defaults.submit_job_lock_duration),
            submit_job_stalled_interval: env
                .positive("SUBMIT_JOB_STALLED_INTERVAL")?
                .unwrap_or(defaults.submit_job_stalled_interval),
            submit_job_poll_interval: env
                .positive("SUBMIT_JOB_POLL_INTERVAL")?
                .unwrap_or(defaults.submit_job_poll_interval),
            database_url: env.get("DATABASE_URL"),
            schema: env.get("SUBMIT_JOB_SCHEMA").unwrap_or(defaults.schema),
            queue_name: env.get("JOB_QUEUE_NAME").unwrap_or(defaults.queue_name),
        })
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        let policy = BackoffPolicy::new(
            self.submit_job_backoff_type,
            Duration::from_millis(self.submit_job_backoff_delay),
        );
        match self.submit_job_backoff_max_delay {
            Some(max_delay) => policy.with_max_delay(Duration::from_millis(max_delay)),
            None => policy,
        }
    }

    /// Worker settings derived from this configuration.
    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions::default()
            .concurrency(self.submit_job_concurrency)
            .max_attempts(self.submit_job_attempts)
            .backoff(self.backoff_policy())
            .max_completed_jobs(self.max_completed_submit_jobs)
            .max_failed_jobs(self.max_failed_submit_jobs)
            .scheduler(self.submit_job_queue_scheduler)
            .lease_duration(Duration::from_millis(self.submit_job_lock_duration))
            .stalled_interval(Duration::from_millis(self.submit_job_stalled_interval))
            .poll_interval(Duration::from_millis(self.submit_job_poll_interval))
    }

    /// Postgres store settings, if a database is configured.
    pub fn pg_store_options(&self) -> Option<PgStoreOptions> {
        let database_url = self.database_url.as_deref()?;
        Some(
            PgStoreOptions::default()
                .database_url(database_url)
                .schema(&self.schema)
                .queue_name(&self.queue_name),
        )
    }

    /// `EnvFilter` honouring `LOG_LEVEL`.
    pub fn tracing_filter(&self) -> EnvFilter {
        EnvFilter::new(self.log_level.as_directive())
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn one_of<T: FromStr>(
        &self,
        name: &'static str,
        allowed: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::NotOneOf { name, allowed }),
        }
    }

    fn positive<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
    {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        match value.trim().parse::<T>() {
            Ok(parsed) if parsed > T::default() => Ok(Some(parsed)),
            _ => Err(ConfigError::NotPositiveInteger { name, value }),
        }
    }

    fn strict_bool(&self, name: &'static str) -> Result<Option<bool>, ConfigError> {
        match self.get(name).as_deref() {
            None => Ok(None),
            Some("true" | "TRUE") => Ok(Some(true)),
            Some("false" | "FALSE") => Ok(Some(false)),
            Some(other) => Err(ConfigError::NotBool {
                name,
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<SubmitQueueConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SubmitQueueConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, SubmitQueueConfig::default());
        assert_eq!(config.submit_job_backoff_type, BackoffStrategy::Fixed);
        assert_eq!(config.submit_job_backoff_delay, 3000);
        assert_eq!(config.submit_job_attempts, 5);
        assert_eq!(config.submit_job_concurrency, 5);
        assert_eq!(config.max_completed_submit_jobs, 1000);
        assert_eq!(config.max_failed_submit_jobs, 1000);
        assert!(config.submit_job_queue_scheduler);
        assert_eq!(config.queue_name, "submit");
        assert!(config.pg_store_options().is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SUBMIT_JOB_BACKOFF_TYPE", "exponential"),
            ("SUBMIT_JOB_BACKOFF_DELAY", "1000"),
            ("SUBMIT_JOB_BACKOFF_MAX_DELAY", "60000"),
            ("SUBMIT_JOB_ATTEMPTS", "3"),
            ("SUBMIT_JOB_CONCURRENCY", "10"),
            ("MAX_COMPLETED_SUBMIT_JOBS", "50"),
            ("MAX_FAILED_SUBMIT_JOBS", "20"),
            ("SUBMIT_JOB_QUEUE_SCHEDULER", "false"),
            ("LOG_LEVEL", "silent"),
            ("DATABASE_URL", "postgres://localhost/fabric"),
        ])
        .unwrap();

        assert_eq!(config.submit_job_attempts, 3);
        assert_eq!(config.submit_job_concurrency, 10);
        assert!(!config.submit_job_queue_scheduler);
        assert_eq!(config.log_level.as_directive(), "off");

        let backoff = config.backoff_policy();
        assert_eq!(backoff.strategy(), BackoffStrategy::Exponential);
        assert_eq!(backoff.delay_for(3), Duration::from_millis(4000));
        assert_eq!(backoff.max_delay(), Some(Duration::from_secs(60)));
        assert!(config.pg_store_options().is_some());
    }

    #[test]
    fn test_rejects_unknown_backoff_type() {
        assert_eq!(
            config_from(&[("SUBMIT_JOB_BACKOFF_TYPE", "jitter")]),
            Err(ConfigError::NotOneOf {
                name: "SUBMIT_JOB_BACKOFF_TYPE",
                allowed: "fixed, exponential",
            })
        );
    }

    #[test]
    fn test_rejects_non_positive_integers() {
        for value in ["0", "-5", "five", "2.5"] {
            let err = config_from(&[("SUBMIT_JOB_ATTEMPTS", value)]).unwrap_err();
            assert_eq!(
                err,
                ConfigError::NotPositiveInteger {
                    name: "SUBMIT_JOB_ATTEMPTS",
                    value: value.to_string(),
                }
            );
        }
    }

    #[test]
    fn test_scheduler_flag_is_strict() {
        let err = config_from(&[("SUBMIT_JOB_QUEUE_SCHEDULER", "yes")]).unwrap_err();
        assert!(matches!(err, ConfigError::NotBool { .. }));
        assert_eq!(
            err.to_string(),
            "\"SUBMIT_JOB_QUEUE_SCHEDULER\" should be either \"true\", \"false\", \"TRUE\", or \"FALSE\", got \"yes\""
        );
    }
}
