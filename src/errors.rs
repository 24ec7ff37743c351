use fabric_submit_queue_job::UnknownJobStatus;
use fabric_submit_queue_migrations::MigrateError;
use thiserror::Error;

/// Errors that can occur while talking to the job store.
///
/// These are infrastructure errors: they are surfaced to whoever called the
/// failing operation and never recorded as a job failure.
#[derive(Error, Debug)]
pub enum SubmitQueueError {
    /// An error occurred while executing an SQL query
    #[error("Error occured while query: {0}")]
    SqlError(#[from] sqlx::Error),

    /// An error occurred while serializing or deserializing JSON data
    #[error("Error while serializing payload: {0}")]
    JsonSerializeError(#[from] serde_json::Error),

    /// The schema could not be installed or upgraded
    #[error("Error occurred while migrating the database schema: {0}")]
    MigrationError(#[from] MigrateError),

    /// A stored row holds a status this version does not know
    #[error("Invalid job row: {0}")]
    InvalidJobRow(#[from] UnknownJobStatus),

    /// The options passed to enqueue are not acceptable
    #[error("Invalid job spec: {0}")]
    InvalidJobSpec(String),

    /// Neither a database URL nor a pool was supplied
    #[error("Missing database_url configuration - must provide either database_url or pg_pool")]
    MissingDatabaseUrl,

    /// The store did not answer in time
    #[error("Job store did not respond within {0:?}")]
    Timeout(std::time::Duration),
}

/// A Result type alias for SubmitQueueError.
pub type Result<T> = core::result::Result<T, SubmitQueueError>;
