use chrono::{DateTime, Utc};
use fabric_submit_queue_job::JobId;
use indoc::formatdoc;
use serde_json::Value;
use sqlx::{query, PgExecutor};

use crate::errors::Result;

/// Puts a job leased by `worker_id` back to sleep until `process_at`.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn retry_job<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    id: JobId,
    worker_id: &str,
    message: &str,
    process_at: DateTime<Utc>,
    state: Option<&Value>,
) -> Result<bool> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}._private_jobs as jobs
                set
                    status = 'delayed',
                    last_error = $3::text,
                    process_at = $4,
                    state = coalesce($5::jsonb, jobs.state),
                    lock_until = null,
                    locked_by = null
                where id = $1 and status = 'active' and locked_by = $2
        "#
    );

    let updated = query(&sql)
        .bind(id)
        .bind(worker_id)
        .bind(message)
        .bind(process_at)
        .bind(state)
        .execute(executor)
        .await?
        .rows_affected();

    Ok(updated == 1)
}

/// Fails a job leased by `worker_id` for good.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn fail_job<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    id: JobId,
    worker_id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}._private_jobs
                set
                    status = 'failed',
                    result = null,
                    failure_reason = $3::text,
                    last_error = $3::text,
                    finished_at = $4,
                    lock_until = null,
                    locked_by = null
                where id = $1 and status = 'active' and locked_by = $2
        "#
    );

    let updated = query(&sql)
        .bind(id)
        .bind(worker_id)
        .bind(message)
        .bind(now)
        .execute(executor)
        .await?
        .rows_affected();

    Ok(updated == 1)
}
