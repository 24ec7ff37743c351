use chrono::{DateTime, Utc};
use fabric_submit_queue_job::JobId;
use indoc::formatdoc;
use serde_json::Value;
use sqlx::{query, PgExecutor};

use crate::errors::Result;

/// Records the result of a job still leased by `worker_id`.
/// Returns whether the job was updated.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn complete_job<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    id: JobId,
    worker_id: &str,
    result: &Value,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}._private_jobs
                set
                    status = 'completed',
                    result = $3::jsonb,
                    failure_reason = null,
                    finished_at = $4,
                    lock_until = null,
                    locked_by = null
                where id = $1 and status = 'active' and locked_by = $2
        "#
    );

    let updated = query(&sql)
        .bind(id)
        .bind(worker_id)
        .bind(result)
        .bind(now)
        .execute(executor)
        .await?
        .rows_affected();

    Ok(updated == 1)
}
