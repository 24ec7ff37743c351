use chrono::{DateTime, Utc};
use fabric_submit_queue_job::JobId;
use indoc::formatdoc;
use sqlx::{query, PgExecutor};

use crate::errors::Result;

/// Moves `lock_until` of a job still leased by `worker_id`.
/// Returns whether the job was updated.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn extend_job_lease<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    id: JobId,
    worker_id: &str,
    lock_until: DateTime<Utc>,
) -> Result<bool> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}._private_jobs
                set lock_until = $3
                where id = $1 and status = 'active' and locked_by = $2
        "#
    );

    let updated = query(&sql)
        .bind(id)
        .bind(worker_id)
        .bind(lock_until)
        .execute(executor)
        .await?
        .rows_affected();

    Ok(updated == 1)
}
