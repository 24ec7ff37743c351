use fabric_submit_queue_job::{DbJob, Job};
use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};
use tracing::info;

use crate::errors::Result;

/// Inserts a new waiting job
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn add_job<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    job: &Job,
) -> Result<Job> {
    let sql = formatdoc!(
        r#"
            insert into {escaped_schema}._private_jobs (
                id, queue_name, payload, status, attempts_made, max_attempts,
                enqueued_at, process_at
            )
            values ($1, $2, $3::jsonb, 'waiting', 0, $4, $5, $6)
            returning *
        "#
    );

    let db_job: DbJob = query_as(&sql)
        .bind(job.id())
        .bind(job.queue_name())
        .bind(job.payload())
        .bind(job.max_attempts())
        .bind(job.enqueued_at())
        .bind(job.process_at())
        .fetch_one(executor)
        .await?;

    info!(
        job_id = %job.id(),
        queue_name = job.queue_name(),
        "Job added to queue"
    );

    Ok(db_job.try_into()?)
}
