use chrono::{DateTime, Utc};
use fabric_submit_queue_job::JobId;
use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};

use crate::errors::Result;

/// Moves every delayed job due at `now` back to waiting.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn promote_delayed_jobs<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    queue_name: &str,
    now: DateTime<Utc>,
) -> Result<Vec<JobId>> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}._private_jobs
                set status = 'waiting'
                where queue_name = $1 and status = 'delayed' and process_at <= $2
                returning id
        "#
    );

    let ids: Vec<(JobId,)> = query_as(&sql)
        .bind(queue_name)
        .bind(now)
        .fetch_all(executor)
        .await?;

    Ok(ids.into_iter().map(|(id,)| id).collect())
}
