use chrono::{DateTime, Utc};
use fabric_submit_queue_job::{JobId, JobStatus};
use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};

use crate::errors::Result;
use crate::store::StalledJobs;

/// Releases every active job whose lease ended before `now`.
///
/// Jobs with attempts left go back to waiting with their last error untouched,
/// the others fail with `reason`. The attempt count is left alone; the next
/// claim increments it.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn recover_stalled_jobs<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    queue_name: &str,
    now: DateTime<Utc>,
    reason: &str,
) -> Result<StalledJobs> {
    let sql = formatdoc!(
        r#"
            update {escaped_schema}._private_jobs as jobs
                set
                    status = case when jobs.attempts_made < jobs.max_attempts
                        then 'waiting' else 'failed' end,
                    failure_reason = case when jobs.attempts_made < jobs.max_attempts
                        then null else $3::text end,
                    finished_at = case when jobs.attempts_made < jobs.max_attempts
                        then null else $2::timestamptz end,
                    process_at = case when jobs.attempts_made < jobs.max_attempts
                        then $2::timestamptz else jobs.process_at end,
                    last_error = case when jobs.attempts_made < jobs.max_attempts
                        then jobs.last_error else $3::text end,
                    lock_until = null,
                    locked_by = null
                where jobs.queue_name = $1
                and jobs.status = 'active'
                and jobs.lock_until < $2::timestamptz
                returning jobs.id, jobs.status
        "#
    );

    let rows: Vec<(JobId, String)> = query_as(&sql)
        .bind(queue_name)
        .bind(now)
        .bind(reason)
        .fetch_all(executor)
        .await?;

    let mut stalled = StalledJobs::default();
    for (id, status) in rows {
        match status.parse::<JobStatus>()? {
            JobStatus::Failed => stalled.failed.push(id),
            _ => stalled.requeued.push(id),
        }
    }

    Ok(stalled)
}
