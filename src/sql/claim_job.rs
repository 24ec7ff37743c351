use chrono::{DateTime, Utc};
use fabric_submit_queue_job::{DbJob, Job};
use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};

use crate::errors::Result;

/// Locks the oldest ready job of the queue for `worker_id`.
///
/// `for update skip locked` lets concurrent claimers pass over a row another
/// transaction is taking, so each ready job is handed out once.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn claim_job<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    queue_name: &str,
    worker_id: &str,
    now: DateTime<Utc>,
    lock_until: DateTime<Utc>,
) -> Result<Option<Job>> {
    let sql = formatdoc!(
        r#"
            with j as (
                select jobs.id
                    from {escaped_schema}._private_jobs as jobs
                    where jobs.queue_name = $1
                    and jobs.status in ('waiting', 'delayed')
                    and jobs.process_at <= $3
                    order by jobs.process_at asc, jobs.seq asc
                    limit 1
                    for update
                    skip locked
            )
                update {escaped_schema}._private_jobs as jobs
                    set
                        status = 'active',
                        attempts_made = jobs.attempts_made + 1,
                        lock_until = $4,
                        locked_by = $2
                    from j
                    where jobs.id = j.id
                    returning jobs.*
        "#
    );

    let db_job: Option<DbJob> = query_as(&sql)
        .bind(queue_name)
        .bind(worker_id)
        .bind(now)
        .bind(lock_until)
        .fetch_optional(executor)
        .await?;

    Ok(db_job.map(Job::try_from).transpose()?)
}
