use fabric_submit_queue_job::{JobCounts, JobStatus};
use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};

use crate::errors::Result;

pub async fn job_counts<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    queue_name: &str,
) -> Result<JobCounts> {
    let sql = formatdoc!(
        r#"
            select status, count(*)::bigint as count
                from {escaped_schema}._private_jobs
                where queue_name = $1
                group by status
        "#
    );

    let rows: Vec<(String, i64)> = query_as(&sql)
        .bind(queue_name)
        .fetch_all(executor)
        .await?;

    let mut counts = JobCounts::default();
    for (status, count) in rows {
        let status: JobStatus = status.parse()?;
        *counts.get_mut(status) = count as u64;
    }

    Ok(counts)
}
