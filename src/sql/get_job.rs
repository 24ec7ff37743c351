use fabric_submit_queue_job::{DbJob, Job, JobId};
use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};

use crate::errors::Result;

pub async fn get_job<'e>(
    executor: impl PgExecutor<'e>,
    escaped_schema: &str,
    queue_name: &str,
    id: JobId,
) -> Result<Option<Job>> {
    let sql = formatdoc!(
        r#"
            select * from {escaped_schema}._private_jobs
                where id = $1 and queue_name = $2
        "#
    );

    let db_job: Option<DbJob> = query_as(&sql)
        .bind(id)
        .bind(queue_name)
        .fetch_optional(executor)
        .await?;

    Ok(db_job.map(Job::try_from).transpose()?)
}
