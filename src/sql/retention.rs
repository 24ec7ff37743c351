use fabric_submit_queue_job::JobStatus;
use indoc::formatdoc;
use sqlx::{query, PgConnection};

use crate::errors::Result;

/// Deletes all but the `keep` most recently finished jobs with `status`.
///
/// Must run in the transaction that finished the job. Trims of the same queue
/// and status are serialized on a transaction-scoped advisory lock: each one
/// starts after the previous has committed and sees every job it finished.
#[tracing::instrument(skip_all, err, fields(otel.kind="client", db.system="postgresql"))]
pub async fn trim_finished_jobs(
    conn: &mut PgConnection,
    escaped_schema: &str,
    queue_name: &str,
    status: JobStatus,
    keep: usize,
) -> Result<u64> {
    query("select pg_advisory_xact_lock(hashtext($1))")
        .bind(format!(
            "retention:{escaped_schema}:{queue_name}:{}",
            status.as_str()
        ))
        .execute(&mut *conn)
        .await?;

    let sql = formatdoc!(
        r#"
            delete from {escaped_schema}._private_jobs
                where id in (
                    select id from {escaped_schema}._private_jobs
                        where queue_name = $1 and status = $2
                        order by finished_at desc, seq desc
                        offset $3
                )
        "#
    );

    let deleted = query(&sql)
        .bind(queue_name)
        .bind(status.as_str())
        .bind(i64::try_from(keep).unwrap_or(i64::MAX))
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok(deleted)
}
