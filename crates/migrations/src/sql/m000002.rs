use indoc::indoc;

use super::Migration;

pub const M000002_MIGRATION: Migration = Migration {
    id: 2,
    name: "m000002",
    stmts: &[
        indoc! {r#"
            create index jobs_ready_idx
                on :SUBMIT_QUEUE_SCHEMA._private_jobs (queue_name, process_at, seq)
                where status in ('waiting', 'delayed');
        "#},
        indoc! {r#"
            create index jobs_lease_idx
                on :SUBMIT_QUEUE_SCHEMA._private_jobs (queue_name, lock_until)
                where status = 'active';
        "#},
        indoc! {r#"
            create index jobs_retention_idx
                on :SUBMIT_QUEUE_SCHEMA._private_jobs (queue_name, status, finished_at, seq)
                where status in ('completed', 'failed');
        "#},
    ],
};
