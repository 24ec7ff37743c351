use indoc::indoc;

use super::Migration;

pub const M000001_MIGRATION: Migration = Migration {
    id: 1,
    name: "m000001",
    stmts: &[indoc! {r#"
        create table :SUBMIT_QUEUE_SCHEMA._private_jobs (
            id uuid primary key,
            seq bigint generated always as identity,
            queue_name text not null,
            payload jsonb not null default '{}'::jsonb,
            state jsonb,
            status text not null default 'waiting',
            attempts_made int not null default 0,
            max_attempts int not null default 5,
            result jsonb,
            failure_reason text,
            last_error text,
            enqueued_at timestamptz not null default now(),
            process_at timestamptz not null default now(),
            lock_until timestamptz,
            locked_by text,
            finished_at timestamptz,
            constraint jobs_status_check
                check (status in ('waiting', 'active', 'delayed', 'completed', 'failed')),
            constraint jobs_max_attempts_check check (max_attempts >= 1),
            constraint jobs_attempts_within_limit_check check (attempts_made <= max_attempts),
            constraint jobs_outcome_exclusive_check check (result is null or failure_reason is null),
            constraint jobs_lease_check check ((status = 'active') = (locked_by is not null))
        );
    "#}],
};
