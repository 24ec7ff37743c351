pub mod add_job;
pub mod claim_job;
pub mod complete_job;
pub mod extend_lease;
pub mod fail_job;
pub mod get_job;
pub mod job_counts;
pub mod promote_jobs;
pub mod retention;
pub mod stalled_jobs;
