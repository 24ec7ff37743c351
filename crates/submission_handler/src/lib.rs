mod failure;
mod handler;
mod request;
mod spawn;

pub use failure::SubmitFailure;
pub use handler::{handler_fn, HandlerFn, SubmissionHandler};
pub use request::SubmitRequest;
pub use spawn::{spawn_submission, RunSubmissionError, SpawnSubmissionResult};
