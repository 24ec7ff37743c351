use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fabric_submit_queue_job::Job;
use fabric_submit_queue_shutdown_signal::ShutdownSignal;
use futures::{stream, Stream};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::error;

use crate::store::JobStore;
use crate::utils::add_duration;

/// What woke a worker slot up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamSource {
    Polling,
    Notification,
    RunOnce,
}

struct JobSignalStreamData {
    interval: tokio::time::Interval,
    notifier: Arc<Notify>,
    shutdown_signal: ShutdownSignal,
    concurrency: usize,
    /// Signals still to hand out for the last wake-up
    pending: Option<(usize, StreamSource)>,
}

/// Returns a stream that yields on every enqueue notification and on every
/// `poll_interval` tick. Each wake-up is repeated `concurrency` times so that
/// every idle slot gets a chance to claim. Ends on shutdown.
pub fn job_signal_stream(
    poll_interval: Duration,
    notifier: Arc<Notify>,
    shutdown_signal: ShutdownSignal,
    concurrency: usize,
) -> impl Stream<Item = StreamSource> {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let stream_data = JobSignalStreamData {
        interval,
        notifier,
        shutdown_signal,
        concurrency,
        pending: None,
    };

    stream::unfold(stream_data, |mut f| async move {
        if let Some((remaining, source)) = f.pending.take() {
            if remaining > 1 {
                f.pending = Some((remaining - 1, source));
            }
            return Some((source, f));
        }

        let source = tokio::select! {
            biased;
            _ = &mut f.shutdown_signal => return None,
            _ = f.interval.tick() => StreamSource::Polling,
            _ = f.notifier.notified() => StreamSource::Notification,
        };

        if f.concurrency > 1 {
            f.pending = Some((f.concurrency - 1, source));
        }
        Some((source, f))
    })
}

/// Returns a stream of jobs claimed for `worker_id`, one at a time as the
/// consumer asks for them. Ends when nothing is ready, on a store error, or
/// on shutdown.
pub fn job_stream<S: JobStore>(
    store: Arc<S>,
    worker_id: String,
    lease_duration: Duration,
    shutdown_signal: ShutdownSignal,
) -> impl Stream<Item = Job> {
    stream::unfold((), move |()| {
        let store = store.clone();
        let worker_id = worker_id.clone();

        let job_fut = async move {
            let now = Utc::now();
            match store
                .claim(&worker_id, now, add_duration(now, lease_duration))
                .await
            {
                Ok(Some(job)) => Some((job, ())),
                Ok(None) => None,
                Err(e) => {
                    error!(error = %e, "Could not claim job");
                    None
                }
            }
        };
        let shutdown_fut = shutdown_signal.clone();

        async move {
            tokio::select! {
                res = job_fut => res,
                _ = shutdown_fut => None
            }
        }
    })
}
