use std::pin::Pin;

use cfg_if::cfg_if;
use futures::{future::Shared, FutureExt};
use std::future::Future;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

cfg_if! {
    if #[cfg(windows)] {
        use tokio::signal::windows::*;

        async fn raw_shutdown_signal() {
            let (Ok(mut ctrl_c), Ok(mut ctrl_close), Ok(mut ctrl_shutdown)) =
                (ctrl_c(), ctrl_close(), ctrl_shutdown())
            else {
                warn!("Failed to attach windows shutdown signals, only manual shutdown will work");
                return futures::future::pending().await;
            };
            select! {
                _ = ctrl_c.recv() => (),
                _ = ctrl_close.recv() => (),
                _ = ctrl_shutdown.recv() => (),
            }
        }
    } else if #[cfg(unix)] {
        use tokio::signal::unix::*;

        async fn unix_shutdown_signal(signal_kind: SignalKind) {
            match signal(signal_kind) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen to unix shutdown signal");
                    futures::future::pending::<()>().await;
                }
            }
        }

        async fn raw_shutdown_signal() {
            select! {
                _ = unix_shutdown_signal(SignalKind::interrupt()) => (),
                _ = unix_shutdown_signal(SignalKind::terminate()) => (),
                _ = unix_shutdown_signal(SignalKind::hangup()) => (),
            };
        }
    } else {
        compile_error!("Your OS does not support shutdown signal ! Are you targeting wasm ?");
    }
}

/// A clonable future that resolves once shutdown has been requested.
pub type ShutdownSignal = Shared<Pin<Box<dyn Future<Output = ()> + Send>>>;

/// Resolves on SIGINT, SIGTERM or SIGHUP (Ctrl-C and console close on windows).
pub fn shutdown_signal() -> ShutdownSignal {
    async {
        raw_shutdown_signal().await;
        info!("Shutdown signal detected. Attempting graceful shutdown...");
    }
    .boxed()
    .shared()
}

/// Requests shutdown from code, e.g. from a test or an embedding server.
#[derive(Debug, Clone, Default)]
pub struct ShutdownTrigger {
    token: CancellationToken,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A signal resolving only when [`ShutdownTrigger::trigger`] is called.
    pub fn signal(&self) -> ShutdownSignal {
        self.token.clone().cancelled_owned().boxed().shared()
    }

    /// A signal resolving on the OS shutdown signals or on [`ShutdownTrigger::trigger`].
    pub fn signal_with_os(&self) -> ShutdownSignal {
        let token = self.token.clone();
        async move {
            select! {
                _ = raw_shutdown_signal() => {
                    info!("Shutdown signal detected. Attempting graceful shutdown...");
                },
                _ = token.cancelled() => {
                    info!("Shutdown requested. Attempting graceful shutdown...");
                },
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_resolves_every_clone() {
        let trigger = ShutdownTrigger::new();
        let signal = trigger.signal();
        let other = signal.clone();

        assert!(tokio::time::timeout(Duration::from_millis(20), signal.clone())
            .await
            .is_err());

        trigger.trigger();
        assert!(trigger.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), signal)
            .await
            .expect("signal should resolve");
        tokio::time::timeout(Duration::from_secs(1), other)
            .await
            .expect("clone should resolve");
    }

    #[tokio::test]
    async fn test_signal_created_after_trigger_is_already_resolved() {
        let trigger = ShutdownTrigger::new();
        trigger.trigger();
        tokio::time::timeout(Duration::from_millis(100), trigger.signal_with_os())
            .await
            .expect("signal should resolve immediately");
    }
}
