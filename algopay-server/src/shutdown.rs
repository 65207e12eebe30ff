//! OS signal handling for graceful shutdown.
//!
//! [`ShutdownSignal`] turns SIGTERM/SIGINT (Ctrl+C on Windows) into a
//! cancelled [`CancellationToken`]. The same token stops the HTTP server and
//! the payment engine, so a single signal drains both.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token when the process is asked to stop.
pub struct ShutdownSignal {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ShutdownSignal {
    /// Registers the signal handlers and starts listening.
    ///
    /// The listener also ends if `token` is cancelled by someone else, for
    /// example when the server fails to bind.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn listen(token: CancellationToken) -> Result<Self, std::io::Error> {
        let tracker = TaskTracker::new();
        let trigger = token.clone();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tracker.spawn(async move {
                let name = tokio::select! {
                    () = trigger.cancelled() => return,
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                };
                tracing::info!(signal = name, "shutdown requested");
                trigger.cancel();
            });
        }

        #[cfg(windows)]
        {
            tracker.spawn(async move {
                tokio::select! {
                    () = trigger.cancelled() => {}
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!(signal = "ctrl-c", "shutdown requested");
                        trigger.cancel();
                    }
                }
            });
        }

        tracker.close();
        Ok(Self { tracker, token })
    }

    /// The token cancelled on shutdown.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits until shutdown was requested and the listener has exited.
    pub async fn wait(&self) {
        self.token.cancelled().await;
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_external_cancel_ends_listener() {
        let token = CancellationToken::new();
        let signal = ShutdownSignal::listen(token.clone()).unwrap();
        assert!(!signal.token().is_cancelled());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }
}
