//! Server shutdown: stop the listener, tear down every chat session, then
//! wait for the serve task.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::registry::ConnectionRegistry;

/// Outcome of [`ShutdownCoordinator::drain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions torn down by the shutdown.
    pub sessions_closed: usize,
    /// Whether the serve task ended within the timeout.
    pub serve_finished: bool,
}

/// Owns the server's shutdown token and the session teardown it triggers.
///
/// Session teardown runs exactly once, whichever of [`shutdown`](Self::shutdown),
/// [`sessions_closed`](Self::sessions_closed) or [`drain`](Self::drain) gets
/// there first. After it the registry refuses new sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    registry: Arc<ConnectionRegistry>,
    closed: OnceLock<usize>,
}

impl ShutdownCoordinator {
    /// Coordinator for the sessions in `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            registry,
            closed: OnceLock::new(),
        }
    }

    /// A clone of the shutdown token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fire the token and close every session. Returns the number closed by
    /// the first teardown; repeated calls return the same count.
    pub fn shutdown(&self) -> usize {
        self.token.cancel();
        self.close_sessions()
    }

    /// Resolves once the token fires, after every session is closed.
    ///
    /// Handed to axum as the graceful-shutdown signal, so the listener stops
    /// accepting only after sessions are gone.
    pub async fn sessions_closed(&self) {
        self.token.cancelled().await;
        let _ = self.close_sessions();
    }

    /// Shut down and wait up to `timeout` for the serve task.
    pub async fn drain(&self, serve: JoinHandle<()>, timeout: Duration) -> ShutdownReport {
        let sessions_closed = self.shutdown();
        let serve_finished = match tokio::time::timeout(timeout, serve).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "serve task failed during shutdown");
                true
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "serve task still running after shutdown timeout");
                false
            }
        };
        ShutdownReport {
            sessions_closed,
            serve_finished,
        }
    }

    fn close_sessions(&self) -> usize {
        *self.closed.get_or_init(|| {
            let closed = self.registry.shutdown_all();
            info!(closed, "chat sessions closed for shutdown");
            closed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::tests::session;
    use crate::websocket::registry::RegisterError;
    use taskhub_core::RoomKey;

    fn populated(n: u64) -> (Arc<ConnectionRegistry>, Vec<tokio::sync::mpsc::Receiver<Arc<String>>>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut receivers = Vec::new();
        for id in 1..=n {
            let (s, rx) = session(id);
            let _ = registry.register(Arc::clone(&s));
            let _ = registry.rooms().join(&s, &RoomKey::from(1));
            receivers.push(rx);
        }
        (registry, receivers)
    }

    #[tokio::test]
    async fn shutdown_closes_sessions_once() {
        let (registry, mut receivers) = populated(3);
        let coord = ShutdownCoordinator::new(Arc::clone(&registry));
        assert!(!coord.is_shutting_down());

        assert_eq!(coord.shutdown(), 3);
        assert_eq!(coord.shutdown(), 3);
        assert!(coord.is_shutting_down());
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.rooms().room_count(), 0);
        for rx in &mut receivers {
            assert!(rx.recv().await.is_none());
        }
    }

    #[test]
    fn registry_refuses_sessions_after_shutdown() {
        let (registry, _receivers) = populated(1);
        let coord = ShutdownCoordinator::new(Arc::clone(&registry));
        let _ = coord.shutdown();
        let (late, _rx) = session(9);
        assert_eq!(registry.register(late).unwrap_err(), RegisterError::ShuttingDown);
    }

    #[tokio::test]
    async fn signal_closes_sessions_when_token_fires() {
        let (registry, _receivers) = populated(2);
        let coord = Arc::new(ShutdownCoordinator::new(Arc::clone(&registry)));
        let signal = tokio::spawn({
            let coord = Arc::clone(&coord);
            async move { coord.sessions_closed().await }
        });
        tokio::task::yield_now().await;
        assert!(!signal.is_finished());
        assert_eq!(registry.count(), 2);

        coord.token().cancel();
        signal.await.unwrap();
        assert_eq!(registry.count(), 0);
        // Teardown already ran through the signal.
        assert_eq!(coord.shutdown(), 2);
    }

    #[tokio::test]
    async fn drain_waits_for_serve_task() {
        let (registry, _receivers) = populated(1);
        let coord = ShutdownCoordinator::new(registry);
        let token = coord.token();
        let serve = tokio::spawn(async move { token.cancelled().await });
        let report = coord.drain(serve, Duration::from_secs(5)).await;
        assert_eq!(
            report,
            ShutdownReport {
                sessions_closed: 1,
                serve_finished: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_on_stuck_serve_task() {
        let coord = ShutdownCoordinator::new(Arc::new(ConnectionRegistry::new()));
        let serve = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let report = coord.drain(serve, Duration::from_millis(100)).await;
        assert!(!report.serve_finished);
        assert_eq!(report.sessions_closed, 0);
    }
}
