//! Shutdown coordination via `CancellationToken` and `TaskTracker`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// One cancellation source for the whole server.
///
/// Every connection's close token is a child of this token, so cancelling it
/// reaches every receive loop without closing sockets from another task.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not been triggered.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// New child token, cancelled with the root but cancellable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait up to `timeout` for every tracked task.
    ///
    /// Returns `true` if all tasks finished in time.
    pub async fn drain(&self, tracker: &TaskTracker, timeout: Duration) -> bool {
        self.shutdown();
        let _ = tracker.close();
        info!(
            task_count = tracker.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for sessions to finish"
        );

        if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
            warn!(
                remaining = tracker.len(),
                "shutdown timed out after {timeout:?}, some sessions may still be running"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
