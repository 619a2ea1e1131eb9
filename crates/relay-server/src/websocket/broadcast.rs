//! Fan-out of decorated messages to connected clients.

use std::sync::Arc;

use metrics::counter;
use relay_core::SendError;
use tracing::{debug, warn};

use super::connection::CLOSE_AGAIN;
use super::registry::ConnectionRegistry;
use crate::metrics::{BROADCASTS_TOTAL, DELIVERIES_TOTAL, SEND_FAILURES_TOTAL};

/// Outcome of one [`Dispatcher::broadcast`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections in the snapshot.
    pub recipients: usize,
    /// Connections the message was queued for.
    pub delivered: usize,
    /// Connections skipped because they were no longer `Open`.
    pub skipped: usize,
    /// Connections whose queue was full or gone; each was asked to close.
    pub failed: usize,
}

/// Delivers one message to every open connection in a registry snapshot.
///
/// Runs inside the calling session's task. Per-target delivery is a
/// non-blocking enqueue, so a slow target never delays the others; the
/// target's own writer performs the socket write.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Broadcast `message` to all open connections, the sender included.
    pub fn broadcast(&self, message: &str) -> BroadcastReport {
        let frame: Arc<str> = Arc::from(message);
        let targets = self.registry.snapshot();
        let mut report = BroadcastReport {
            recipients: targets.len(),
            ..BroadcastReport::default()
        };

        for target in &targets {
            match target.try_send(Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(SendError::NotOpen) => {
                    report.skipped += 1;
                    debug!(conn_id = %target.id, state = %target.state(), "skipping closed target");
                }
                Err(e) => {
                    report.failed += 1;
                    counter!(SEND_FAILURES_TOTAL, "kind" => e.kind()).increment(1);
                    warn!(
                        conn_id = %target.id,
                        error = %e,
                        error_kind = e.kind(),
                        drops = target.drop_count(),
                        "failed to deliver broadcast, closing target"
                    );
                    target.request_close(CLOSE_AGAIN);
                }
            }
        }

        counter!(BROADCASTS_TOTAL).increment(1);
        counter!(DELIVERIES_TOTAL).increment(report.delivered as u64);
        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "broadcast"
        );
        report
    }

    /// The registry this dispatcher reads from.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}
