//! Per-connection receive loop and writer task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use relay_core::{Clock, ConnectionId, MessageTransform, TransformError, TransportError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::broadcast::{BroadcastReport, Dispatcher};
use super::connection::{CLOSE_AGAIN, CLOSE_AWAY, CLOSE_ERROR, CLOSE_NORMAL, Connection};
use super::registry::RegistrationHandle;
use crate::metrics::{
    CONNECTIONS_ACTIVE, DISCONNECTIONS_TOTAL, TRANSFORM_FAILURES_TOTAL, TRANSPORT_FAILURES_TOTAL,
};

/// Everything a session needs besides its own socket.
pub struct SessionContext {
    /// Fan-out over the shared registry.
    pub dispatcher: Dispatcher,
    /// Decorates inbound text before broadcast.
    pub transform: Arc<dyn MessageTransform>,
    /// Receipt-time source.
    pub clock: Arc<dyn Clock>,
    /// Upper bound on a single frame write.
    pub send_timeout: Duration,
}

/// Decorate one inbound message and broadcast it.
///
/// Returns `None` if the transform failed; the message is dropped and the
/// sender's connection is unaffected.
pub fn relay_text(ctx: &SessionContext, sender: &ConnectionId, raw: &str) -> Option<BroadcastReport> {
    let received_at = ctx.clock.now();
    let decorated = std::panic::catch_unwind(AssertUnwindSafe(|| {
        ctx.transform.apply(raw, received_at)
    }))
    .unwrap_or(Err(TransformError::Panicked));

    match decorated {
        Ok(text) => Some(ctx.dispatcher.broadcast(&text)),
        Err(e) => {
            counter!(TRANSFORM_FAILURES_TOTAL, "kind" => e.kind()).increment(1);
            warn!(
                conn_id = %sender,
                error = %e,
                error_kind = e.kind(),
                len = raw.len(),
                "dropping message that failed to transform"
            );
            None
        }
    }
}

fn close_reason(code: u16) -> &'static str {
    match code {
        CLOSE_NORMAL => "Connection closed",
        CLOSE_AWAY => "Server shutting down",
        CLOSE_AGAIN => "Client too slow",
        CLOSE_ERROR => "Transport error",
        _ => "",
    }
}

fn transport_failed(connection: &Connection, error: &TransportError) {
    counter!(TRANSPORT_FAILURES_TOTAL, "kind" => error.kind()).increment(1);
    warn!(
        conn_id = %connection.id,
        error = %error,
        error_kind = error.kind(),
        "transport error, closing connection"
    );
    connection.request_close(CLOSE_ERROR);
}

/// Drains the outbound queue into the socket until a close is requested,
/// then sends the close frame.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    connection: Arc<Connection>,
    send_timeout: Duration,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = connection.closed() => break,
            next = rx.recv() => match next {
                Some(frame) => frame,
                None => break,
            },
        };

        match tokio::time::timeout(send_timeout, sink.send(Message::Text(Utf8Bytes::from(&*frame))))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                transport_failed(&connection, &TransportError::Write(e.to_string()));
                break;
            }
            Err(_) => {
                transport_failed(&connection, &TransportError::Timeout(send_timeout));
                break;
            }
        }
    }

    let code = connection.close_code();
    let close = Message::Close(Some(CloseFrame {
        code,
        reason: close_reason(code).into(),
    }));
    // The peer may already be gone; close delivery is best effort.
    let _ = tokio::time::timeout(send_timeout, sink.send(close)).await;
    let _ = tokio::time::timeout(send_timeout, sink.close()).await;
}

/// Run one connection until it closes, then unregister it.
///
/// The caller has already registered `connection`; `handle` is consumed
/// here so the registry entry is removed on every exit path.
pub async fn run_session(
    socket: WebSocket,
    connection: Arc<Connection>,
    handle: RegistrationHandle,
    rx: mpsc::Receiver<Arc<str>>,
    ctx: Arc<SessionContext>,
) {
    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        sink,
        rx,
        Arc::clone(&connection),
        ctx.send_timeout,
    ));

    loop {
        // Frames the peer already sent are relayed before a pending close is honoured.
        let next = tokio::select! {
            biased;
            next = stream.next() => next,
            () = connection.closed() => break,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                let _ = relay_text(&ctx, &connection.id, text.as_str());
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(conn_id = %connection.id, len = data.len(), "ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                debug!(
                    conn_id = %connection.id,
                    code = frame.as_ref().map(|f| f.code),
                    "peer sent close"
                );
                connection.request_close(CLOSE_NORMAL);
                break;
            }
            Some(Err(e)) => {
                transport_failed(&connection, &TransportError::Read(e.to_string()));
                break;
            }
            None => {
                connection.request_close(CLOSE_NORMAL);
                break;
            }
        }
    }

    let _ = connection.begin_closing();
    let writer_budget = ctx.send_timeout.saturating_mul(2);
    if tokio::time::timeout(writer_budget, &mut writer).await.is_err() {
        debug!(conn_id = %connection.id, "writer did not finish, aborting");
        writer.abort();
    }
    let _ = connection.mark_closed();

    let registry = ctx.dispatcher.registry();
    let _ = registry.unregister(&handle);
    drop(handle);

    counter!(DISCONNECTIONS_TOTAL).increment(1);
    #[allow(clippy::cast_precision_loss)]
    gauge!(CONNECTIONS_ACTIVE).set(registry.len() as f64);
    info!(
        conn_id = %connection.id,
        code = connection.close_code(),
        duration_ms = u64::try_from(connection.age().as_millis()).unwrap_or(u64::MAX),
        drops = connection.drop_count(),
        "client disconnected"
    );
}
