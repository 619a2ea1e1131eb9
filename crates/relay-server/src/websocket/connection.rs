//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU16, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use relay_core::{ConnectionId, ConnectionState, SendError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Close code used when the peer initiated the close or the stream ended.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code used when the server is going away.
pub const CLOSE_AWAY: u16 = 1001;
/// Close code used after a transport error.
pub const CLOSE_ERROR: u16 = 1011;
/// Close code used when a client cannot keep up with broadcasts.
pub const CLOSE_AGAIN: u16 = 1013;

/// One connected client.
///
/// The registry and the dispatcher hold `Arc`s to this for membership and
/// delivery only. The session task that created it owns the socket and is
/// the only code that moves it to `Closed`.
pub struct Connection {
    /// Unique connection ID.
    pub id: ConnectionId,
    state: AtomicU8,
    /// Send side of the writer task's queue.
    tx: mpsc::Sender<Arc<str>>,
    /// Fired when anyone asks this connection to close (peer, dispatcher, shutdown).
    close: CancellationToken,
    /// Code to put in the close frame; `0` means "not chosen" (shutdown).
    close_code: AtomicU16,
    /// When this connection was established.
    pub connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Connection {
    /// Create an `Open` connection.
    ///
    /// `close` is usually a child of the server's shutdown token so that a
    /// shutdown reaches every connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>, close: CancellationToken) -> Self {
        Self {
            id,
            state: AtomicU8::new(ConnectionState::Open.as_u8()),
            tx,
            close,
            close_code: AtomicU16::new(0),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the connection accepts broadcasts.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && !self.close.is_cancelled()
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if !ConnectionState::from_u8(current).can_transition_to(next) {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                next.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// `Open → Closing`. Returns `false` if the connection was not `Open`.
    pub fn begin_closing(&self) -> bool {
        self.transition(ConnectionState::Closing)
    }

    /// Move to the terminal `Closed` state. Returns `true` only for the call
    /// that actually performed the transition.
    pub fn mark_closed(&self) -> bool {
        self.transition(ConnectionState::Closed)
    }

    /// Ask the owning session to close this connection with `code`.
    ///
    /// The first code wins. Idempotent.
    pub fn request_close(&self, code: u16) {
        let _ = self
            .close_code
            .compare_exchange(0, code, Ordering::AcqRel, Ordering::Acquire);
        let _ = self.begin_closing();
        self.close.cancel();
    }

    /// Whether a close has been requested (directly or via shutdown).
    pub fn close_requested(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once a close has been requested.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }

    /// Close code chosen by [`request_close`](Self::request_close), or
    /// [`CLOSE_AWAY`] if the close came from a server shutdown.
    pub fn close_code(&self) -> u16 {
        match self.close_code.load(Ordering::Acquire) {
            0 => CLOSE_AWAY,
            code => code,
        }
    }

    /// Queue one text frame for the writer task.
    ///
    /// Never waits: a full queue is reported as [`SendError::QueueFull`].
    pub fn try_send(&self, message: Arc<str>) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(SendError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Disconnected),
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (Connection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Connection::new(ConnectionId::new(), tx, CancellationToken::new());
        (conn, rx)
    }

    #[test]
    fn starts_open() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(conn.is_open());
        assert!(!conn.close_requested());
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(4);
        conn.try_send(Arc::from("hello")).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[test]
    fn send_to_full_queue_reports_queue_full() {
        let (conn, _rx) = make_connection(1);
        conn.try_send(Arc::from("msg1")).unwrap();
        assert_eq!(conn.try_send(Arc::from("msg2")), Err(SendError::QueueFull));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_to_closed_queue_reports_disconnected() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert_eq!(conn.try_send(Arc::from("x")), Err(SendError::Disconnected));
    }

    #[test]
    fn send_after_close_request_is_not_open() {
        let (conn, _rx) = make_connection(4);
        conn.request_close(CLOSE_NORMAL);
        assert_eq!(conn.try_send(Arc::from("x")), Err(SendError::NotOpen));
    }

    #[test]
    fn lifecycle_transitions() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.begin_closing());
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(!conn.begin_closing());
        assert!(conn.mark_closed());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.mark_closed());
    }

    #[test]
    fn open_can_close_directly() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.mark_closed());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.begin_closing());
    }

    #[test]
    fn request_close_moves_to_closing() {
        let (conn, _rx) = make_connection(4);
        conn.request_close(CLOSE_AGAIN);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.close_requested());
        assert!(!conn.is_open());
    }

    #[test]
    fn first_close_code_wins() {
        let (conn, _rx) = make_connection(4);
        conn.request_close(CLOSE_AGAIN);
        conn.request_close(CLOSE_NORMAL);
        assert_eq!(conn.close_code(), CLOSE_AGAIN);
    }

    #[test]
    fn shutdown_close_defaults_to_away() {
        let parent = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(ConnectionId::new(), tx, parent.child_token());
        parent.cancel();
        assert!(conn.close_requested());
        assert!(!conn.is_open());
        assert_eq!(conn.close_code(), CLOSE_AWAY);
    }

    #[tokio::test]
    async fn closed_future_resolves_after_request() {
        let (conn, _rx) = make_connection(4);
        let conn = Arc::new(conn);
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        conn.request_close(CLOSE_NORMAL);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn debug_shows_id_and_state() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = Connection::new(
            ConnectionId::from_raw("conn_dbg"),
            tx,
            CancellationToken::new(),
        );
        let s = format!("{conn:?}");
        assert!(s.contains("conn_dbg"));
        assert!(s.contains("Open"));
    }
}
