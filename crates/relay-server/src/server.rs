//! `RelayServer`: router, WebSocket admission and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::{
    AcceptError, Clock, ConnectionId, MessageTransform, RelayError, SystemClock,
    TimestampTransform,
};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::health::{HealthResponse, health_check};
use crate::metrics::{ACCEPT_FAILURES_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL, render};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::Dispatcher;
use crate::websocket::connection::Connection;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::{SessionContext, run_session};

/// Shared state handed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<ConnectionRegistry>,
    session: Arc<SessionContext>,
    shutdown: Arc<ShutdownCoordinator>,
    tracker: TaskTracker,
    accepting: Arc<AtomicBool>,
    send_queue_capacity: usize,
    max_connections: usize,
    max_message_bytes: usize,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

/// The broadcast relay.
///
/// Built with [`new`](Self::new), optionally customised with the `with_*`
/// builders, then [`start`](Self::start)ed. [`stop_accepting`](Self::stop_accepting)
/// closes the listener but leaves live connections alone;
/// [`shutdown`](Self::shutdown) also closes every connection and waits for
/// their sessions to finish.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    transform: Arc<dyn MessageTransform>,
    clock: Arc<dyn Clock>,
    shutdown: Arc<ShutdownCoordinator>,
    tracker: TaskTracker,
    accepting: Arc<AtomicBool>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    acceptor: tokio::sync::Mutex<Option<Acceptor>>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl RelayServer {
    /// Create a server that stamps messages with the local system time.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            transform: Arc::new(TimestampTransform),
            clock: Arc::new(SystemClock),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            tracker: TaskTracker::new(),
            accepting: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            metrics: None,
            acceptor: tokio::sync::Mutex::new(None),
            local_addr: parking_lot::Mutex::new(None),
        }
    }

    /// Replace the message transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn MessageTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Replace the receipt-time clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Whether new connections are admitted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && !self.shutdown.is_shutting_down()
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Build the axum router: WebSocket route plus `/health` and `/metrics`.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: Arc::clone(&self.registry),
            session: Arc::new(SessionContext {
                dispatcher: Dispatcher::new(Arc::clone(&self.registry)),
                transform: Arc::clone(&self.transform),
                clock: Arc::clone(&self.clock),
                send_timeout: self.config.send_timeout,
            }),
            shutdown: Arc::clone(&self.shutdown),
            tracker: self.tracker.clone(),
            accepting: Arc::clone(&self.accepting),
            send_queue_capacity: self.config.send_queue_capacity,
            max_connections: self.config.max_connections,
            max_message_bytes: self.config.max_message_bytes,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route(&self.config.bind.path, get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and begin accepting connections.
    ///
    /// Returns the bound address. Fails if the server is already running,
    /// has been shut down, or the address cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr, RelayError> {
        if self.shutdown.is_shutting_down() {
            return Err(AcceptError::ShuttingDown.into());
        }
        let mut slot = self.acceptor.lock().await;
        if slot.is_some() {
            return Err(RelayError::Config("server already started".into()));
        }

        let acceptor = Acceptor::bind(&self.config.bind, self.router()).await?;
        let addr = acceptor.local_addr();
        *slot = Some(acceptor);
        *self.local_addr.lock() = Some(addr);
        self.accepting.store(true, Ordering::Release);

        info!(
            addr = %addr,
            url = %format!("ws://{addr}{}", self.config.bind.path),
            max_connections = self.config.max_connections,
            "relay started"
        );
        Ok(addr)
    }

    /// Stop admitting connections. Existing connections keep running.
    ///
    /// Idempotent; a no-op if the server was never started.
    pub async fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
        let acceptor = self.acceptor.lock().await.take();
        if let Some(acceptor) = acceptor {
            acceptor.stop(self.config.shutdown_timeout).await;
        }
    }

    /// Stop accepting, close every connection with "going away", and wait
    /// up to the configured shutdown timeout for sessions to finish.
    ///
    /// Returns `true` if every session finished in time.
    pub async fn shutdown(&self) -> bool {
        info!(connections = self.registry.len(), "shutting down");
        self.stop_accepting().await;
        let drained = self
            .shutdown
            .drain(&self.tracker, self.config.shutdown_timeout)
            .await;
        info!(drained, remaining = self.registry.len(), "shutdown complete");
        drained
    }
}

fn refuse(error: &AcceptError) {
    counter!(ACCEPT_FAILURES_TOTAL, "kind" => error.kind()).increment(1);
    warn!(error = %error, error_kind = error.kind(), "refused connection");
}

async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            refuse(&AcceptError::NotUpgrade(rejection.body_text()));
            return rejection.into_response();
        }
    };

    if !state.accepting.load(Ordering::Acquire) || state.shutdown.is_shutting_down() {
        refuse(&AcceptError::ShuttingDown);
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    if state.registry.len() >= state.max_connections {
        refuse(&AcceptError::AtCapacity {
            limit: state.max_connections,
        });
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let tracker = state.tracker.clone();
    upgrade
        .max_message_size(state.max_message_bytes)
        .on_failed_upgrade(|e: axum::Error| {
            refuse(&AcceptError::UpgradeFailed(e.to_string()));
        })
        .on_upgrade(move |socket| tracker.track_future(accept_connection(socket, state)))
}

async fn accept_connection(socket: WebSocket, state: AppState) {
    let (tx, rx) = mpsc::channel(state.send_queue_capacity);
    let connection = Arc::new(Connection::new(
        ConnectionId::new(),
        tx,
        state.shutdown.child_token(),
    ));

    let handle = match state.registry.register(Arc::clone(&connection)) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(conn_id = %connection.id, error = %e, "failed to register connection");
            return;
        }
    };

    counter!(CONNECTIONS_TOTAL).increment(1);
    #[allow(clippy::cast_precision_loss)]
    gauge!(CONNECTIONS_ACTIVE).set(state.registry.len() as f64);
    info!(
        conn_id = %connection.id,
        connections = state.registry.len(),
        "client connected"
    );

    run_session(socket, connection, handle, rx, state.session).await;
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let accepting =
        state.accepting.load(Ordering::Acquire) && !state.shutdown.is_shutting_down();
    Json(health_check(state.start_time, state.registry.len(), accepting))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(handle),
        )
            .into_response(),
        None => {
            debug!("metrics requested but no recorder installed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
