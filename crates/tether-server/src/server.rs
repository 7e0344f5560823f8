//! `TetherServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, SessionConfig};
use crate::errors::{ServerError, UpgradeError};
use crate::health::{self, HealthResponse};
use crate::metrics::WS_UPGRADE_FAILURES_TOTAL;
use crate::websocket::session::ConnectionSession;
use crate::websocket::transport;

/// Live connection counters for `/health`.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    active: AtomicUsize,
    total: AtomicU64,
}

impl ConnectionStats {
    /// Count a new connection; it stays active until the guard drops.
    fn open(self: &Arc<Self>) -> ConnectionGuard {
        let _ = self.active.fetch_add(1, Ordering::Relaxed);
        let _ = self.total.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard(self.clone())
    }

    /// Connections currently open.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Connections opened since startup.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

struct ConnectionGuard(Arc<ConnectionStats>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Limits applied to every session.
    pub session_config: Arc<SessionConfig>,
    /// Connection counters.
    pub connections: Arc<ConnectionStats>,
    /// Server-wide shutdown token; every session is a child of it.
    pub shutdown: CancellationToken,
    /// Running sessions.
    pub sessions: TaskTracker,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The tether server.
pub struct TetherServer {
    config: ServerConfig,
    session_config: Arc<SessionConfig>,
    connections: Arc<ConnectionStats>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl TetherServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, session_config: SessionConfig) -> Self {
        Self {
            config,
            session_config: Arc::new(session_config),
            connections: Arc::new(ConnectionStats::default()),
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            session_config: self.session_config.clone(),
            connections: self.connections.clone(),
            shutdown: self.shutdown.clone(),
            sessions: self.sessions.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            match result {
                Ok(()) => info!("http listener stopped"),
                Err(e) => error!(error = %e, "http listener failed"),
            }
        });

        info!(%local_addr, "tether server listening");
        Ok((local_addr, handle))
    }

    /// Stop accepting connections and end every running session with
    /// `ServerShutdown`.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!(active = self.connections.active(), "server shutting down");
        }
        self.shutdown.cancel();
    }

    /// Wait for every session to finish tearing down.
    pub async fn wait_for_sessions(&self) {
        let _ = self.sessions.close();
        self.sessions.wait().await;
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the per-session configuration.
    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Get the connection counters.
    pub fn connections(&self) -> &Arc<ConnectionStats> {
        &self.connections
    }
}

/// Generate a new connection ID.
pub fn new_connection_id() -> String {
    format!("conn_{}", uuid::Uuid::now_v7())
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            let err = UpgradeError::Rejected(rejection.body_text());
            warn!(error = %err, "websocket upgrade failed");
            counter!(WS_UPGRADE_FAILURES_TOTAL).increment(1);
            return rejection.into_response();
        }
    };

    let conn_id = new_connection_id();
    let failed_id = conn_id.clone();
    let sessions = state.sessions.clone();
    ws.max_message_size(state.session_config.read_limit)
        .on_failed_upgrade(move |e: axum::Error| {
            let err = UpgradeError::Handshake(e.to_string());
            warn!(conn_id = %failed_id, error = %err, "websocket upgrade failed");
            counter!(WS_UPGRADE_FAILURES_TOTAL).increment(1);
        })
        .on_upgrade(move |socket| sessions.track_future(handle_socket(socket, conn_id, state)))
}

/// Run one upgraded connection to completion.
async fn handle_socket(socket: WebSocket, conn_id: String, state: AppState) {
    let _guard = state.connections.open();
    let session = ConnectionSession::child_of(
        conn_id,
        state.session_config.as_ref().clone(),
        &state.shutdown,
    );
    let (source, sink) = transport::split(socket);
    let report = session.run(source, sink).await;
    debug!(
        conn_id = %report.conn_id,
        cause = report.cause.label(),
        "connection released"
    );
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.active(),
        state.connections.total(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
