//! WebSocket session lifecycle: one connected peer from upgrade through
//! teardown.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};

use super::echo::EchoScheduler;
use super::heartbeat::HeartbeatMonitor;
use super::reader::ReaderLoop;
use super::stats::SessionStats;
use super::transport::{FrameSink, FrameSource};
use super::writer::WriteSerializer;
use crate::config::SessionConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::shutdown::{ShutdownCause, ShutdownCoordinator};

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Connection ID.
    pub conn_id: String,
    /// What ended the session.
    pub cause: ShutdownCause,
    /// Application messages received.
    pub messages_received: u64,
    /// Echo replies written.
    pub echoes_sent: u64,
    /// Echo replies dropped because the session ended first.
    pub echoes_abandoned: u64,
    /// Heartbeat probes written.
    pub probes_sent: u64,
    /// Heartbeat acknowledgments received.
    pub pongs_received: u64,
    /// Time from start to the end of teardown.
    pub duration: Duration,
}

/// A single connection's reader, prober, and echo replies, bound together by
/// one shutdown signal.
pub struct ConnectionSession {
    id: String,
    config: SessionConfig,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ConnectionSession {
    /// Create a standalone session.
    pub fn new(id: impl Into<String>, config: SessionConfig) -> Self {
        Self::with_shutdown(id.into(), config, ShutdownCoordinator::new())
    }

    /// Create a session that also ends when `parent` is cancelled.
    pub fn child_of(id: impl Into<String>, config: SessionConfig, parent: &CancellationToken) -> Self {
        Self::with_shutdown(id.into(), config, ShutdownCoordinator::child_of(parent))
    }

    fn with_shutdown(id: String, config: SessionConfig, shutdown: ShutdownCoordinator) -> Self {
        Self {
            id,
            config,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session's shutdown signal. Firing it ends the session.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Run the session over an already-upgraded connection.
    ///
    /// 1. Arms the liveness deadline and wraps `sink` in a write serializer
    /// 2. Starts the reader loop, the heartbeat prober and the echo dispatcher
    /// 3. Waits for the shutdown signal, whoever fires it
    /// 4. Closes the connection, joins the tasks and waits for echo replies
    #[instrument(skip_all, fields(conn_id = %self.id))]
    pub async fn run<R, W>(self, source: R, sink: W) -> SessionReport
    where
        R: FrameSource + 'static,
        W: FrameSink + 'static,
    {
        let started = Instant::now();
        let cfg = &self.config;
        info!("session started");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        let stats = Arc::new(SessionStats::default());
        let writer = Arc::new(
            WriteSerializer::new(Box::new(sink), cfg.write_wait).stop_on(self.shutdown.token()),
        );
        let (monitor, ack) = HeartbeatMonitor::new(cfg.ping_period, cfg.pong_wait);
        let (inbound_tx, inbound_rx) = mpsc::channel(cfg.inbound_capacity.max(1));
        let echo = Arc::new(EchoScheduler::new(
            writer.clone(),
            self.shutdown.clone(),
            stats.clone(),
            cfg.echo_delay,
        ));

        let reader = ReaderLoop::new(
            source,
            ack,
            cfg.read_limit,
            inbound_tx,
            self.shutdown.clone(),
            stats.clone(),
        );
        let reader = tokio::spawn(reader.run().in_current_span());
        let heartbeat = tokio::spawn(
            monitor
                .run(writer.clone(), self.shutdown.clone(), stats.clone())
                .in_current_span(),
        );
        let dispatcher = {
            let echo = echo.clone();
            tokio::spawn(async move { echo.run(inbound_rx).await }.in_current_span())
        };

        let cause = self.shutdown.wait().await;
        debug!(%cause, "session shutting down");

        let _ = writer.close().await;
        join("reader", reader).await;
        join("heartbeat", heartbeat).await;
        join("echo dispatcher", dispatcher).await;
        echo.drain().await;

        let report = SessionReport {
            conn_id: self.id.clone(),
            cause,
            messages_received: stats.messages_received(),
            echoes_sent: stats.echoes_sent(),
            echoes_abandoned: stats.echoes_abandoned(),
            probes_sent: stats.probes_sent(),
            pongs_received: stats.pongs_received(),
            duration: started.elapsed(),
        };

        info!(
            cause = %report.cause,
            messages = report.messages_received,
            echoes = report.echoes_sent,
            abandoned = report.echoes_abandoned,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "session closed"
        );
        counter!(WS_DISCONNECTIONS_TOTAL, "cause" => report.cause.label()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(report.duration.as_secs_f64());
        report
    }
}

async fn join<T>(name: &'static str, handle: JoinHandle<T>) {
    if let Err(e) = handle.await {
        warn!(task = name, error = %e, "session task failed");
    }
}
