//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: cause).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Failed upgrade attempts (counter).
pub const WS_UPGRADE_FAILURES_TOTAL: &str = "ws_upgrade_failures_total";
/// Connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound application messages total (counter).
pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
/// Echo replies written total (counter).
pub const WS_ECHOES_SENT_TOTAL: &str = "ws_echoes_sent_total";
/// Echo replies abandoned because the session ended first (counter).
pub const WS_ECHOES_ABANDONED_TOTAL: &str = "ws_echoes_abandoned_total";
/// Heartbeat probes written total (counter).
pub const WS_PROBES_SENT_TOTAL: &str = "ws_probes_sent_total";
/// Heartbeat acknowledgments received total (counter).
pub const WS_PONGS_RECEIVED_TOTAL: &str = "ws_pongs_received_total";
