//! Server and per-session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_settings::{LivenessSettings, ServerSettings};

use crate::websocket::echo::EchoDelay;

/// Listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
        }
    }
}

/// Timing and size limits applied to every connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Tolerance window: a Pong must arrive within this long of the last one.
    pub pong_wait: Duration,
    /// Interval between Ping probes. Shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Bound on a single outbound write.
    pub write_wait: Duration,
    /// Largest inbound message accepted, in bytes.
    pub read_limit: usize,
    /// Range the echo delay is drawn from.
    pub echo_delay: EchoDelay,
    /// Capacity of the reader → echo dispatcher queue.
    pub inbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&LivenessSettings::default())
    }
}

impl From<&LivenessSettings> for SessionConfig {
    fn from(s: &LivenessSettings) -> Self {
        Self {
            pong_wait: Duration::from_millis(s.pong_wait_ms),
            ping_period: Duration::from_millis(s.ping_period_ms),
            write_wait: Duration::from_millis(s.write_wait_ms),
            read_limit: s.read_limit_bytes,
            echo_delay: EchoDelay::new(
                Duration::from_millis(s.echo_delay_min_ms),
                Duration::from_millis(s.echo_delay_max_ms),
            ),
            inbound_capacity: s.inbound_queue_capacity.max(1),
        }
    }
}
