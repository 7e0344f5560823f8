//! Settings types.
//!
//! All structs use `camelCase` on the wire and `#[serde(default)]`, so a
//! settings file only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Top-level settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Per-connection heartbeat, size and echo settings.
    pub liveness: LivenessSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl TetherSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.liveness.validate()
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Per-connection liveness settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessSettings {
    /// How long to wait for a Pong before the peer is considered gone.
    pub pong_wait_ms: u64,
    /// Interval between outbound Ping probes. Must be less than `pong_wait_ms`.
    pub ping_period_ms: u64,
    /// Upper bound on a single outbound write.
    pub write_wait_ms: u64,
    /// Largest inbound message accepted, in bytes.
    pub read_limit_bytes: usize,
    /// Lower bound of the randomized echo delay.
    pub echo_delay_min_ms: u64,
    /// Upper bound of the randomized echo delay.
    pub echo_delay_max_ms: u64,
    /// Capacity of the queue between the reader and the echo dispatcher.
    pub inbound_queue_capacity: usize,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            pong_wait_ms: 60_000,
            ping_period_ms: 50_000,
            write_wait_ms: 60_000,
            read_limit_bytes: 64 * 1024,
            echo_delay_min_ms: 0,
            echo_delay_max_ms: 10_000,
            inbound_queue_capacity: 64,
        }
    }
}

impl LivenessSettings {
    /// Check that the values describe a usable heartbeat configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pong_wait_ms == 0 {
            return Err(SettingsError::invalid("pongWaitMs", "must be non-zero"));
        }
        if self.ping_period_ms == 0 || self.ping_period_ms >= self.pong_wait_ms {
            return Err(SettingsError::invalid(
                "pingPeriodMs",
                format!(
                    "{} must be non-zero and less than pongWaitMs ({})",
                    self.ping_period_ms, self.pong_wait_ms
                ),
            ));
        }
        if self.write_wait_ms == 0 {
            return Err(SettingsError::invalid("writeWaitMs", "must be non-zero"));
        }
        if self.read_limit_bytes == 0 {
            return Err(SettingsError::invalid("readLimitBytes", "must be non-zero"));
        }
        if self.echo_delay_min_ms > self.echo_delay_max_ms {
            return Err(SettingsError::invalid(
                "echoDelayMinMs",
                format!(
                    "{} exceeds echoDelayMaxMs ({})",
                    self.echo_delay_min_ms, self.echo_delay_max_ms
                ),
            ));
        }
        if self.inbound_queue_capacity == 0 {
            return Err(SettingsError::invalid("inboundQueueCapacity", "must be non-zero"));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level name (`trace` .. `error`). `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
