//! # tether-logging
//!
//! Structured logging with `tracing`.
//!
//! [`init_subscriber`] installs a global subscriber with an `EnvFilter`
//! (`RUST_LOG` wins over the configured level) and either a human-readable
//! or a JSON formatting layer. The configured level must be a level name;
//! anything else is rejected instead of being read as a target directive.

#![deny(unsafe_code)]

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Output format for the stdout layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line, with span context.
    Json,
}

impl LogFormat {
    /// `Json` when `json` is set, `Pretty` otherwise.
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Pretty }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The configured level is not one of `trace`, `debug`, `info`, `warn`, `error`.
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),
    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Parse a level name (case-insensitive). `warning` is accepted for `warn`.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Resolve the filter: `RUST_LOG` if set and valid, otherwise `level`.
fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    let level = parse_level(level).ok_or_else(|| LoggingError::UnknownLevel(level.to_string()))?;
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::default().add_directive(LevelFilter::from_level(level).into()))
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_subscriber(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter = build_filter(level)?;

    let (json_layer, pretty_layer) = match format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true),
            ),
            None,
        ),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().with_target(true))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
