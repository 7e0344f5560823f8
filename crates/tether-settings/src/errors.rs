//! Errors raised while loading or validating tether settings.

use thiserror::Error;

/// Why a settings document could not be turned into a usable configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON for [`TetherSettings`](crate::TetherSettings).
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A liveness value cannot drive a session.
    #[error("invalid {key}: {reason}")]
    InvalidValue {
        /// camelCase name of the offending key, as written in the file.
        key: &'static str,
        /// What the value violates.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
