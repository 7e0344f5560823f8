//! # tether-settings
//!
//! Settings for the tether server, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TetherSettings::default()`]
//! 2. **User file**: `~/.tether/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TETHER_*` overrides (highest priority)
//!
//! The merged result is validated before it is returned, so a loaded
//! [`LivenessSettings`] always has a probe period shorter than its tolerance
//! window.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LivenessSettings, LoggingSettings, ServerSettings, TetherSettings};
