//! # tether-server
//!
//! Axum HTTP + `WebSocket` server built around a per-connection lifecycle core.
//!
//! - `WebSocket` sessions: reader loop, heartbeat probes with a liveness
//!   deadline, randomized-delay echo replies, serialized writes
//! - Single-fire shutdown signal per session; any component may fire it
//! - HTTP endpoints: `/ws`, `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ServerConfig, SessionConfig};
pub use errors::{ReadError, ServerError, TransportError, UpgradeError, WriteError};
pub use server::TetherServer;
pub use shutdown::{ShutdownCause, ShutdownCoordinator};
pub use websocket::echo::EchoDelay;
pub use websocket::session::{ConnectionSession, SessionReport};
