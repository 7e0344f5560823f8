//! Error taxonomy for the connection lifecycle.
//!
//! Read and write failures are always fatal to the session that produced
//! them and never escalate beyond it.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by the underlying frame transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer reset or dropped the connection.
    #[error("connection reset by peer")]
    ConnectionReset,
    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// The HTTP-to-WebSocket upgrade did not produce a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// The request was not a valid upgrade request.
    #[error("websocket upgrade rejected: {0}")]
    Rejected(String),
    /// The handshake started but the connection could not be taken over.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
}

/// Fatal failure on the inbound side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// No heartbeat acknowledgment arrived before the liveness deadline.
    #[error("liveness deadline exceeded")]
    Timeout,
    /// The peer sent a close frame or ended the stream.
    #[error("peer closed the connection")]
    PeerClosed,
    /// An inbound message exceeded the configured read limit.
    #[error("message of {size} bytes exceeds read limit of {limit}")]
    MessageTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// The transport failed while receiving.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ReadError {
    /// Whether the failure was a missed liveness deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Fatal failure on the outbound side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The write did not complete within the write deadline.
    #[error("write did not complete within {0:?}")]
    Timeout(Duration),
    /// The connection was already closed for writing.
    #[error("connection closed for writing")]
    Closed,
    /// The transport failed while sending.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised by the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listen address failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Any other I/O failure on the listener.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
