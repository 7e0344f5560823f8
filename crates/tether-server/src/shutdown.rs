//! Single-fire session shutdown via `CancellationToken`.
//!
//! Every component that can detect the end of a session holds an
//! `Arc<ShutdownCoordinator>` and fires it without coordinating with the
//! others. The first firing records its cause; later firings are no-ops.

use std::fmt;
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::errors::{ReadError, WriteError};

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// The reader loop failed (timeout, peer close, oversized message, transport).
    Read(ReadError),
    /// A heartbeat probe could not be written.
    ProbeFailed(WriteError),
    /// An echo reply could not be written.
    EchoFailed(WriteError),
    /// The server-wide token was cancelled.
    ServerShutdown,
}

impl ShutdownCause {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Read(ReadError::Timeout) => "read_timeout",
            Self::Read(ReadError::PeerClosed) => "peer_closed",
            Self::Read(ReadError::MessageTooLarge { .. }) => "message_too_large",
            Self::Read(ReadError::Transport(_)) => "read_error",
            Self::ProbeFailed(_) => "probe_failed",
            Self::EchoFailed(_) => "echo_failed",
            Self::ServerShutdown => "server_shutdown",
        }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(e) => write!(f, "read failed: {e}"),
            Self::ProbeFailed(e) => write!(f, "heartbeat probe failed: {e}"),
            Self::EchoFailed(e) => write!(f, "echo reply failed: {e}"),
            Self::ServerShutdown => write!(f, "server shutting down"),
        }
    }
}

/// Single-fire, multi-observer end-of-session signal.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    cause: OnceLock<ShutdownCause>,
}

impl ShutdownCoordinator {
    /// Create a standalone coordinator.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Create a coordinator that also fires when `parent` is cancelled.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self::with_token(parent.child_token())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            cause: OnceLock::new(),
        }
    }

    /// Fire the signal.
    ///
    /// Returns `true` only for the call whose cause was recorded. Safe to call
    /// from any number of tasks concurrently. Once the parent token has
    /// cancelled this coordinator the cause is [`ShutdownCause::ServerShutdown`]
    /// and later calls lose, whether or not anyone has waited yet.
    pub fn fire(&self, cause: ShutdownCause) -> bool {
        if self.token.is_cancelled() {
            let _ = self.cause.get_or_init(|| ShutdownCause::ServerShutdown);
        }
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    /// Wait until the signal fires and return the recorded cause.
    ///
    /// If the coordinator was cancelled through its parent token the cause is
    /// fixed as [`ShutdownCause::ServerShutdown`] at that point.
    pub async fn wait(&self) -> ShutdownCause {
        self.token.cancelled().await;
        self.cause.get_or_init(|| ShutdownCause::ServerShutdown).clone()
    }

    /// Whether the signal has fired (directly or through the parent).
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The recorded cause, if a component has fired.
    pub fn cause(&self) -> Option<&ShutdownCause> {
        self.cause.get()
    }

    /// A clone of the underlying token, for `select!` arms.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
