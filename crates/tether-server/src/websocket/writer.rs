//! Serialized, deadline-bounded writes to one connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::transport::{Frame, FrameSink};
use crate::errors::WriteError;

/// Sole owner of a connection's write half.
///
/// Every outbound frame goes through [`send`](Self::send), which holds an
/// async mutex for the duration of the write, so the heartbeat prober and
/// echo tasks never interleave. Each instance guards exactly one connection.
pub struct WriteSerializer {
    sink: Mutex<Box<dyn FrameSink>>,
    write_wait: Duration,
    closed: AtomicBool,
    stop: Option<CancellationToken>,
}

impl WriteSerializer {
    /// Wrap a sink; every write is bounded by `write_wait`.
    pub fn new(sink: Box<dyn FrameSink>, write_wait: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            write_wait,
            closed: AtomicBool::new(false),
            stop: None,
        }
    }

    /// Refuse new writes as soon as `token` is cancelled, without waiting
    /// for [`close`](Self::close).
    #[must_use]
    pub fn stop_on(mut self, token: CancellationToken) -> Self {
        self.stop = Some(token);
        self
    }

    /// Write one frame.
    ///
    /// Fails with [`WriteError::Closed`] without touching the sink once
    /// [`close`](Self::close) has been called or the stop token has been
    /// cancelled. Failures are not retried.
    pub async fn send(&self, frame: Frame) -> Result<(), WriteError> {
        let mut sink = self.sink.lock().await;
        if self.is_stopped() {
            return Err(WriteError::Closed);
        }
        let kind = frame.kind();
        match time::timeout(self.write_wait, sink.send(frame)).await {
            Ok(Ok(())) => {
                trace!(?kind, "frame written");
                Ok(())
            }
            Ok(Err(e)) => Err(WriteError::Transport(e)),
            Err(_) => Err(WriteError::Timeout(self.write_wait)),
        }
    }

    /// Write a text frame.
    pub async fn send_text(&self, text: String) -> Result<(), WriteError> {
        self.send(Frame::Text(text)).await
    }

    /// Write an empty Ping frame.
    pub async fn send_ping(&self) -> Result<(), WriteError> {
        self.send(Frame::Ping(Bytes::new())).await
    }

    /// Stop accepting writes and close the sink.
    ///
    /// New sends are refused as soon as this is called; a send already in
    /// progress finishes (bounded by the write deadline) before the sink is
    /// closed. Returns `false` if the serializer was already closed.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut sink = self.sink.lock().await;
        match time::timeout(self.write_wait, sink.close()).await {
            Ok(Ok(())) => debug!("connection closed"),
            Ok(Err(e)) => debug!(error = %e, "close handshake failed"),
            Err(_) => debug!("close handshake timed out"),
        }
        true
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_stopped(&self) -> bool {
        self.is_closed() || self.stop.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
