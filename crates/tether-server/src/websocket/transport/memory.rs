//! In-process duplex transport.
//!
//! [`pair`] returns the two halves a session consumes plus a [`Peer`] that
//! plays the remote side: it injects inbound frames and observes every frame
//! the session writes. The sink half can be told to fail or to stall, and
//! records whether two sends ever overlapped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Frame, FrameKind, FrameSink, FrameSource};
use crate::errors::TransportError;

#[derive(Default)]
struct SinkControl {
    fail_kinds: Mutex<Option<Vec<FrameKind>>>,
    latency: Mutex<Duration>,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
    closed: AtomicBool,
    sends: AtomicUsize,
}

/// Read half handed to the session.
pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

/// Write half handed to the session.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<Frame>,
    control: Arc<SinkControl>,
}

/// The remote end of a [`pair`].
pub struct Peer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    control: Arc<SinkControl>,
}

/// Create a connected source/sink pair and the peer that drives them.
pub fn pair() -> (MemorySource, MemorySink, Peer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let control = Arc::new(SinkControl::default());
    (
        MemorySource { rx: in_rx },
        MemorySink {
            tx: out_tx,
            control: control.clone(),
        },
        Peer {
            inbound: Some(in_tx),
            outbound: out_rx,
            control,
        },
    )
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let control = self.control.clone();
        if control.in_flight.swap(true, Ordering::SeqCst) {
            control.overlapped.store(true, Ordering::SeqCst);
        }
        let result = self.deliver(frame).await;
        control.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.control.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // The peer may already be gone; a close frame is best effort.
        let _ = self.tx.send(Frame::Close);
        Ok(())
    }
}

impl MemorySink {
    async fn deliver(&mut self, frame: Frame) -> Result<(), TransportError> {
        let latency = *self.control.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let should_fail = self
            .control
            .fail_kinds
            .lock()
            .as_ref()
            .is_some_and(|kinds| kinds.is_empty() || kinds.contains(&frame.kind()));
        if should_fail || self.control.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionReset);
        }
        let _ = self.control.sends.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ConnectionReset)
    }
}

impl Peer {
    /// Deliver a frame to the session's reader.
    pub fn send(&self, frame: Frame) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(frame));
        }
    }

    /// Deliver a text message.
    pub fn send_text(&self, text: &str) {
        self.send(Frame::Text(text.to_owned()));
    }

    /// Deliver a heartbeat acknowledgment.
    pub fn send_pong(&self) {
        self.send(Frame::Pong(Bytes::new()));
    }

    /// Deliver a transport error to the reader.
    pub fn send_error(&self, err: TransportError) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(err));
        }
    }

    /// End the inbound stream, as if the peer dropped the socket.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Next frame written by the session, or `None` once the sink is dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next frame written by the session, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }

    /// Make every send fail.
    pub fn fail_all_writes(&self) {
        *self.control.fail_kinds.lock() = Some(Vec::new());
    }

    /// Make sends of the given kinds fail.
    pub fn fail_writes(&self, kinds: &[FrameKind]) {
        *self.control.fail_kinds.lock() = Some(kinds.to_vec());
    }

    /// Delay every send by `latency` before it completes.
    pub fn set_write_latency(&self, latency: Duration) {
        *self.control.latency.lock() = latency;
    }

    /// Whether two sends were ever in progress at the same time.
    pub fn writes_overlapped(&self) -> bool {
        self.control.overlapped.load(Ordering::SeqCst)
    }

    /// Whether the session closed its write half.
    pub fn sink_closed(&self) -> bool {
        self.control.closed.load(Ordering::SeqCst)
    }

    /// Number of frames successfully delivered (close frame excluded).
    pub fn delivered(&self) -> usize {
        self.control.sends.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inbound_frames_reach_source() {
        let (mut source, _sink, peer) = pair();
        peer.send_text("hello");
        peer.send_pong();
        assert_eq!(source.recv().await, Some(Ok(Frame::Text("hello".into()))));
        assert_eq!(source.recv().await, Some(Ok(Frame::Pong(Bytes::new()))));
    }

    #[tokio::test]
    async fn hang_up_ends_stream() {
        let (mut source, _sink, mut peer) = pair();
        peer.hang_up();
        assert_eq!(source.recv().await, None);
    }

    #[tokio::test]
    async fn sink_frames_reach_peer() {
        let (_source, mut sink, mut peer) = pair();
        sink.send(Frame::Text("reply".into())).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Text("reply".into())));
        assert_eq!(peer.delivered(), 1);
    }

    #[tokio::test]
    async fn selective_failure() {
        let (_source, mut sink, mut peer) = pair();
        peer.fail_writes(&[FrameKind::Ping]);
        assert!(sink.send(Frame::Ping(Bytes::new())).await.is_err());
        sink.send(Frame::Text("still works".into())).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Text("still works".into())));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_sends() {
        let (_source, mut sink, mut peer) = pair();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert!(peer.sink_closed());
        assert_eq!(peer.recv().await, Some(Frame::Close));
        assert!(peer.try_recv().is_none());
        assert!(sink.send(Frame::Text("late".into())).await.is_err());
    }
}
