//! Inbound half of a session.
//!
//! The reader loop is the only component that takes frames off the
//! connection. Every receive is bounded by the liveness deadline held in its
//! [`AckHandle`], so a peer that stops answering probes is detected here.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, trace, warn};

use super::heartbeat::AckHandle;
use super::stats::SessionStats;
use super::transport::{Frame, FrameSource, InboundMessage};
use crate::errors::ReadError;
use crate::metrics::WS_MESSAGES_RECEIVED_TOTAL;
use crate::shutdown::{ShutdownCause, ShutdownCoordinator};

/// Outcome of the reader loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderResult {
    /// The session ended for another reason.
    Cancelled,
    /// Receiving failed; the session was shut down with this error.
    Failed(ReadError),
}

/// Receives frames until the connection fails or the session ends.
pub struct ReaderLoop<S> {
    source: S,
    ack: AckHandle,
    read_limit: usize,
    inbound: mpsc::Sender<InboundMessage>,
    shutdown: Arc<ShutdownCoordinator>,
    stats: Arc<SessionStats>,
}

impl<S: FrameSource> ReaderLoop<S> {
    /// Build a reader over `source`.
    ///
    /// Application messages larger than `read_limit` bytes end the session.
    pub fn new(
        source: S,
        ack: AckHandle,
        read_limit: usize,
        inbound: mpsc::Sender<InboundMessage>,
        shutdown: Arc<ShutdownCoordinator>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            source,
            ack,
            read_limit,
            inbound,
            shutdown,
            stats,
        }
    }

    /// Receive until failure or shutdown.
    ///
    /// On failure the shutdown signal is fired with [`ShutdownCause::Read`]
    /// before returning. The inbound sender is dropped on return, which ends
    /// the echo dispatcher's queue.
    pub async fn run(mut self) -> ReaderResult {
        let cancel = self.shutdown.token();
        loop {
            let deadline = self.ack.deadline();
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => return ReaderResult::Cancelled,
                received = time::timeout_at(deadline, self.source.recv()) => received,
            };

            let frame = match received {
                Err(_elapsed) => return self.fail(ReadError::Timeout),
                Ok(None) => return self.fail(ReadError::PeerClosed),
                Ok(Some(Err(e))) => return self.fail(ReadError::Transport(e)),
                Ok(Some(Ok(frame))) => frame,
            };

            let message = match frame {
                Frame::Pong(_) => {
                    self.ack.acknowledge();
                    self.stats.record_pong();
                    trace!("pong received");
                    continue;
                }
                Frame::Ping(_) => continue,
                Frame::Close => return self.fail(ReadError::PeerClosed),
                Frame::Text(text) => InboundMessage::Text(text),
                Frame::Binary(data) => InboundMessage::Binary(data),
            };

            if message.len() > self.read_limit {
                return self.fail(ReadError::MessageTooLarge {
                    size: message.len(),
                    limit: self.read_limit,
                });
            }

            self.stats.record_message();
            counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);
            debug!(payload = %message.as_text_lossy(), len = message.len(), "message received");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return ReaderResult::Cancelled,
                sent = self.inbound.send(message) => {
                    if sent.is_err() {
                        // Dispatcher is gone, which only happens during teardown.
                        return ReaderResult::Cancelled;
                    }
                }
            }
        }
    }

    fn fail(&self, err: ReadError) -> ReaderResult {
        match &err {
            ReadError::PeerClosed => debug!("peer closed connection"),
            ReadError::Timeout => warn!(
                tolerance = ?self.ack.tolerance(),
                "no heartbeat acknowledgment within tolerance"
            ),
            other => warn!(error = %other, "read failed"),
        }
        let _ = self.shutdown.fire(ShutdownCause::Read(err.clone()));
        ReaderResult::Failed(err)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::time::Instant;

    use super::*;
    use crate::errors::TransportError;
    use crate::websocket::heartbeat::HeartbeatMonitor;
    use crate::websocket::transport::memory;

    struct Harness {
        peer: memory::Peer,
        rx: mpsc::Receiver<InboundMessage>,
        shutdown: Arc<ShutdownCoordinator>,
        stats: Arc<SessionStats>,
        reader: tokio::task::JoinHandle<ReaderResult>,
    }

    fn start(pong_wait: Duration, read_limit: usize) -> Harness {
        let (source, _sink, peer) = memory::pair();
        let (_monitor, ack) = HeartbeatMonitor::new(pong_wait / 2, pong_wait);
        let (tx, rx) = mpsc::channel(16);
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let stats = Arc::new(SessionStats::default());
        let reader = ReaderLoop::new(source, ack, read_limit, tx, shutdown.clone(), stats.clone());
        Harness {
            peer,
            rx,
            shutdown,
            stats,
            reader: tokio::spawn(reader.run()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_application_messages_in_order() {
        let mut h = start(Duration::from_secs(60), 1024);
        h.peer.send_text("first");
        h.peer.send(Frame::Binary(Bytes::from_static(b"second")));

        assert_eq!(h.rx.recv().await, Some(InboundMessage::Text("first".into())));
        assert_eq!(
            h.rx.recv().await,
            Some(InboundMessage::Binary(Bytes::from_static(b"second")))
        );
        assert_eq!(h.stats.messages_received(), 2);
        assert!(!h.shutdown.is_fired());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn received_payload_is_logged() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer({
                let logs = logs.clone();
                move || logs.clone()
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut h = start(Duration::from_secs(60), 1024);
        h.peer.send_text("ping-1");
        assert_eq!(h.rx.recv().await, Some(InboundMessage::Text("ping-1".into())));

        let output = String::from_utf8_lossy(&logs.0.lock()).into_owned();
        assert!(output.contains("message received"), "{output}");
        assert!(output.contains("payload=ping-1"), "{output}");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let h = start(Duration::from_secs(60), 1024);
        let start = Instant::now();

        let result = h.reader.await.unwrap();
        assert_eq!(result, ReaderResult::Failed(ReadError::Timeout));
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(h.shutdown.cause(), Some(&ShutdownCause::Read(ReadError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn application_traffic_does_not_renew_deadline() {
        let h = start(Duration::from_secs(60), 1024);
        let start = Instant::now();
        for _ in 0..5 {
            time::sleep(Duration::from_secs(10)).await;
            h.peer.send_text("chatter");
        }

        let result = h.reader.await.unwrap();
        assert_eq!(result, ReaderResult::Failed(ReadError::Timeout));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn pongs_keep_reader_alive() {
        let mut h = start(Duration::from_secs(60), 1024);
        for _ in 0..6 {
            time::sleep(Duration::from_secs(45)).await;
            h.peer.send_pong();
        }
        time::sleep(Duration::from_millis(1)).await;
        // 270s in, well past the original deadline.
        assert!(!h.shutdown.is_fired());
        assert_eq!(h.stats.pongs_received(), 6);
        assert!(h.rx.try_recv().is_err());

        let _ = h.shutdown.fire(ShutdownCause::ServerShutdown);
        assert_eq!(h.reader.await.unwrap(), ReaderResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn close_frame_is_peer_closed() {
        let h = start(Duration::from_secs(60), 1024);
        h.peer.send(Frame::Close);
        assert_eq!(h.reader.await.unwrap(), ReaderResult::Failed(ReadError::PeerClosed));
        assert_eq!(h.shutdown.cause(), Some(&ShutdownCause::Read(ReadError::PeerClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_stream_is_peer_closed() {
        let mut h = start(Duration::from_secs(60), 1024);
        h.peer.hang_up();
        assert_eq!(h.reader.await.unwrap(), ReaderResult::Failed(ReadError::PeerClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_fatal() {
        let h = start(Duration::from_secs(60), 1024);
        h.peer.send_error(TransportError::ConnectionReset);
        assert_eq!(
            h.reader.await.unwrap(),
            ReaderResult::Failed(ReadError::Transport(TransportError::ConnectionReset))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_message_is_fatal() {
        let mut h = start(Duration::from_secs(60), 4);
        h.peer.send_text("tiny");
        h.peer.send_text("too big");

        assert_eq!(h.rx.recv().await, Some(InboundMessage::Text("tiny".into())));
        assert_eq!(
            h.reader.await.unwrap(),
            ReaderResult::Failed(ReadError::MessageTooLarge { size: 7, limit: 4 })
        );
        assert_eq!(h.rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_ping_is_not_an_application_message() {
        let mut h = start(Duration::from_secs(60), 1024);
        h.peer.send(Frame::Ping(Bytes::new()));
        h.peer.send_text("after ping");
        assert_eq!(h.rx.recv().await, Some(InboundMessage::Text("after ping".into())));
        assert_eq!(h.stats.messages_received(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_elsewhere_cancels_reader() {
        let h = start(Duration::from_secs(60), 1024);
        let _ = h.shutdown.fire(ShutdownCause::ServerShutdown);
        assert_eq!(h.reader.await.unwrap(), ReaderResult::Cancelled);
        assert_eq!(h.shutdown.cause(), Some(&ShutdownCause::ServerShutdown));
    }
}
