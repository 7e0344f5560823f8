//! Delayed echo replies.
//!
//! Each inbound message gets its own task that sleeps for a random delay and
//! then writes `Got message: <payload>`. Replies are independent and may
//! complete out of order. A reply still sleeping when the session ends is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use super::stats::SessionStats;
use super::transport::InboundMessage;
use super::writer::WriteSerializer;
use crate::errors::WriteError;
use crate::metrics::{WS_ECHOES_ABANDONED_TOTAL, WS_ECHOES_SENT_TOTAL};
use crate::shutdown::{ShutdownCause, ShutdownCoordinator};

/// Prefix of every echo reply.
pub const REPLY_PREFIX: &str = "Got message: ";

/// Render the reply for one inbound message.
pub fn render_reply(message: &InboundMessage) -> String {
    format!("{REPLY_PREFIX}{}", message.as_text_lossy())
}

/// Inclusive range an echo delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoDelay {
    min: Duration,
    max: Duration,
}

impl EchoDelay {
    /// Uniform delay in `[min, max]`. A `max` below `min` is raised to `min`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    /// Always the same delay.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    /// Lower bound.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draw one delay.
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::rng().random_range(self.min..=self.max)
    }
}

impl Default for EchoDelay {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(10))
    }
}

/// Spawns and tracks the echo task for every inbound message of a session.
pub struct EchoScheduler {
    writer: Arc<WriteSerializer>,
    shutdown: Arc<ShutdownCoordinator>,
    stats: Arc<SessionStats>,
    delay: EchoDelay,
    tracker: TaskTracker,
}

impl EchoScheduler {
    /// Create a scheduler writing through `writer`.
    pub fn new(
        writer: Arc<WriteSerializer>,
        shutdown: Arc<ShutdownCoordinator>,
        stats: Arc<SessionStats>,
        delay: EchoDelay,
    ) -> Self {
        Self {
            writer,
            shutdown,
            stats,
            delay,
            tracker: TaskTracker::new(),
        }
    }

    /// Schedule the reply to `message` and return the delay drawn for it.
    ///
    /// The reply task is abandoned if the session shuts down before the delay
    /// elapses. A failed write fires the shutdown signal with
    /// [`ShutdownCause::EchoFailed`].
    pub fn dispatch(&self, message: InboundMessage) -> Duration {
        let delay = self.delay.sample();
        let reply = render_reply(&message);
        let writer = self.writer.clone();
        let shutdown = self.shutdown.clone();
        let stats = self.stats.clone();
        let cancel = shutdown.token();

        let _ = self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    abandon(&stats);
                    return;
                }
                () = time::sleep(delay) => {}
            }

            match writer.send_text(reply).await {
                Ok(()) => {
                    stats.record_echo();
                    counter!(WS_ECHOES_SENT_TOTAL).increment(1);
                    trace!(?delay, "echo sent");
                }
                Err(WriteError::Closed) if cancel.is_cancelled() => abandon(&stats),
                Err(e) => {
                    warn!(error = %e, "echo reply failed, closing connection");
                    let _ = shutdown.fire(ShutdownCause::EchoFailed(e));
                }
            }
        });
        delay
    }

    /// Dispatch every message from `inbound` until the queue ends or the
    /// session shuts down.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        let cancel = self.shutdown.token();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => {
                        let delay = self.dispatch(message);
                        trace!(?delay, "echo scheduled");
                    }
                    None => break,
                },
            }
        }
    }

    /// Number of reply tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting replies and wait for the running ones to finish.
    ///
    /// Once shutdown has fired, sleeping replies exit at once and a write in
    /// progress is bounded by the write deadline.
    pub async fn drain(&self) {
        let _ = self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            debug!(pending, "waiting for echo tasks");
        }
        self.tracker.wait().await;
    }
}

fn abandon(stats: &SessionStats) {
    stats.record_abandoned();
    counter!(WS_ECHOES_ABANDONED_TOTAL).increment(1);
    trace!("echo abandoned");
}
