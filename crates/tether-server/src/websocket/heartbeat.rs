//! Heartbeat Ping probes and the inbound liveness deadline.
//!
//! The two responsibilities are kept apart:
//! - [`HeartbeatMonitor::new`] arms the deadline once, at session start, so a
//!   peer that never speaks is still timed out.
//! - [`HeartbeatMonitor::run`] is the recurring probe loop.
//!
//! The deadline itself is only ever advanced through the [`AckHandle`] the
//! reader loop holds; nothing else can move it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{trace, warn};

use super::stats::SessionStats;
use super::writer::WriteSerializer;
use crate::metrics::{WS_PONGS_RECEIVED_TOTAL, WS_PROBES_SENT_TOTAL};
use crate::shutdown::{ShutdownCause, ShutdownCoordinator};

/// Outcome of the probe loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The session ended for another reason.
    Cancelled,
    /// A probe could not be written; the session was shut down.
    ProbeFailed,
}

/// Latest instant by which a Pong must arrive.
///
/// Stored as nanoseconds past a fixed base so renewals are a single
/// `fetch_max`, which also keeps the deadline from ever moving backwards.
struct LivenessDeadline {
    base: Instant,
    offset_nanos: AtomicU64,
}

impl LivenessDeadline {
    fn armed(tolerance: Duration) -> Self {
        let base = Instant::now();
        Self {
            base,
            offset_nanos: AtomicU64::new(duration_nanos(tolerance)),
        }
    }

    fn advance_to(&self, at: Instant) {
        let offset = duration_nanos(at.saturating_duration_since(self.base));
        let _ = self.offset_nanos.fetch_max(offset, Ordering::AcqRel);
    }

    fn expires_at(&self) -> Instant {
        self.base + Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
    }
}

fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// The reader loop's view of the liveness deadline.
///
/// [`acknowledge`](Self::acknowledge) is the only way to renew the deadline.
/// It does no I/O and takes no locks, so it is safe to call inline on the
/// receive path.
pub struct AckHandle {
    deadline: LivenessDeadline,
    tolerance: Duration,
}

impl AckHandle {
    /// Record a heartbeat acknowledgment: the deadline becomes
    /// `now + tolerance` (never earlier than it already was).
    pub fn acknowledge(&self) {
        self.deadline.advance_to(Instant::now() + self.tolerance);
        counter!(WS_PONGS_RECEIVED_TOTAL).increment(1);
    }

    /// Current deadline.
    pub fn deadline(&self) -> Instant {
        self.deadline.expires_at()
    }

    /// The tolerance window applied on each acknowledgment.
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }
}

/// Periodic Ping prober for one connection.
pub struct HeartbeatMonitor {
    period: Duration,
}

impl HeartbeatMonitor {
    /// Create the monitor and arm the liveness deadline to `now + tolerance`.
    ///
    /// Returns the one [`AckHandle`] for the deadline, to be handed to the
    /// reader loop.
    pub fn new(period: Duration, tolerance: Duration) -> (Self, AckHandle) {
        let ack = AckHandle {
            deadline: LivenessDeadline::armed(tolerance),
            tolerance,
        };
        (Self { period }, ack)
    }

    /// Interval between probes.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Send a Ping every `period` until shutdown fires.
    ///
    /// The first probe goes out one full period after the call. A failed
    /// probe fires `shutdown` immediately and ends the loop; it is not retried.
    pub async fn run(
        self,
        writer: Arc<WriteSerializer>,
        shutdown: Arc<ShutdownCoordinator>,
        stats: Arc<SessionStats>,
    ) -> HeartbeatResult {
        let cancel = shutdown.token();
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return HeartbeatResult::Cancelled;
                }
                _ = ticker.tick() => {
                    if let Err(e) = writer.send_ping().await {
                        warn!(error = %e, "heartbeat probe failed, closing connection");
                        let _ = shutdown.fire(ShutdownCause::ProbeFailed(e));
                        return HeartbeatResult::ProbeFailed;
                    }
                    stats.record_probe();
                    counter!(WS_PROBES_SENT_TOTAL).increment(1);
                    trace!("sent ping");
                }
            }
        }
    }
}
