//! Per-session counters, reported when the session ends.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the components of one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    messages_received: AtomicU64,
    pongs_received: AtomicU64,
    probes_sent: AtomicU64,
    echoes_sent: AtomicU64,
    echoes_abandoned: AtomicU64,
}

impl SessionStats {
    /// Record an inbound application message.
    pub fn record_message(&self) {
        let _ = self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a heartbeat acknowledgment.
    pub fn record_pong(&self) {
        let _ = self.pongs_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a probe written to the peer.
    pub fn record_probe(&self) {
        let _ = self.probes_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an echo reply written to the peer.
    pub fn record_echo(&self) {
        let _ = self.echoes_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an echo dropped because the session ended first.
    pub fn record_abandoned(&self) {
        let _ = self.echoes_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound application messages so far.
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Heartbeat acknowledgments so far.
    pub fn pongs_received(&self) -> u64 {
        self.pongs_received.load(Ordering::Relaxed)
    }

    /// Probes written so far.
    pub fn probes_sent(&self) -> u64 {
        self.probes_sent.load(Ordering::Relaxed)
    }

    /// Echo replies written so far.
    pub fn echoes_sent(&self) -> u64 {
        self.echoes_sent.load(Ordering::Relaxed)
    }

    /// Echo replies abandoned so far.
    pub fn echoes_abandoned(&self) -> u64 {
        self.echoes_abandoned.load(Ordering::Relaxed)
    }
}
