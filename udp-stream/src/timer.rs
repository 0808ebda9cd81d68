//! Retransmission policy.
//!
//! Loss is never observed directly; the engine infers it from two signals:
//! - the oldest unacknowledged segment has been in flight longer than
//!   `ack_timeout`, or
//! - `critical_lag` consecutive incoming datagrams arrived without moving the
//!   peer's acknowledgment forward.
//!
//! [`RetransmitTimer`] turns those signals into a single decision per engine
//! iteration: resend the earliest segment, or leave it alone.  The timeout is
//! fixed; there is no RTT estimation and no back-off.

use std::time::Duration;

use tokio::time::Instant;

/// Why a retransmission was ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetransmitReason {
    /// The segment outlived `ack_timeout`.
    Timeout,
    /// Too many consecutive non-advancing ACKs; resend regardless of age.
    Lag,
}

/// Per-connection retransmit state.
#[derive(Debug)]
pub struct RetransmitTimer {
    ack_timeout: Duration,
    critical_lag: u32,
    /// Consecutive non-advancing ACKs since the last progress or forced
    /// resend.
    lag: u32,
}

impl RetransmitTimer {
    pub fn new(ack_timeout: Duration, critical_lag: u32) -> Self {
        Self {
            ack_timeout,
            critical_lag,
            lag: 0,
        }
    }

    /// The peer's ACK advanced.
    pub fn on_progress(&mut self) {
        self.lag = 0;
    }

    /// An ACK arrived that did not advance while data was outstanding.
    pub fn on_stall(&mut self) {
        self.lag = self.lag.saturating_add(1);
    }

    pub fn lag(&self) -> u32 {
        self.lag
    }

    /// Decide whether the earliest outstanding segment, last sent at
    /// `last_sent_at`, must go out again now.
    ///
    /// Reaching `critical_lag` resets the counter and forces a resend.
    pub fn poll(&mut self, last_sent_at: Instant, now: Instant) -> Option<RetransmitReason> {
        if self.lag >= self.critical_lag {
            self.lag = 0;
            return Some(RetransmitReason::Lag);
        }
        if now.saturating_duration_since(last_sent_at) > self.ack_timeout {
            return Some(RetransmitReason::Timeout);
        }
        None
    }
}
