//! Connection tunables.
//!
//! Every knob the engine consults lives in [`Config`], handed to
//! [`crate::connection::Connection::new`] once and never mutated afterwards.

use std::time::Duration;

use crate::segment::HEADER_LEN;
use crate::socket::MAX_PAYLOAD;

/// Default maximum payload per segment.
pub const DEFAULT_MSS: usize = 1500;
/// Default flow-control window, in segments of [`DEFAULT_MSS`].
pub const DEFAULT_WINDOW_SEGMENTS: usize = 12;
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(50);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_CRITICAL_LAG: u32 = 12;
/// Default reorder limit: far above any window a peer is likely to run with.
pub const DEFAULT_MAX_REORDER_BYTES: usize = 16 * 1024 * 1024;

/// Per-connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Largest payload placed into one outgoing segment.
    pub mss: usize,
    /// Maximum payload bytes in flight (sent but unconfirmed).
    pub window_size: usize,
    /// Age after which the earliest unacknowledged segment is resent.
    ///
    /// Also bounds how long `send` waits for an ACK while the window is full.
    pub ack_timeout: Duration,
    /// How long `recv` / `flush` wait without progress before giving up.
    pub read_timeout: Duration,
    /// Consecutive non-advancing ACKs that force a resend.
    pub critical_lag: u32,
    /// How far past the receive cursor an inbound segment may start and still
    /// be buffered.  Independent of `window_size`, since the peer picks its
    /// own window.
    pub max_reorder_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            window_size: DEFAULT_MSS * DEFAULT_WINDOW_SEGMENTS,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            critical_lag: DEFAULT_CRITICAL_LAG,
            max_reorder_bytes: DEFAULT_MAX_REORDER_BYTES,
        }
    }
}

impl Config {
    /// Check the parameters for combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mss == 0 {
            return Err(ConfigError::ZeroMss);
        }
        if self.mss > MAX_PAYLOAD - HEADER_LEN {
            return Err(ConfigError::MssTooLarge { mss: self.mss });
        }
        // A window smaller than one full segment would never admit it.
        if self.window_size < self.mss {
            return Err(ConfigError::WindowSmallerThanMss {
                mss: self.mss,
                window_size: self.window_size,
            });
        }
        if self.ack_timeout.is_zero() {
            return Err(ConfigError::ZeroAckTimeout);
        }
        if self.critical_lag == 0 {
            return Err(ConfigError::ZeroCriticalLag);
        }
        if self.max_reorder_bytes < self.window_size {
            return Err(ConfigError::ReorderLimitBelowWindow {
                window_size: self.window_size,
                max_reorder_bytes: self.max_reorder_bytes,
            });
        }
        Ok(())
    }
}

/// Rejected [`Config`] values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroMss,
    /// Header plus payload would not fit in one datagram.
    MssTooLarge { mss: usize },
    WindowSmallerThanMss { mss: usize, window_size: usize },
    ZeroAckTimeout,
    ZeroCriticalLag,
    ReorderLimitBelowWindow {
        window_size: usize,
        max_reorder_bytes: usize,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroMss => write!(f, "mss must be at least 1 byte"),
            Self::MssTooLarge { mss } => write!(
                f,
                "mss {mss} exceeds the largest datagram payload ({})",
                MAX_PAYLOAD - HEADER_LEN
            ),
            Self::WindowSmallerThanMss { mss, window_size } => write!(
                f,
                "window_size {window_size} is smaller than one segment (mss {mss})"
            ),
            Self::ZeroAckTimeout => write!(f, "ack_timeout must be non-zero"),
            Self::ZeroCriticalLag => write!(f, "critical_lag must be at least 1"),
            Self::ReorderLimitBelowWindow {
                window_size,
                max_reorder_bytes,
            } => write!(
                f,
                "max_reorder_bytes {max_reorder_bytes} is smaller than window_size {window_size}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
