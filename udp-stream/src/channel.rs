//! The unreliable datagram layer underneath a connection.
//!
//! [`Channel`] is the only seam between the transport engine and the outside
//! world.  An implementation moves whole datagrams between two fixed peers
//! with no delivery, ordering or uniqueness guarantees.
//!
//! Implementations in this crate:
//! - [`crate::socket::UdpChannel`] — a real UDP socket.
//! - [`MemoryChannel`] — an in-process pipe, used by tests and demos.
//! - [`crate::simulator::Simulator`] — wraps another channel and injects
//!   faults.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Transport faults other than timeouts.
#[derive(Debug)]
pub enum ChannelError {
    /// Underlying I/O error from the OS.
    Io(std::io::Error),
    /// The other end is gone and a blocking receive can never complete.
    Closed,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "channel I/O error: {e}"),
            Self::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Closed => None,
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Best-effort datagram transport to a single remote peer.
#[async_trait]
pub trait Channel: Send {
    /// Send one datagram.  Returns the number of bytes written, which may be
    /// fewer than `bytes.len()` if the transport truncates.
    async fn send(&mut self, bytes: &[u8]) -> Result<usize, ChannelError>;

    /// Receive the next datagram.
    ///
    /// - `None` waits indefinitely.
    /// - `Some(Duration::ZERO)` polls without waiting.
    /// - `Some(t)` waits at most `t`.
    ///
    /// Returns an empty vector when nothing arrived in time.
    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, ChannelError>;
}

// ---------------------------------------------------------------------------
// MemoryChannel
// ---------------------------------------------------------------------------

/// One end of an in-process datagram pipe.
///
/// Behaves like a lossless UDP socket: datagrams sent after the peer end was
/// dropped vanish silently.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryChannel {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, bytes: &[u8]) -> Result<usize, ChannelError> {
        if self.tx.send(bytes.to_vec()).is_err() {
            log::trace!("[mem] peer gone; dropping {} byte(s)", bytes.len());
        }
        Ok(bytes.len())
    }

    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, ChannelError> {
        match timeout {
            Some(t) if t.is_zero() => match self.rx.try_recv() {
                Ok(datagram) => Ok(datagram),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(Vec::new()),
            },
            Some(t) => match tokio::time::timeout(t, self.rx.recv()).await {
                Ok(Some(datagram)) => Ok(datagram),
                Ok(None) => {
                    // Peer gone: nothing will ever arrive, so just wait out
                    // the timeout like a silent socket would.
                    tokio::time::sleep(t).await;
                    Ok(Vec::new())
                }
                Err(_elapsed) => Ok(Vec::new()),
            },
            None => self.rx.recv().await.ok_or(ChannelError::Closed),
        }
    }
}
