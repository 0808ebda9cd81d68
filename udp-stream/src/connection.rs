//! The transport engine: one reliable byte stream over one [`Channel`].
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(data) / recv(n) / flush()
//!      ▼
//!  Connection
//!    ├── SendWindow      (in-flight segments, flow-control cap)
//!    ├── ReceiveWindow   (out-of-order buffer, reassembly, cursor)
//!    ├── RetransmitTimer (ack_timeout + lag counter)
//!    └── C: Channel      (owned exclusively)
//! ```
//!
//! There is no background task.  Every call pumps the channel inline:
//! incoming datagrams are routed, ACKs are sent, and the earliest
//! unacknowledged segment is resent when the timer or lag counter says so.
//! Progress therefore depends on the application calling back in; use
//! [`Connection::flush`] after the last `send` to drive outstanding data to
//! the peer.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use udp_stream::{Config, Connection, UdpChannel};
//!
//! let channel = UdpChannel::bind("0.0.0.0:9001".parse()?, "10.0.0.2:9000".parse()?).await?;
//! let mut conn = Connection::new(channel, Config::default())?;
//! conn.send(b"hello world").await?;
//! conn.flush().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::channel::{Channel, ChannelError};
use crate::config::{Config, ConfigError};
use crate::receive_window::{Offer, ReceiveWindow};
use crate::segment::Segment;
use crate::send_window::SendWindow;
use crate::timer::{RetransmitReason, RetransmitTimer};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced to the caller of [`Connection`] methods.
#[derive(Debug)]
pub enum ConnError {
    /// The underlying channel failed; fatal for the call.
    Channel(ChannelError),
    /// `recv` saw no new data for `read_timeout`.  Already reassembled bytes
    /// stay buffered, so the call may be retried.
    ReceiveTimeout { wanted: usize, buffered: usize },
    /// `flush` saw no acknowledgment progress for `read_timeout`.
    FlushTimeout { in_flight: usize },
}

impl std::fmt::Display for ConnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "{e}"),
            Self::ReceiveTimeout { wanted, buffered } => write!(
                f,
                "timed out waiting for {wanted} byte(s); {buffered} buffered"
            ),
            Self::FlushTimeout { in_flight } => write!(
                f,
                "timed out waiting for acknowledgment of {in_flight} byte(s)"
            ),
        }
    }
}

impl std::error::Error for ConnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ChannelError> for ConnError {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Counters accumulated over the life of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Data segments dispatched for the first time.
    pub segments_sent: u64,
    /// Payload bytes dispatched for the first time.
    pub bytes_sent: u64,
    /// Resends ordered because a segment outlived `ack_timeout`.
    pub timeout_retransmits: u64,
    /// Resends forced by the lag counter.
    pub lag_retransmits: u64,
    /// Pure ACK segments sent.
    pub acks_sent: u64,
    /// Inbound datagrams too short to decode.
    pub malformed_dropped: u64,
    /// Inbound data segments discarded as stale, duplicate or out of window.
    pub segments_discarded: u64,
    /// Highest number of payload bytes ever in flight at once.
    pub peak_in_flight: usize,
}

impl ConnectionStats {
    pub fn retransmits(&self) -> u64 {
        self.timeout_retransmits + self.lag_retransmits
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A reliable, ordered, bidirectional byte stream over an unreliable channel.
///
/// All stream offsets start at zero on both sides; there is no handshake.
#[derive(Debug)]
pub struct Connection<C> {
    config: Config,
    channel: C,
    send_window: SendWindow,
    receive_window: ReceiveWindow,
    timer: RetransmitTimer,
    /// Next sequence number to assign.
    sent_bytes: u64,
    /// Highest offset the peer has acknowledged.
    confirmed_bytes: u64,
    stats: ConnectionStats,
}

impl<C: Channel> Connection<C> {
    /// Wrap `channel` in a new connection.  Fails if `config` is unusable.
    pub fn new(channel: C, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            send_window: SendWindow::new(config.window_size),
            receive_window: ReceiveWindow::new(config.max_reorder_bytes),
            timer: RetransmitTimer::new(config.ack_timeout, config.critical_lag),
            config,
            channel,
            sent_bytes: 0,
            confirmed_bytes: 0,
            stats: ConnectionStats::default(),
        })
    }

    // -----------------------------------------------------------------------
    // Application API
    // -----------------------------------------------------------------------

    /// Hand `data` to the stream.
    ///
    /// Slices the input into segments of at most `mss` bytes and dispatches
    /// them as the flow-control window allows.  While the window is full the
    /// call waits (up to `ack_timeout` per attempt) for acknowledgments,
    /// resending lost segments as needed.
    ///
    /// Returns `data.len()` once every byte has been transmitted at least
    /// once.  That does not mean the peer has it; see [`flush`](Self::flush).
    pub async fn send(&mut self, data: &[u8]) -> Result<usize, ConnError> {
        let mut rest = data;

        while !rest.is_empty() {
            let take = rest.len().min(self.config.mss);
            if self.send_window.has_room(take) {
                let segment = Segment::new(
                    self.sent_bytes,
                    self.receive_window.cursor(),
                    rest[..take].to_vec(),
                );
                self.transmit_new(segment).await?;
                rest = &rest[take..];
            }

            // Only wait when the window is what holds us back.
            let next = rest.len().min(self.config.mss);
            let wait = if rest.is_empty() || self.send_window.has_room(next) {
                Duration::ZERO
            } else {
                self.config.ack_timeout
            };
            self.pump(Some(wait)).await?;
            self.retransmit().await?;
        }

        Ok(data.len())
    }

    /// Read exactly `max_len` bytes from the stream.
    ///
    /// Returns immediately if enough bytes are already reassembled.
    /// Otherwise pumps the channel until they are, failing with
    /// [`ConnError::ReceiveTimeout`] if no new bytes arrive for
    /// `read_timeout`.  Outbound retransmission keeps running meanwhile.
    pub async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, ConnError> {
        let mut deadline = Instant::now() + self.config.read_timeout;

        while self.receive_window.buffered() < max_len {
            let now = Instant::now();
            if now >= deadline {
                return Err(ConnError::ReceiveTimeout {
                    wanted: max_len,
                    buffered: self.receive_window.buffered(),
                });
            }

            let before = self.receive_window.cursor();
            self.pump(Some(self.wait_budget(deadline - now))).await?;
            if self.receive_window.cursor() > before {
                deadline = Instant::now() + self.config.read_timeout;
            }
            self.retransmit().await?;
        }

        Ok(self.receive_window.read(max_len))
    }

    /// Wait until every byte sent so far has been acknowledged.
    ///
    /// Fails with [`ConnError::FlushTimeout`] if the peer's acknowledgment
    /// does not advance for `read_timeout`.
    pub async fn flush(&mut self) -> Result<(), ConnError> {
        let mut deadline = Instant::now() + self.config.read_timeout;

        while !self.send_window.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Err(ConnError::FlushTimeout {
                    in_flight: self.send_window.in_flight_bytes(),
                });
            }

            let before = self.confirmed_bytes;
            self.pump(Some(self.wait_budget(deadline - now))).await?;
            if self.confirmed_bytes > before {
                deadline = Instant::now() + self.config.read_timeout;
            }
            self.retransmit().await?;
        }

        log::debug!("[stream] flushed; confirmed={}", self.confirmed_bytes);
        Ok(())
    }

    /// Keep servicing the channel for `period` without waiting for anything
    /// in particular: acknowledge whatever the peer (re)sends and keep
    /// resending our own unacknowledged data.
    ///
    /// A receiver that has read everything it wanted calls this so the
    /// sender's final segments still get acknowledged.
    pub async fn linger(&mut self, period: Duration) -> Result<(), ConnError> {
        let deadline = Instant::now() + period;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            self.pump(Some(self.wait_budget(deadline - now))).await?;
            self.retransmit().await?;
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Total bytes handed to the channel so far (next sequence number).
    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }

    /// Highest offset acknowledged by the peer.
    pub fn confirmed_bytes(&self) -> u64 {
        self.confirmed_bytes
    }

    /// Highest contiguous offset reassembled from the peer.
    pub fn received_bytes(&self) -> u64 {
        self.receive_window.cursor()
    }

    /// Bytes sent but not yet acknowledged.
    pub fn in_flight_bytes(&self) -> usize {
        self.send_window.in_flight_bytes()
    }

    /// Reassembled bytes waiting for `recv`.
    pub fn buffered(&self) -> usize {
        self.receive_window.buffered()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// How long a single pump may block: the remaining budget, but never
    /// longer than `ack_timeout` while our own data awaits acknowledgment.
    fn wait_budget(&self, remaining: Duration) -> Duration {
        if self.send_window.is_empty() {
            remaining
        } else {
            remaining.min(self.config.ack_timeout)
        }
    }

    /// Admit a freshly sliced segment and put it on the wire.
    async fn transmit_new(&mut self, segment: Segment) -> Result<(), ConnError> {
        let bytes = segment.encode();
        let (seq, len) = (segment.seq_number, segment.len());

        if !self.send_window.admit(segment, Instant::now()) {
            // Callers check `has_room` first.
            return Ok(());
        }
        self.sent_bytes += len as u64;
        self.stats.segments_sent += 1;
        self.stats.bytes_sent += len as u64;
        self.stats.peak_in_flight = self
            .stats
            .peak_in_flight
            .max(self.send_window.in_flight_bytes());

        self.dispatch(&bytes).await?;
        log::debug!(
            "[stream] → DATA seq={seq} len={len} in_flight={}",
            self.send_window.in_flight_bytes()
        );
        Ok(())
    }

    async fn dispatch(&mut self, bytes: &[u8]) -> Result<(), ConnError> {
        let written = self.channel.send(bytes).await?;
        if written < bytes.len() {
            log::warn!(
                "[stream] short write: {written} of {} byte(s)",
                bytes.len()
            );
        }
        Ok(())
    }

    /// Send a pure ACK advertising the current receive cursor.
    async fn send_ack(&mut self) -> Result<(), ConnError> {
        let ack = Segment::ack(self.sent_bytes, self.receive_window.cursor());
        self.dispatch(&ack.encode()).await?;
        self.stats.acks_sent += 1;
        log::debug!("[stream] → ACK ack={}", ack.ack_number);
        Ok(())
    }

    /// Receive at most one datagram and route it.
    async fn pump(&mut self, timeout: Option<Duration>) -> Result<(), ConnError> {
        let datagram = self.channel.receive(timeout).await?;
        if datagram.is_empty() {
            return Ok(());
        }

        match Segment::decode(&datagram) {
            Ok(segment) => self.route(segment).await,
            Err(e) => {
                log::warn!("[stream] dropping datagram: {e}");
                self.stats.malformed_dropped += 1;
                Ok(())
            }
        }
    }

    /// Feed an inbound segment to both windows.
    async fn route(&mut self, segment: Segment) -> Result<(), ConnError> {
        let ack_number = segment.ack_number;

        if !segment.is_empty() {
            let (seq, len) = (segment.seq_number, segment.len());
            match self.receive_window.offer(segment) {
                Offer::InOrder => {
                    let drained = self.receive_window.drain_contiguous().count();
                    log::debug!(
                        "[stream] ← DATA seq={seq} len={len} (+{drained} buffered) cursor={}",
                        self.receive_window.cursor()
                    );
                    self.send_ack().await?;
                }
                Offer::Buffered => {
                    log::debug!(
                        "[stream] ← DATA seq={seq} len={len} out of order; holding {}",
                        self.receive_window.pending()
                    );
                }
                Offer::Stale => {
                    // The peer is resending data we already have, so our
                    // earlier ACK was probably lost.
                    log::debug!("[stream] ← DATA seq={seq} len={len} stale");
                    self.stats.segments_discarded += 1;
                    self.send_ack().await?;
                }
                Offer::Duplicate | Offer::OutOfWindow => {
                    log::debug!("[stream] ← DATA seq={seq} len={len} discarded");
                    self.stats.segments_discarded += 1;
                }
                Offer::Empty => {}
            }
        }

        self.on_ack(ack_number);
        Ok(())
    }

    /// Apply the peer's cumulative acknowledgment.
    fn on_ack(&mut self, ack_number: u64) {
        if ack_number > self.sent_bytes {
            log::warn!(
                "[stream] ← ACK ack={ack_number} beyond sent={}; ignoring",
                self.sent_bytes
            );
            return;
        }

        if ack_number > self.confirmed_bytes {
            self.confirmed_bytes = ack_number;
            let evicted = self.send_window.confirm(ack_number);
            self.timer.on_progress();
            log::debug!("[stream] ← ACK ack={ack_number} (slid {evicted} seg)");
        } else if !self.send_window.is_empty() {
            self.timer.on_stall();
        }
    }

    /// Resend the earliest unacknowledged segment if the timer or the lag
    /// counter calls for it.  At most one segment per call.
    async fn retransmit(&mut self) -> Result<(), ConnError> {
        let now = Instant::now();
        let Some(entry) = self.send_window.earliest() else {
            return Ok(());
        };
        let Some(reason) = self.timer.poll(entry.last_sent_at, now) else {
            return Ok(());
        };

        let seq = entry.segment.seq_number;
        let tx_count = entry.tx_count;
        let bytes = entry.segment.encode();

        match reason {
            RetransmitReason::Timeout => self.stats.timeout_retransmits += 1,
            RetransmitReason::Lag => self.stats.lag_retransmits += 1,
        }
        log::debug!("[stream] → DATA seq={seq} resend #{tx_count} ({reason:?})");

        self.dispatch(&bytes).await?;
        self.send_window.mark_resent(seq, now);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
