//! Send-side sliding window.
//!
//! [`SendWindow`] holds every outbound segment that has been handed to the
//! channel but not yet acknowledged by the peer, ordered by sequence number.
//!
//! # Contract
//!
//! - The total payload resident in the window never exceeds `window_size`
//!   bytes; [`SendWindow::admit`] refuses a segment that would overflow it.
//! - ACKs are **cumulative**: `ack_number = K` means the peer holds every
//!   byte below `K`.  A segment is evicted once `seq_number + len <= K`.
//! - A segment leaves the window only through [`SendWindow::confirm`].  A
//!   timeout resends it ([`SendWindow::mark_resent`]) but never drops it.
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;

use tokio::time::Instant;

use crate::segment::Segment;

// ---------------------------------------------------------------------------
// InFlight
// ---------------------------------------------------------------------------

/// A single unacknowledged segment.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// The segment exactly as it was first dispatched.
    pub segment: Segment,
    /// Total number of times this segment has been transmitted.
    pub tx_count: u32,
    /// Time of the most recent transmission.
    pub last_sent_at: Instant,
}

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// Outbound flow-control window for one connection.
///
/// ```text
///  confirmed                  sent
///      │                        │
///  ────┼────────────────────────┼──────────────▶ stream offset
///      │ <──── in flight ─────▶ │
///      │ <───────── window_size ──────────▶ │
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Flow-control cap in payload bytes.
    window_size: usize,

    /// Sum of `len()` over every resident segment.
    in_flight_bytes: usize,

    /// Resident segments keyed by `seq_number`.
    segments: BTreeMap<u64, InFlight>,
}

impl SendWindow {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            in_flight_bytes: 0,
            segments: BTreeMap::new(),
        }
    }

    /// `true` when a segment carrying `len` payload bytes would be admitted.
    pub fn has_room(&self, len: usize) -> bool {
        self.in_flight_bytes + len <= self.window_size
    }

    /// Place a just-built segment into the window, stamping it as sent at
    /// `now`.
    ///
    /// Returns `false` (and leaves the window untouched) when the segment
    /// does not fit; the caller must wait for acknowledgments first.
    pub fn admit(&mut self, segment: Segment, now: Instant) -> bool {
        if !self.has_room(segment.len()) {
            return false;
        }
        self.in_flight_bytes += segment.len();
        self.segments.insert(
            segment.seq_number,
            InFlight {
                segment,
                tx_count: 1,
                last_sent_at: now,
            },
        );
        true
    }

    /// Process a cumulative acknowledgment.
    ///
    /// Evicts every segment whose data lies entirely below `ack_number` and
    /// returns how many were evicted.  Segments are dispatched in sequence
    /// order, so eviction always stops at the first one still outstanding.
    pub fn confirm(&mut self, ack_number: u64) -> usize {
        let mut evicted = 0usize;
        while let Some(entry) = self.segments.first_entry() {
            if entry.get().segment.end() > ack_number {
                break;
            }
            let entry = entry.remove();
            self.in_flight_bytes -= entry.segment.len();
            evicted += 1;
        }
        evicted
    }

    /// The in-flight segment with the lowest sequence number.
    pub fn earliest(&self) -> Option<&InFlight> {
        self.segments.first_key_value().map(|(_, entry)| entry)
    }

    /// Record a retransmission of the segment starting at `seq_number`.
    ///
    /// Returns `false` if no such segment is resident (it was acknowledged
    /// in the meantime).
    pub fn mark_resent(&mut self, seq_number: u64, now: Instant) -> bool {
        match self.segments.get_mut(&seq_number) {
            Some(entry) => {
                entry.tx_count += 1;
                entry.last_sent_at = now;
                true
            }
            None => false,
        }
    }

    /// Payload bytes currently awaiting acknowledgment.
    pub fn in_flight_bytes(&self) -> usize {
        self.in_flight_bytes
    }

    /// Number of segments currently awaiting acknowledgment.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
