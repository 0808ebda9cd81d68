//! Receive-side reassembly.
//!
//! [`ReceiveWindow`] implements the receiver half of the stream:
//!
//! - A segment starting exactly at the cursor is **reassembled immediately**.
//! - A segment ahead of the cursor is **buffered** until the gap before it
//!   closes.
//! - A segment behind the cursor is a **stale duplicate** and is discarded.
//!
//! After every offer that advanced the cursor the caller should send a
//! cumulative ACK carrying [`ReceiveWindow::cursor`].
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility.

use std::collections::{BTreeMap, VecDeque};

use crate::segment::Segment;

/// What [`ReceiveWindow::offer`] did with a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Started at the cursor; its bytes are now readable.
    InOrder,
    /// Ahead of the cursor; held until the gap closes.
    Buffered,
    /// Ahead of the cursor, but that offset is already held.
    Duplicate,
    /// Entirely behind the cursor; discarded.
    Stale,
    /// Further past the cursor than the reorder limit; discarded.
    OutOfWindow,
    /// Carried no payload.
    Empty,
}

/// Inbound reassembly state for one connection.
#[derive(Debug)]
pub struct ReceiveWindow {
    /// Next expected stream offset.  Every byte below it has been
    /// reassembled.
    cursor: u64,

    /// How far ahead of the cursor a segment may start.
    capacity: u64,

    /// Out-of-order segments keyed by `seq_number`, each strictly ahead of
    /// `cursor`.
    pending: BTreeMap<u64, Segment>,

    /// Contiguous bytes ready for the application.
    reassembled: VecDeque<u8>,
}

impl ReceiveWindow {
    /// `capacity` bounds how far past the cursor a buffered segment may
    /// start.  It must exceed any window the peer runs with, or in-window
    /// segments get discarded and have to be resent one by one.
    pub fn new(capacity: usize) -> Self {
        Self {
            cursor: 0,
            capacity: capacity as u64,
            pending: BTreeMap::new(),
            reassembled: VecDeque::new(),
        }
    }

    /// Accept one inbound segment.
    ///
    /// An in-order segment is appended straight to the reassembly buffer.
    /// Follow with [`drain_contiguous`](Self::drain_contiguous) to pull in
    /// any buffered segments it made contiguous.
    pub fn offer(&mut self, segment: Segment) -> Offer {
        if segment.is_empty() {
            return Offer::Empty;
        }
        if segment.seq_number < self.cursor {
            return Offer::Stale;
        }
        if segment.seq_number == self.cursor {
            self.reassemble(&segment);
            return Offer::InOrder;
        }
        if segment.seq_number - self.cursor >= self.capacity {
            return Offer::OutOfWindow;
        }
        if self.pending.contains_key(&segment.seq_number) {
            return Offer::Duplicate;
        }
        self.pending.insert(segment.seq_number, segment);
        Offer::Buffered
    }

    /// Move every buffered segment that is now contiguous with the cursor
    /// into the reassembly buffer.
    ///
    /// The iterator is lazy: each `next()` reassembles one segment and yields
    /// it.  It ends at the first gap, and is finite because every step
    /// removes a segment.
    pub fn drain_contiguous(&mut self) -> DrainContiguous<'_> {
        DrainContiguous { window: self }
    }

    /// Take up to `max` bytes from the front of the reassembly buffer.
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.reassembled.len());
        self.reassembled.drain(..n).collect()
    }

    /// Cumulative ACK number to advertise: the next offset expected.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Reassembled bytes not yet read by the application.
    pub fn buffered(&self) -> usize {
        self.reassembled.len()
    }

    /// Segments held out of order.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn reassemble(&mut self, segment: &Segment) {
        self.reassembled.extend(segment.data.iter().copied());
        self.cursor = segment.end();
    }
}

/// Iterator returned by [`ReceiveWindow::drain_contiguous`].
pub struct DrainContiguous<'a> {
    window: &'a mut ReceiveWindow,
}

impl Iterator for DrainContiguous<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        loop {
            let (&seq, _) = self.window.pending.first_key_value()?;
            if seq > self.window.cursor {
                // Hole before the lowest buffered segment.
                return None;
            }
            let (_, segment) = self.window.pending.pop_first()?;
            if seq < self.window.cursor {
                // Overtaken by an in-order copy; nothing left to add.
                continue;
            }
            self.window.reassemble(&segment);
            return Some(segment);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(seq: u64, data: &[u8]) -> Segment {
        Segment::new(seq, 0, data.to_vec())
    }

    #[test]
    fn initial_state() {
        let r = ReceiveWindow::new(64);
        assert_eq!(r.cursor(), 0);
        assert_eq!(r.buffered(), 0);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn in_order_segment_reassembled_immediately() {
        let mut r = ReceiveWindow::new(64);
        assert_eq!(r.offer(seg(0, b"hello")), Offer::InOrder);
        assert_eq!(r.cursor(), 5);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.read(5), b"hello");
    }

    #[test]
    fn out_of_order_segment_buffered_until_gap_closes() {
        let mut r = ReceiveWindow::new(64);

        assert_eq!(r.offer(seg(5, b"world")), Offer::Buffered);
        assert_eq!(r.cursor(), 0);
        assert_eq!(r.drain_contiguous().count(), 0);
        assert_eq!(r.buffered(), 0);

        assert_eq!(r.offer(seg(0, b"hello")), Offer::InOrder);
        let drained: Vec<u64> = r.drain_contiguous().map(|s| s.seq_number).collect();
        assert_eq!(drained, vec![5]);
        assert_eq!(r.cursor(), 10);
        assert_eq!(r.read(10), b"helloworld");
    }

    #[test]
    fn drain_stops_at_hole() {
        let mut r = ReceiveWindow::new(64);
        r.offer(seg(4, b"bbbb"));
        r.offer(seg(12, b"dddd"));
        r.offer(seg(0, b"aaaa"));

        assert_eq!(r.drain_contiguous().count(), 1);
        assert_eq!(r.cursor(), 8);
        assert_eq!(r.pending(), 1);

        r.offer(seg(8, b"cccc"));
        assert_eq!(r.drain_contiguous().count(), 1);
        assert_eq!(r.cursor(), 16);
        assert_eq!(r.read(16), b"aaaabbbbccccdddd");
    }

    #[test]
    fn any_arrival_order_yields_original_stream() {
        let stream: Vec<u8> = (0u8..40).collect();
        let chunks: Vec<Segment> = stream
            .chunks(4)
            .enumerate()
            .map(|(i, c)| seg(i as u64 * 4, c))
            .collect();

        // Reverse, then interleave odd/even positions.
        let orders: [Vec<usize>; 3] = [
            (0..10).rev().collect(),
            vec![1, 3, 5, 7, 9, 0, 2, 4, 6, 8],
            vec![9, 0, 8, 1, 7, 2, 6, 3, 5, 4],
        ];

        for order in orders {
            let mut r = ReceiveWindow::new(64);
            for i in order {
                r.offer(chunks[i].clone());
                r.drain_contiguous().for_each(drop);
            }
            assert_eq!(r.cursor(), 40);
            assert_eq!(r.read(40), stream);
        }
    }

    #[test]
    fn stale_duplicate_discarded() {
        let mut r = ReceiveWindow::new(64);
        r.offer(seg(0, b"hello"));

        assert_eq!(r.offer(seg(0, b"hello")), Offer::Stale);
        assert_eq!(r.cursor(), 5);
        assert_eq!(r.buffered(), 5);
    }

    #[test]
    fn buffered_duplicate_ignored() {
        let mut r = ReceiveWindow::new(64);
        assert_eq!(r.offer(seg(4, b"bbbb")), Offer::Buffered);
        assert_eq!(r.offer(seg(4, b"bbbb")), Offer::Duplicate);
        assert_eq!(r.pending(), 1);

        r.offer(seg(0, b"aaaa"));
        r.drain_contiguous().for_each(drop);
        assert_eq!(r.read(100), b"aaaabbbb");
    }

    #[test]
    fn empty_segment_is_not_reassembled() {
        let mut r = ReceiveWindow::new(64);
        assert_eq!(r.offer(Segment::ack(0, 10)), Offer::Empty);
        assert_eq!(r.cursor(), 0);
    }

    #[test]
    fn segment_beyond_capacity_rejected() {
        let mut r = ReceiveWindow::new(8);
        assert_eq!(r.offer(seg(8, b"x")), Offer::OutOfWindow);
        assert_eq!(r.offer(seg(7, b"x")), Offer::Buffered);
        assert_eq!(r.pending(), 1);
    }

    #[test]
    fn far_ahead_segment_buffered_within_capacity() {
        // A peer with a much larger window may run far ahead of us.
        let mut r = ReceiveWindow::new(1 << 20);
        assert_eq!(r.offer(seg(60, b"late")), Offer::Buffered);
        assert_eq!(r.offer(seg(4_000, b"later")), Offer::Buffered);
        assert_eq!(r.pending(), 2);
    }

    #[test]
    fn read_returns_at_most_max() {
        let mut r = ReceiveWindow::new(64);
        r.offer(seg(0, b"hello world"));

        assert_eq!(r.read(5), b"hello");
        assert_eq!(r.buffered(), 6);
        assert_eq!(r.read(100), b" world");
        assert_eq!(r.buffered(), 0);
    }
}
