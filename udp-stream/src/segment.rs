//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is exactly one [`Segment`].  This
//! module is responsible for:
//! - Defining the on-wire binary layout (two offsets, then payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], rejecting input
//!   too short to carry a header.
//!
//! Pure data transformation; the engine does all I/O.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                   Sequence Number (64 bits)                   +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                Acknowledgment Number (64 bits)                +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 16 bytes.  There is no length field
//! (the datagram boundary delimits the payload) and no checksum.

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 8;

/// One framed unit of the stream.
///
/// Offsets are absolute byte positions in each direction's stream and never
/// wrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Stream offset of `data[0]` in the sender's outgoing stream.
    pub seq_number: u64,
    /// The sender has received every byte of the peer's stream below this
    /// offset.
    pub ack_number: u64,
    /// Payload bytes.  Empty for a pure acknowledgment.
    pub data: Vec<u8>,
}

impl Segment {
    pub fn new(seq_number: u64, ack_number: u64, data: Vec<u8>) -> Self {
        Self {
            seq_number,
            ack_number,
            data,
        }
    }

    /// A zero-length segment that exists only to carry `ack_number`.
    pub fn ack(seq_number: u64, ack_number: u64) -> Self {
        Self::new(seq_number, ack_number, Vec::new())
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for a pure acknowledgment.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First stream offset *after* this segment's payload.
    pub fn end(&self) -> u64 {
        self.seq_number + self.data.len() as u64
    }

    /// Serialise this segment into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len());
        buf.extend_from_slice(&self.seq_number.to_be_bytes());
        buf.extend_from_slice(&self.ack_number.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parse a [`Segment`] from a raw datagram.
    ///
    /// Everything after the header is payload, so the only failure is a
    /// buffer shorter than [`HEADER_LEN`].
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Malformed { len: buf.len() });
        }

        Ok(Self {
            seq_number: read_u64(buf, OFF_SEQ),
            ack_number: read_u64(buf, OFF_ACK),
            data: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Caller guarantees `buf.len() >= offset + 8`.
fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(word)
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// Datagram shorter than the fixed header.
    Malformed { len: usize },
}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentError::Malformed { len } => write!(
                f,
                "malformed segment: {len} byte(s), header needs {HEADER_LEN}"
            ),
        }
    }
}

impl std::error::Error for SegmentError {}
