//! `udp-stream` — a TCP-like reliable byte stream implemented over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────┐  segments  ┌───────────────┐
//!  │ SendWindow │───────────▶│ ReceiveWindow │ (peer)
//!  └─────┬──────┘            └───────┬───────┘
//!        │                           │
//!        │          ACKs             │
//!        │◀──────────────────────────┘
//!        │
//!  ┌─────▼─────────────────────────────┐
//!  │            Connection             │
//!  │ (owns both windows, timer, cursors│
//!  │  and the channel)                 │
//!  └─────┬─────────────────────────────┘
//!        │ raw datagrams
//!  ┌─────▼─────┐
//!  │  Channel  │  (UDP socket, in-memory pipe, or fault simulator)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]         — wire format (serialise / deserialise)
//! - [`send_window`]     — in-flight segments and the flow-control cap
//! - [`receive_window`]  — out-of-order buffering and reassembly
//! - [`timer`]           — retransmission policy (timeout + lag counter)
//! - [`connection`]      — the engine: `send` / `recv` / `flush`
//! - [`config`]          — tunables and their validation
//! - [`channel`]         — datagram transport trait and in-memory pipe
//! - [`socket`]          — UDP channel over tokio
//! - [`simulator`]       — lossy/reordering/duplicating channel for testing

pub mod channel;
pub mod config;
pub mod connection;
pub mod receive_window;
pub mod segment;
pub mod send_window;
pub mod simulator;
pub mod socket;
pub mod timer;

pub use channel::{Channel, ChannelError, MemoryChannel};
pub use config::{Config, ConfigError};
pub use connection::{ConnError, Connection, ConnectionStats};
pub use segment::{Segment, SegmentError};
pub use simulator::{Simulator, SimulatorConfig};
pub use socket::UdpChannel;
