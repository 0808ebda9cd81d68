//! Fault-injecting network simulator.
//!
//! Real networks drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] wraps any [`Channel`] and intercepts outbound datagrams,
//! applying a configurable fault model:
//!
//! | Fault        | Description                                              |
//! |--------------|----------------------------------------------------------|
//! | Packet loss  | Drop a datagram with probability `loss_rate`, or drop    |
//! |              | specific datagrams by index (`drop_sends`).              |
//! | Reordering   | Hold a datagram back until the next one has been sent    |
//! |              | (`reorder_rate`, or by index via `hold_sends`).          |
//! | Duplication  | Deliver a datagram twice (`duplicate_rate`).             |
//!
//! Randomness comes from a seeded [`StdRng`], so a failing run can be
//! replayed exactly.  Inbound datagrams pass through untouched; wrap both
//! ends to disturb both directions.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::channel::{Channel, ChannelError};

/// Fault model.  All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Zero-based indices of outbound datagrams to drop unconditionally.
    pub drop_sends: BTreeSet<usize>,
    /// Zero-based indices of outbound datagrams to hold back unconditionally.
    pub hold_sends: BTreeSet<usize>,
    /// Seed for the fault RNG.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default — simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            duplicate_rate: 0.0,
            drop_sends: BTreeSet::new(),
            hold_sends: BTreeSet::new(),
            seed: 0,
        }
    }
}

/// Counts of faults actually injected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub sent: usize,
    pub dropped: usize,
    pub reordered: usize,
    pub duplicated: usize,
}

/// A fault-injecting wrapper around another channel.
#[derive(Debug)]
pub struct Simulator<C> {
    inner: C,
    config: SimulatorConfig,
    rng: StdRng,
    /// A datagram waiting to be released after the next send.
    held: Option<Vec<u8>>,
    stats: SimulatorStats,
}

impl<C: Channel> Simulator<C> {
    pub fn new(inner: C, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng,
            held: None,
            stats: SimulatorStats::default(),
        }
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen_bool(probability.min(1.0))
    }
}

#[async_trait]
impl<C: Channel> Channel for Simulator<C> {
    /// Always reports the full length as written, whatever the fault.
    async fn send(&mut self, bytes: &[u8]) -> Result<usize, ChannelError> {
        let index = self.stats.sent;
        self.stats.sent += 1;

        let loss_rate = self.config.loss_rate;
        if self.config.drop_sends.contains(&index) || self.roll(loss_rate) {
            log::debug!("[sim] dropping datagram #{index}");
            self.stats.dropped += 1;
            return Ok(bytes.len());
        }

        let reorder_rate = self.config.reorder_rate;
        if self.held.is_none()
            && (self.config.hold_sends.contains(&index) || self.roll(reorder_rate))
        {
            log::debug!("[sim] holding back datagram #{index}");
            self.stats.reordered += 1;
            self.held = Some(bytes.to_vec());
            return Ok(bytes.len());
        }

        self.inner.send(bytes).await?;
        if let Some(held) = self.held.take() {
            self.inner.send(&held).await?;
        }

        let duplicate_rate = self.config.duplicate_rate;
        if self.roll(duplicate_rate) {
            log::debug!("[sim] duplicating datagram #{index}");
            self.stats.duplicated += 1;
            self.inner.send(bytes).await?;
        }
        Ok(bytes.len())
    }

    async fn receive(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, ChannelError> {
        self.inner.receive(timeout).await
    }
}
