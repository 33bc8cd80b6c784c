//! Loss and corruption injection
//!
//! [`Impaired`] wraps any link and damages what that end hears: each intact
//! frame is independently dropped or corrupted with fixed probabilities.
//! Seeded runs are reproducible.

use crate::time::Timestamp;
use bytes::{Bytes, BytesMut};
use loralink_protocol::channel::{LinkChannel, LinkError, Received};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Impairment rates for one receive direction
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Impairment {
    /// Probability an inbound frame is never heard
    pub drop_rate: f64,
    /// Probability a heard frame fails its checksum
    pub corrupt_rate: f64,
    /// RNG seed; `None` draws one from the OS
    pub seed: Option<u64>,
}

impl Impairment {
    /// No loss, no corruption
    pub fn none() -> Self {
        Impairment::default()
    }

    /// Create a seeded impairment
    pub fn new(drop_rate: f64, corrupt_rate: f64, seed: u64) -> Self {
        Impairment {
            drop_rate,
            corrupt_rate,
            seed: Some(seed),
        }
    }

    fn clamped(self) -> Self {
        Impairment {
            drop_rate: self.drop_rate.clamp(0.0, 1.0),
            corrupt_rate: self.corrupt_rate.clamp(0.0, 1.0),
            seed: self.seed,
        }
    }
}

/// What the impairment did so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImpairStats {
    pub heard: u64,
    pub dropped: u64,
    pub corrupted: u64,
}

/// Link wrapper that drops and corrupts inbound frames
pub struct Impaired<C> {
    inner: C,
    impairment: Impairment,
    rng: StdRng,
    stats: ImpairStats,
}

impl<C: LinkChannel> Impaired<C> {
    /// Wrap a link
    pub fn new(inner: C, impairment: Impairment) -> Self {
        let impairment = impairment.clamped();
        let rng = match impairment.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Impaired {
            inner,
            impairment,
            rng,
            stats: ImpairStats::default(),
        }
    }

    /// Impairment counters
    pub fn stats(&self) -> ImpairStats {
        self.stats
    }

    /// Access the wrapped link
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Unwrap the link
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Flip bits in one payload byte, leaving the sequence byte readable
    fn corrupt(&mut self, frame: Bytes) -> Bytes {
        if frame.is_empty() {
            return frame;
        }

        let mut damaged = BytesMut::from(&frame[..]);
        let index = if damaged.len() > 1 {
            self.rng.gen_range(1..damaged.len())
        } else {
            0
        };
        let mask = self.rng.gen_range(1..=u8::MAX);
        damaged[index] ^= mask;
        damaged.freeze()
    }
}

impl<C: LinkChannel> LinkChannel for Impaired<C> {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.inner.send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> Received {
        let deadline = Timestamp::now() + timeout;

        loop {
            let frame = match self.inner.recv(deadline.remaining()) {
                Received::Ok(frame) => frame,
                other => return other,
            };
            self.stats.heard += 1;

            if self.rng.gen_bool(self.impairment.drop_rate) {
                self.stats.dropped += 1;
                tracing::trace!("Dropped inbound frame of {} bytes", frame.len());
                if deadline.has_passed() {
                    return Received::Timeout;
                }
                continue;
            }

            if self.rng.gen_bool(self.impairment.corrupt_rate) {
                self.stats.corrupted += 1;
                tracing::trace!("Corrupted inbound frame of {} bytes", frame.len());
                return Received::Corrupt(self.corrupt(frame));
            }

            return Received::Ok(frame);
        }
    }
}
