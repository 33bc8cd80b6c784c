//! Time utilities for link emulation
//!
//! Provides a monotonic deadline type and an airtime pacer that holds each
//! transmit for as long as the frame would occupy the radio channel.

use loralink_protocol::airtime::{Modulation, RadioProfile};
use std::ops::{Add, Sub};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(Instant);

impl Timestamp {
    /// Get the current timestamp
    #[inline]
    pub fn now() -> Self {
        Timestamp(Instant::now())
    }

    /// Get the underlying instant
    #[inline]
    pub fn as_instant(&self) -> Instant {
        self.0
    }

    /// Calculate elapsed time since this timestamp
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    /// Time left until this timestamp, zero once it has passed
    #[inline]
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Whether this timestamp has passed
    #[inline]
    pub fn has_passed(&self) -> bool {
        self.remaining().is_zero()
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 + duration)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        self.0.saturating_duration_since(other.0)
    }
}

/// Airtime pacer
///
/// Blocks each transmit for the frame's time on air under a modulation,
/// optionally scaled down so long-range profiles stay usable in tests.
#[derive(Debug, Clone)]
pub struct Pacer {
    modulation: Modulation,
    /// Fraction of real airtime actually slept (1.0 = real time)
    scale: f64,
    /// Unscaled airtime accumulated so far
    total_airtime: Duration,
    frames: u64,
}

impl Pacer {
    /// Create a real-time pacer for a modulation
    pub fn new(modulation: Modulation) -> Self {
        Pacer {
            modulation,
            scale: 1.0,
            total_airtime: Duration::ZERO,
            frames: 0,
        }
    }

    /// Create a real-time pacer for a preset
    pub fn from_profile(profile: RadioProfile) -> Self {
        Pacer::new(profile.modulation())
    }

    /// Sleep only `scale` of each frame's airtime
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale.max(0.0);
        self
    }

    /// Airtime actually slept for a frame of `frame_len` bytes
    pub fn airtime(&self, frame_len: usize) -> Duration {
        self.modulation
            .time_on_air(frame_len)
            .mul_f64(self.scale)
    }

    /// Hold the caller for one frame's airtime
    pub fn transmit(&mut self, frame_len: usize) -> Duration {
        self.total_airtime += self.modulation.time_on_air(frame_len);
        self.frames += 1;

        let hold = self.airtime(frame_len);
        if !hold.is_zero() {
            thread::sleep(hold);
        }
        hold
    }

    /// Unscaled airtime of everything transmitted
    pub fn total_airtime(&self) -> Duration {
        self.total_airtime
    }

    /// Frames transmitted
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let ts1 = Timestamp::now();
        thread::sleep(Duration::from_millis(10));
        let ts2 = Timestamp::now();

        let diff = ts2 - ts1;
        assert!(diff >= Duration::from_millis(10));
        assert!(diff < Duration::from_millis(500));
        assert_eq!(ts1 - ts2, Duration::ZERO);
    }

    #[test]
    fn test_deadline_remaining() {
        let deadline = Timestamp::now() + Duration::from_millis(20);
        assert!(!deadline.has_passed());
        assert!(deadline.remaining() <= Duration::from_millis(20));

        thread::sleep(Duration::from_millis(25));
        assert!(deadline.has_passed());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_pacer_holds_for_airtime() {
        let mut pacer = Pacer::from_profile(RadioProfile::FskStandard);
        let expected = RadioProfile::FskStandard.time_on_air(255);

        let start = Timestamp::now();
        let held = pacer.transmit(255);
        assert_eq!(held, expected);
        assert!(start.elapsed() >= expected);
        assert_eq!(pacer.frames(), 1);
    }

    #[test]
    fn test_pacer_scale_counts_real_airtime() {
        let mut pacer = Pacer::from_profile(RadioProfile::LoraLongRange).with_scale(0.0);
        let real = RadioProfile::LoraLongRange.time_on_air(100);

        let start = Timestamp::now();
        assert_eq!(pacer.transmit(100), Duration::ZERO);
        pacer.transmit(100);
        assert!(start.elapsed() < real);
        assert_eq!(pacer.total_airtime(), real * 2);
    }
}
