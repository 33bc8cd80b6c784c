//! Session configuration
//!
//! Timing defaults follow field measurements on SX1262 hardware: a 5 second
//! ack wait, a 10 second corruption-list wait, and 5 seconds of silence to
//! end a burst.

use crate::frame::{CorruptionList, MAX_MTU, MIN_MTU};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default frame size (one sequence byte plus 253 payload bytes)
pub const DEFAULT_MTU: usize = 254;

/// Default attempts per frame in stop-and-wait mode
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default ack wait per attempt
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for a corruption list after a burst
pub const DEFAULT_CORRUPTION_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default retransmission rounds in bulk mode
pub const DEFAULT_MAX_ROUNDS: u32 = 3;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MTU {mtu} is outside {min}..={max}")]
    InvalidMtu { mtu: usize, min: usize, max: usize },

    #[error("Bulk mode needs room for at least one corruption list entry (MTU {0})")]
    MtuTooSmallForBulk(usize),

    #[error("Retry policy must allow at least one attempt")]
    NoAttempts,

    #[error("Timeout `{0}` must be non-zero")]
    ZeroTimeout(&'static str),
}

/// ARQ discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArqMode {
    /// One frame in flight, per-frame ack
    #[default]
    StopAndWait,
    /// Whole burst, then corruption-list driven retransmission rounds
    BulkSelectiveRepeat,
}

impl fmt::Display for ArqMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArqMode::StopAndWait => write!(f, "stop-and-wait"),
            ArqMode::BulkSelectiveRepeat => write!(f, "bulk-selective-repeat"),
        }
    }
}

/// Bounded retry policy for acknowledged frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Transmissions allowed per frame, the first one included
    pub max_attempts: u32,
    /// Wait for the matching reply after each transmission
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Create a retry policy
    pub fn new(max_attempts: u32, timeout: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            timeout,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Parameters shared by both ends of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// ARQ discipline
    pub mode: ArqMode,
    /// Largest frame on the link, sequence byte included
    pub mtu: usize,
    /// Per-frame retry policy (stop-and-wait data and header frames)
    pub retry: RetryPolicy,
    /// Sender wait for a corruption list after each burst
    pub corruption_list_timeout: Duration,
    /// Retransmission rounds allowed after the initial burst
    pub max_rounds: u32,
    /// Receiver wait for the first frame of a transfer
    pub first_frame_timeout: Duration,
    /// Silence that ends a burst, or abandons a stop-and-wait transfer
    pub inter_frame_timeout: Duration,
    /// Receiver wait for the first retransmitted frame after a corruption list
    pub retransmission_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            mode: ArqMode::default(),
            mtu: DEFAULT_MTU,
            retry: RetryPolicy::default(),
            corruption_list_timeout: DEFAULT_CORRUPTION_LIST_TIMEOUT,
            max_rounds: DEFAULT_MAX_ROUNDS,
            first_frame_timeout: Duration::from_secs(60),
            inter_frame_timeout: Duration::from_secs(5),
            retransmission_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Default configuration for `mode`
    pub fn with_mode(mode: ArqMode) -> Self {
        SessionConfig {
            mode,
            ..SessionConfig::default()
        }
    }

    /// Check the configuration before a session uses it
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(ConfigError::InvalidMtu {
                mtu: self.mtu,
                min: MIN_MTU,
                max: MAX_MTU,
            });
        }
        if self.mode == ArqMode::BulkSelectiveRepeat && CorruptionList::capacity_for(self.mtu) == 0
        {
            return Err(ConfigError::MtuTooSmallForBulk(self.mtu));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }

        let timeouts = [
            ("retry.timeout", self.retry.timeout),
            ("corruption_list_timeout", self.corruption_list_timeout),
            ("first_frame_timeout", self.first_frame_timeout),
            ("inter_frame_timeout", self.inter_frame_timeout),
            ("retransmission_timeout", self.retransmission_timeout),
        ];
        if let Some(&(name, _)) = timeouts.iter().find(|(_, t)| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout(name));
        }

        Ok(())
    }
}
