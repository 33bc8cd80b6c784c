//! Sequence Number Handling
//!
//! Every frame on the link starts with a single sequence byte. Values
//! `0..=254` number data frames; `0xFF` is reserved as the control marker
//! that introduces corruption lists and transfer headers. A single transfer
//! therefore carries at most [`SEQ_SPACE`] frames, and sequence numbers never
//! wrap within a session.

use std::fmt;
use std::ops::Add;

/// Largest sequence number a data frame may carry
pub const MAX_SEQ_NUMBER: u8 = 0xFE;

/// Byte value reserved for control frames
pub const CONTROL_MARKER: u8 = 0xFF;

/// Number of distinct data-frame sequence numbers (0..=254)
pub const SEQ_SPACE: usize = MAX_SEQ_NUMBER as usize + 1;

/// Data frame sequence number
///
/// A thin wrapper over the sequence byte. Construction rejects the control
/// marker so a `SeqNumber` can always be written as byte 0 of a data frame.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SeqNumber(u8);

impl SeqNumber {
    /// First sequence number of every transfer
    pub const ZERO: SeqNumber = SeqNumber(0);

    /// Create a new sequence number
    ///
    /// # Panics
    /// Panics if value is the control marker
    pub fn new(value: u8) -> Self {
        assert!(
            value <= MAX_SEQ_NUMBER,
            "Sequence number {:#04x} is reserved for control frames",
            value
        );
        SeqNumber(value)
    }

    /// Create a sequence number from a wire byte, rejecting the control marker
    #[inline]
    pub fn from_wire(value: u8) -> Option<Self> {
        if value <= MAX_SEQ_NUMBER {
            Some(SeqNumber(value))
        } else {
            None
        }
    }

    /// Create a sequence number from a frame index within a transfer
    ///
    /// Returns `None` when the index falls outside the sequence space.
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index).ok().and_then(Self::from_wire)
    }

    /// Get the raw sequence byte
    #[inline]
    pub fn as_raw(self) -> u8 {
        self.0
    }

    /// Frame index of this sequence number within its transfer
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the next sequence number, or `None` at the end of the space
    #[inline]
    pub fn next(self) -> Option<Self> {
        Self::from_wire(self.0.wrapping_add(1))
    }

    /// Iterate over the first `count` sequence numbers of a transfer
    ///
    /// `count` is clamped to [`SEQ_SPACE`].
    pub fn range(count: usize) -> impl Iterator<Item = SeqNumber> {
        (0..count.min(SEQ_SPACE)).map(|i| SeqNumber(i as u8))
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SeqNumber> for u8 {
    fn from(seq: SeqNumber) -> u8 {
        seq.0
    }
}

impl TryFrom<u8> for SeqNumber {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        SeqNumber::from_wire(value).ok_or(value)
    }
}

impl Add<u8> for SeqNumber {
    type Output = Option<SeqNumber>;

    fn add(self, rhs: u8) -> Option<SeqNumber> {
        self.0.checked_add(rhs).and_then(SeqNumber::from_wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let seq = SeqNumber::new(100);
        assert_eq!(seq.as_raw(), 100);
        assert_eq!(seq.index(), 100);
    }

    #[test]
    #[should_panic]
    fn test_new_control_marker() {
        SeqNumber::new(CONTROL_MARKER);
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(SeqNumber::from_wire(0), Some(SeqNumber::ZERO));
        assert_eq!(SeqNumber::from_wire(254), Some(SeqNumber::new(254)));
        assert_eq!(SeqNumber::from_wire(0xFF), None);
    }

    #[test]
    fn test_from_index() {
        assert_eq!(SeqNumber::from_index(7), Some(SeqNumber::new(7)));
        assert_eq!(SeqNumber::from_index(254), Some(SeqNumber::new(254)));
        assert_eq!(SeqNumber::from_index(255), None);
        assert_eq!(SeqNumber::from_index(1000), None);
    }

    #[test]
    fn test_next_stops_at_end_of_space() {
        assert_eq!(SeqNumber::new(9).next(), Some(SeqNumber::new(10)));
        assert_eq!(SeqNumber::new(MAX_SEQ_NUMBER).next(), None);
    }

    #[test]
    fn test_add() {
        assert_eq!(SeqNumber::new(10) + 5, Some(SeqNumber::new(15)));
        assert_eq!(SeqNumber::new(250) + 5, None);
        assert_eq!(SeqNumber::new(250) + 10, None);
    }

    #[test]
    fn test_range() {
        let seqs: Vec<u8> = SeqNumber::range(4).map(SeqNumber::as_raw).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(SeqNumber::range(1000).count(), SEQ_SPACE);
        assert_eq!(SeqNumber::range(0).count(), 0);
    }

    #[test]
    fn test_ordering() {
        assert!(SeqNumber::new(3) < SeqNumber::new(4));
        assert_eq!(SeqNumber::try_from(0xFF), Err(0xFF));
    }
}
