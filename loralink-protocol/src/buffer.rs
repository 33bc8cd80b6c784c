//! Receive-side frame storage
//!
//! Frames arrive in any order and possibly more than once. The buffer keeps
//! the first intact copy of each sequence and never replaces it.

use crate::codec::{self, CodecError, TransferPlan};
use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Result of offering a frame to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// First copy of this sequence, now stored
    Stored,
    /// Sequence already held; the new copy was discarded
    Duplicate,
}

/// Receive buffer keyed by sequence number (first-delivery-wins)
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    chunks: BTreeMap<SeqNumber, Bytes>,
    bytes_held: usize,
}

impl ReceiveBuffer {
    /// Create an empty receive buffer
    pub fn new() -> Self {
        ReceiveBuffer::default()
    }

    /// Store a payload unless the sequence is already present
    pub fn insert(&mut self, seq: SeqNumber, payload: Bytes) -> InsertOutcome {
        if self.chunks.contains_key(&seq) {
            return InsertOutcome::Duplicate;
        }
        self.bytes_held += payload.len();
        self.chunks.insert(seq, payload);
        InsertOutcome::Stored
    }

    /// Get the stored payload for a sequence
    pub fn get(&self, seq: SeqNumber) -> Option<&Bytes> {
        self.chunks.get(&seq)
    }

    /// Check if a sequence has been stored
    pub fn contains(&self, seq: SeqNumber) -> bool {
        self.chunks.contains_key(&seq)
    }

    /// Number of distinct sequences held
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload bytes held
    pub fn bytes_held(&self) -> usize {
        self.bytes_held
    }

    /// Check whether every frame of `plan` is present
    pub fn is_complete(&self, plan: &TransferPlan) -> bool {
        plan.sequences().all(|seq| self.chunks.contains_key(&seq))
    }

    /// Payload bytes held for sequences inside `plan`
    pub fn bytes_in_plan(&self, plan: &TransferPlan) -> usize {
        self.chunks
            .iter()
            .filter(|(seq, _)| plan.contains(**seq))
            .map(|(_, chunk)| chunk.len())
            .sum()
    }

    /// Reassemble the full payload described by `plan`
    pub fn reassemble(&self, plan: &TransferPlan) -> Result<Bytes, CodecError> {
        codec::reassemble(&self.chunks, plan.frame_count(), plan.total_bytes())
    }

    /// Reassemble the contiguous prefix recovered so far
    pub fn reassemble_partial(&self, plan: &TransferPlan) -> Bytes {
        codec::reassemble_partial(&self.chunks, plan)
    }

    /// Drop all stored frames
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes_held = 0;
    }
}
