//! Pending-sequence tracking for selective repeat
//!
//! The receiver starts a transfer needing every sequence of the plan. Each
//! time it checks the buffer it drops the sequences that arrived intact. The
//! set only ever shrinks after that initial population, which is what
//! bounds the number of retransmission rounds.

use crate::buffer::ReceiveBuffer;
use crate::codec::TransferPlan;
use crate::frame::CorruptionList;
use crate::sequence::SeqNumber;
use std::collections::BTreeSet;

/// Sequences the receiver still needs
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    seqs: BTreeSet<SeqNumber>,
    /// Sequences seen with a link-layer corruption flag
    corrupted: BTreeSet<SeqNumber>,
}

impl PendingSet {
    /// Populate with every sequence of `plan` (round 0)
    pub fn full(plan: &TransferPlan) -> Self {
        PendingSet {
            seqs: plan.sequences().collect(),
            corrupted: BTreeSet::new(),
        }
    }

    /// Record that a frame for `seq` arrived corrupted
    ///
    /// Never adds to the pending set: a corrupted sequence is only pending
    /// if it was already needed.
    pub fn mark_corrupted(&mut self, seq: SeqNumber) -> bool {
        if self.seqs.contains(&seq) {
            self.corrupted.insert(seq);
            true
        } else {
            false
        }
    }

    /// Remove a sequence that arrived intact
    pub fn remove(&mut self, seq: SeqNumber) -> bool {
        self.corrupted.remove(&seq);
        self.seqs.remove(&seq)
    }

    /// Drop every sequence the buffer now holds; returns how many were cleared
    pub fn settle(&mut self, buffer: &ReceiveBuffer) -> usize {
        let before = self.seqs.len();
        self.seqs.retain(|seq| !buffer.contains(*seq));
        let seqs = &self.seqs;
        self.corrupted.retain(|seq| seqs.contains(seq));
        before - self.seqs.len()
    }

    /// Check if a sequence is still needed
    pub fn contains(&self, seq: SeqNumber) -> bool {
        self.seqs.contains(&seq)
    }

    /// Number of sequences still needed
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Number of pending sequences that were seen corrupted (not just lost)
    pub fn corrupted_count(&self) -> usize {
        self.corrupted.len()
    }

    /// Pending sequences in ascending order
    pub fn to_vec(&self) -> Vec<SeqNumber> {
        self.seqs.iter().copied().collect()
    }

    /// Build the corruption list for one control frame of `mtu` bytes
    ///
    /// When more sequences are pending than fit, the lowest ones are listed;
    /// the remainder stays pending for a later round.
    pub fn corruption_list(&self, mtu: usize) -> CorruptionList {
        let capacity = CorruptionList::capacity_for(mtu);
        CorruptionList::new(self.seqs.iter().copied().take(capacity).collect())
    }
}
