//! Payload framing
//!
//! Splits a payload into sequence-numbered frames and puts it back together.
//! Pure data transforms: nothing here touches the link.

use crate::frame::{Frame, FrameError, MAX_MTU, MIN_MTU, SEQ_FIELD_SIZE};
use crate::sequence::{SeqNumber, SEQ_SPACE};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use thiserror::Error;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("MTU {0} is outside the supported range 2..=255")]
    InvalidMtu(usize),

    #[error("Transfer needs {frames} frames but only {max} sequence numbers exist")]
    SequenceOverflow { frames: usize, max: usize },

    #[error("Incomplete data: {} of {frame_count} frames missing", .missing.len())]
    IncompleteData {
        frame_count: usize,
        missing: Vec<SeqNumber>,
    },

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Shape of one transfer: how many bytes, how they are cut into frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPlan {
    total_bytes: usize,
    mtu: usize,
    frame_count: usize,
}

impl TransferPlan {
    /// Plan a transfer of `total_bytes` over frames of at most `mtu` bytes
    pub fn new(total_bytes: usize, mtu: usize) -> Result<Self, CodecError> {
        if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
            return Err(CodecError::InvalidMtu(mtu));
        }

        let chunk = mtu - SEQ_FIELD_SIZE;
        let frame_count = (total_bytes + chunk - 1) / chunk;
        if frame_count > SEQ_SPACE {
            return Err(CodecError::SequenceOverflow {
                frames: frame_count,
                max: SEQ_SPACE,
            });
        }

        Ok(TransferPlan {
            total_bytes,
            mtu,
            frame_count,
        })
    }

    /// Largest payload a single session can carry at this MTU
    pub fn max_transfer_size(mtu: usize) -> usize {
        SEQ_SPACE * mtu.saturating_sub(SEQ_FIELD_SIZE)
    }

    /// Total payload size in bytes
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Frame size limit including the sequence byte
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Number of frames in the transfer
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Payload bytes carried by every frame except possibly the last
    pub fn chunk_size(&self) -> usize {
        self.mtu - SEQ_FIELD_SIZE
    }

    /// Byte range of the payload carried by `seq`
    pub fn frame_range(&self, seq: SeqNumber) -> std::ops::Range<usize> {
        let start = (seq.index() * self.chunk_size()).min(self.total_bytes);
        let end = (start + self.chunk_size()).min(self.total_bytes);
        start..end
    }

    /// Payload length of frame `seq` (0 for sequences outside the plan)
    pub fn frame_len(&self, seq: SeqNumber) -> usize {
        self.frame_range(seq).len()
    }

    /// Check if `seq` belongs to this transfer
    pub fn contains(&self, seq: SeqNumber) -> bool {
        seq.index() < self.frame_count
    }

    /// Iterate over all sequence numbers of the transfer
    pub fn sequences(&self) -> impl Iterator<Item = SeqNumber> {
        SeqNumber::range(self.frame_count)
    }

    /// Check that a received frame has the payload length this plan expects
    ///
    /// Every frame but the last carries a full chunk; the last carries the
    /// remainder.
    pub fn check_frame(&self, frame: &Frame) -> Result<(), FrameError> {
        let max = self.chunk_size();
        let len = frame.payload.len();
        if len > max {
            return Err(FrameError::PayloadTooLarge { len, max });
        }
        let expected = self.frame_len(frame.seq);
        if len != expected {
            return Err(FrameError::LengthMismatch {
                seq: frame.seq,
                len,
                expected,
            });
        }
        Ok(())
    }
}

/// Split `payload` into frames of at most `mtu` bytes
///
/// Sequence numbers start at 0 and increase by one per frame. The same
/// payload and MTU always produce the same frames.
pub fn split(payload: &Bytes, mtu: usize) -> Result<Vec<Frame>, CodecError> {
    let plan = TransferPlan::new(payload.len(), mtu)?;
    Ok(plan
        .sequences()
        .map(|seq| Frame::new(seq, payload.slice(plan.frame_range(seq))))
        .collect())
}

/// Reassemble a payload from received chunks
///
/// Fails with [`CodecError::IncompleteData`] if any sequence in
/// `0..frame_count` is absent. The result is truncated to `total_bytes`.
pub fn reassemble(
    chunks: &BTreeMap<SeqNumber, Bytes>,
    frame_count: usize,
    total_bytes: usize,
) -> Result<Bytes, CodecError> {
    let missing: Vec<SeqNumber> = SeqNumber::range(frame_count)
        .filter(|seq| !chunks.contains_key(seq))
        .collect();
    if !missing.is_empty() {
        return Err(CodecError::IncompleteData {
            frame_count,
            missing,
        });
    }

    let mut buf = BytesMut::with_capacity(total_bytes);
    for chunk in SeqNumber::range(frame_count).filter_map(|seq| chunks.get(&seq)) {
        buf.extend_from_slice(chunk);
    }
    buf.truncate(total_bytes);
    Ok(buf.freeze())
}

/// Reassemble the longest contiguous prefix that was recovered
///
/// Stops at the first missing sequence. Used for best-effort results when a
/// transfer ends incomplete.
pub fn reassemble_partial(chunks: &BTreeMap<SeqNumber, Bytes>, plan: &TransferPlan) -> Bytes {
    let mut buf = BytesMut::new();
    for seq in plan.sequences() {
        match chunks.get(&seq) {
            Some(chunk) => buf.extend_from_slice(chunk),
            None => break,
        }
    }
    buf.truncate(plan.total_bytes());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Bytes {
        (0..len).map(|i| (i % 256) as u8).collect::<Vec<_>>().into()
    }

    fn to_map(frames: &[Frame]) -> BTreeMap<SeqNumber, Bytes> {
        frames.iter().map(|f| (f.seq, f.payload.clone())).collect()
    }

    #[test]
    fn test_plan_10kb() {
        let plan = TransferPlan::new(10_240, 254).unwrap();
        assert_eq!(plan.frame_count(), 41);
        assert_eq!(plan.chunk_size(), 253);
        assert_eq!(plan.frame_len(SeqNumber::new(0)), 253);
        assert_eq!(plan.frame_len(SeqNumber::new(40)), 10_240 - 40 * 253);
        assert_eq!(plan.frame_len(SeqNumber::new(41)), 0);
    }

    #[test]
    fn test_plan_invalid_mtu() {
        assert_eq!(TransferPlan::new(10, 1), Err(CodecError::InvalidMtu(1)));
        assert_eq!(TransferPlan::new(10, 256), Err(CodecError::InvalidMtu(256)));
    }

    #[test]
    fn test_plan_sequence_overflow() {
        let max = TransferPlan::max_transfer_size(254);
        assert_eq!(max, 255 * 253);
        assert!(TransferPlan::new(max, 254).is_ok());
        assert_eq!(
            TransferPlan::new(max + 1, 254),
            Err(CodecError::SequenceOverflow {
                frames: 256,
                max: 255
            })
        );
    }

    #[test]
    fn test_split_sequences_and_sizes() {
        let payload = pattern(600);
        let frames = split(&payload, 254).unwrap();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.seq.index(), i);
        }
        assert_eq!(frames[0].payload.len(), 253);
        assert_eq!(frames[1].payload.len(), 253);
        assert_eq!(frames[2].payload.len(), 94);
    }

    #[test]
    fn test_split_is_deterministic() {
        let payload = pattern(1000);
        assert_eq!(split(&payload, 100).unwrap(), split(&payload, 100).unwrap());
    }

    #[test]
    fn test_split_empty_payload() {
        let frames = split(&Bytes::new(), 254).unwrap();
        assert!(frames.is_empty());
        let out = reassemble(&BTreeMap::new(), 0, 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_roundtrip_boundary_lengths() {
        let mtu = 64;
        for len in [0, 1, mtu - 2, mtu - 1, mtu, 10 * mtu] {
            let payload = pattern(len);
            let frames = split(&payload, mtu).unwrap();
            let out = reassemble(&to_map(&frames), frames.len(), len).unwrap();
            assert_eq!(out, payload, "length {}", len);
        }
    }

    #[test]
    fn test_reassemble_reports_missing() {
        let payload = pattern(1000);
        let frames = split(&payload, 254).unwrap();
        let mut map = to_map(&frames);
        map.remove(&SeqNumber::new(2));

        match reassemble(&map, frames.len(), payload.len()) {
            Err(CodecError::IncompleteData {
                frame_count,
                missing,
            }) => {
                assert_eq!(frame_count, 4);
                assert_eq!(missing, vec![SeqNumber::new(2)]);
            }
            other => panic!("Expected IncompleteData, got {:?}", other),
        }
    }

    #[test]
    fn test_reassemble_truncates_padding() {
        let mut map = BTreeMap::new();
        map.insert(SeqNumber::new(0), Bytes::from_static(b"abcd"));
        map.insert(SeqNumber::new(1), Bytes::from_static(b"ef\0\0"));
        let out = reassemble(&map, 2, 6).unwrap();
        assert_eq!(out, Bytes::from_static(b"abcdef"));
    }

    #[test]
    fn test_reassemble_partial_prefix() {
        let payload = pattern(1000);
        let plan = TransferPlan::new(payload.len(), 254).unwrap();
        let frames = split(&payload, 254).unwrap();
        let mut map = to_map(&frames);
        map.remove(&SeqNumber::new(2));

        let partial = reassemble_partial(&map, &plan);
        assert_eq!(partial, payload.slice(..2 * 253));
    }

    #[test]
    fn test_check_frame() {
        let plan = TransferPlan::new(100, 10).unwrap();
        let ok = Frame::new(SeqNumber::new(0), Bytes::from(vec![0u8; 9]));
        let big = Frame::new(SeqNumber::new(0), Bytes::from(vec![0u8; 10]));
        assert!(plan.check_frame(&ok).is_ok());
        assert_eq!(
            plan.check_frame(&big),
            Err(FrameError::PayloadTooLarge { len: 10, max: 9 })
        );
    }

    #[test]
    fn test_check_frame_rejects_wrong_length() {
        // 100 bytes at 9 per frame: 11 full frames and a 1-byte tail
        let plan = TransferPlan::new(100, 10).unwrap();
        let short = Frame::new(SeqNumber::new(3), Bytes::from(vec![0u8; 4]));
        assert_eq!(
            plan.check_frame(&short),
            Err(FrameError::LengthMismatch {
                seq: SeqNumber::new(3),
                len: 4,
                expected: 9,
            })
        );

        let tail = Frame::new(SeqNumber::new(11), Bytes::from(vec![0u8; 1]));
        assert!(plan.check_frame(&tail).is_ok());
        let long_tail = Frame::new(SeqNumber::new(11), Bytes::from(vec![0u8; 2]));
        assert!(matches!(
            plan.check_frame(&long_tail),
            Err(FrameError::LengthMismatch { len: 2, expected: 1, .. })
        ));
    }
}
