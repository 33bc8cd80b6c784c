//! Frame Structures and Serialization
//!
//! Every frame on the radio link is a single datagram whose first byte is
//! either a data sequence number (`0..=254`) or the control marker `0xFF`.
//!
//! Frames flow in two directions and are decoded per direction, because the
//! control encodings overlap (a nine-byte corruption list and a header frame
//! share the same prefix):
//!
//! * sender → receiver ([`SenderFrame`]): data frames and the optional
//!   transfer header announcement
//! * receiver → sender ([`ReceiverFrame`]): stop-and-wait acks, the header
//!   ack, and bulk-mode corruption lists

use crate::sequence::{SeqNumber, CONTROL_MARKER};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the sequence field that prefixes every data frame
pub const SEQ_FIELD_SIZE: usize = 1;

/// Largest frame the link layer accepts (one radio packet)
pub const MAX_MTU: usize = 255;

/// Smallest MTU that still leaves room for one payload byte
pub const MIN_MTU: usize = SEQ_FIELD_SIZE + 1;

/// Size of the transfer header announcement frame
pub const HEADER_FRAME_SIZE: usize = 9;

/// Marker byte plus count byte at the head of a corruption list
const CORRUPTION_LIST_PREFIX: usize = 2;

/// Frame errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Payload of {len} bytes exceeds the {max} bytes allowed by the MTU")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Frame {seq} carries {len} bytes, expected {expected}")]
    LengthMismatch {
        seq: SeqNumber,
        len: usize,
        expected: usize,
    },

    #[error("Frame starts with the control marker")]
    ControlMarker,

    #[error("Unexpected control frame of {len} bytes")]
    UnexpectedControl { len: usize },

    #[error("Corruption list entry {0:#04x} is not a data sequence number")]
    InvalidListEntry(u8),

    #[error("Empty frame")]
    Empty,
}

/// Data frame: one sequence byte followed by a payload chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number (byte 0 on the wire)
    pub seq: SeqNumber,
    /// Payload chunk (at most `mtu - 1` bytes)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new data frame
    pub fn new(seq: SeqNumber, payload: Bytes) -> Self {
        Frame { seq, payload }
    }

    /// Total size of the frame on the wire
    pub fn size(&self) -> usize {
        SEQ_FIELD_SIZE + self.payload.len()
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u8(self.seq.as_raw());
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse a data frame from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        let (&first, rest) = bytes.split_first().ok_or(FrameError::Empty)?;
        let seq = SeqNumber::from_wire(first).ok_or(FrameError::ControlMarker)?;
        Ok(Frame {
            seq,
            payload: Bytes::copy_from_slice(rest),
        })
    }

    /// Best-effort sequence attribution for a frame the link flagged corrupt
    ///
    /// Only the first byte is inspected; the caller decides whether the
    /// sequence is plausible for the current transfer.
    pub fn peek_seq(bytes: &[u8]) -> Option<SeqNumber> {
        bytes.first().copied().and_then(SeqNumber::from_wire)
    }
}

/// Transfer header announcement
///
/// Sent before the data frames when the receiver does not know the payload
/// size in advance (image transfers). Wire format: `0xFF`, width (u16 BE),
/// height (u16 BE), total size (u32 BE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferHeader {
    /// Image width in pixels (0 for non-image payloads)
    pub width: u16,
    /// Image height in pixels (0 for non-image payloads)
    pub height: u16,
    /// Total payload size in bytes
    pub total_size: u32,
}

impl TransferHeader {
    /// Create a header for an image payload
    pub fn new(width: u16, height: u16, total_size: u32) -> Self {
        TransferHeader {
            width,
            height,
            total_size,
        }
    }

    /// Create a header for a plain byte payload
    pub fn for_bytes(total_size: u32) -> Self {
        TransferHeader {
            width: 0,
            height: 0,
            total_size,
        }
    }

    /// Serialize the header frame
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_FRAME_SIZE);
        buf.put_u8(CONTROL_MARKER);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_u32(self.total_size);
        buf
    }

    /// Parse a header frame
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_FRAME_SIZE {
            return Err(FrameError::InsufficientData {
                expected: HEADER_FRAME_SIZE,
                actual: bytes.len(),
            });
        }
        let mut buf = bytes;
        if buf.get_u8() != CONTROL_MARKER {
            return Err(FrameError::UnexpectedControl { len: bytes.len() });
        }
        Ok(TransferHeader {
            width: buf.get_u16(),
            height: buf.get_u16(),
            total_size: buf.get_u32(),
        })
    }
}

/// Bulk-mode corruption list (selective-repeat NAK)
///
/// Wire format: `0xFF`, count N, then N sequence bytes. An empty list tells
/// the sender every frame arrived intact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CorruptionList {
    /// Sequences the receiver still needs, in ascending order
    pub seqs: Vec<SeqNumber>,
}

impl CorruptionList {
    /// Create a new corruption list
    pub fn new(seqs: Vec<SeqNumber>) -> Self {
        CorruptionList { seqs }
    }

    /// Maximum number of entries that fit in one frame of the given MTU
    pub fn capacity_for(mtu: usize) -> usize {
        mtu.saturating_sub(CORRUPTION_LIST_PREFIX).min(u8::MAX as usize)
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Number of listed sequences
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    /// Serialize the list
    ///
    /// Entries beyond `u8::MAX` are dropped; callers size the list with
    /// [`CorruptionList::capacity_for`] first.
    pub fn to_bytes(&self) -> BytesMut {
        let count = self.seqs.len().min(u8::MAX as usize);
        let mut buf = BytesMut::with_capacity(CORRUPTION_LIST_PREFIX + count);
        buf.put_u8(CONTROL_MARKER);
        buf.put_u8(count as u8);
        for seq in &self.seqs[..count] {
            buf.put_u8(seq.as_raw());
        }
        buf
    }

    /// Parse a corruption list
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < CORRUPTION_LIST_PREFIX {
            return Err(FrameError::InsufficientData {
                expected: CORRUPTION_LIST_PREFIX,
                actual: bytes.len(),
            });
        }
        if bytes[0] != CONTROL_MARKER {
            return Err(FrameError::UnexpectedControl { len: bytes.len() });
        }

        let count = bytes[1] as usize;
        let expected = CORRUPTION_LIST_PREFIX + count;
        if bytes.len() < expected {
            return Err(FrameError::InsufficientData {
                expected,
                actual: bytes.len(),
            });
        }

        let seqs = bytes[CORRUPTION_LIST_PREFIX..expected]
            .iter()
            .map(|&b| SeqNumber::from_wire(b).ok_or(FrameError::InvalidListEntry(b)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CorruptionList { seqs })
    }
}

/// Frames travelling from sender to receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderFrame {
    /// Payload chunk
    Data(Frame),
    /// Transfer announcement
    Header(TransferHeader),
}

impl SenderFrame {
    /// Decode a frame received from the sender
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        match bytes.first() {
            None => Err(FrameError::Empty),
            Some(&CONTROL_MARKER) if bytes.len() == HEADER_FRAME_SIZE => {
                Ok(SenderFrame::Header(TransferHeader::from_bytes(bytes)?))
            }
            Some(&CONTROL_MARKER) => Err(FrameError::UnexpectedControl { len: bytes.len() }),
            Some(_) => Ok(SenderFrame::Data(Frame::from_bytes(bytes)?)),
        }
    }
}

/// Frames travelling from receiver to sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverFrame {
    /// Stop-and-wait acknowledgement of one data frame
    Ack(SeqNumber),
    /// Acknowledgement of the transfer header
    HeaderAck,
    /// Bulk-mode list of missing or corrupted sequences
    CorruptionList(CorruptionList),
}

impl ReceiverFrame {
    /// Encode this frame for transmission
    pub fn to_bytes(&self) -> BytesMut {
        match self {
            ReceiverFrame::Ack(seq) => {
                let mut buf = BytesMut::with_capacity(SEQ_FIELD_SIZE);
                buf.put_u8(seq.as_raw());
                buf
            }
            ReceiverFrame::HeaderAck => {
                let mut buf = BytesMut::with_capacity(1);
                buf.put_u8(CONTROL_MARKER);
                buf
            }
            ReceiverFrame::CorruptionList(list) => list.to_bytes(),
        }
    }

    /// Decode a frame received from the receiver
    ///
    /// A lone `0xFF` is the header ack; a longer `0xFF`-prefixed frame is a
    /// corruption list; a frame whose first byte is a sequence number is a
    /// data ack (trailing bytes are ignored).
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        match bytes {
            [] => Err(FrameError::Empty),
            [CONTROL_MARKER] => Ok(ReceiverFrame::HeaderAck),
            [CONTROL_MARKER, ..] => Ok(ReceiverFrame::CorruptionList(
                CorruptionList::from_bytes(bytes)?,
            )),
            [first, ..] => Ok(ReceiverFrame::Ack(SeqNumber::new(*first))),
        }
    }
}
