//! Transfer session
//!
//! Owns the link for the length of one transfer, picks the sender or
//! receiver role, and hands back a [`TransferReport`] describing what made
//! it across.

use crate::channel::{LinkChannel, LinkError};
use crate::codec::{CodecError, TransferPlan};
use crate::config::{ArqMode, ConfigError, SessionConfig};
use crate::frame::TransferHeader;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::sequence::SeqNumber;
use crate::stats::SessionStats;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::Span;

/// Transfer errors
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Nothing heard from the peer within {0:?}")]
    LinkTimeout(Duration),

    #[error("Only corrupted frames heard from the peer")]
    LinkCorruption,

    #[error("Frame {seq} not acknowledged after {attempts} attempts")]
    ExceededRetries { seq: SeqNumber, attempts: u32 },

    #[error("Transfer header not acknowledged after {attempts} attempts")]
    HeaderNotAcknowledged { attempts: u32 },

    #[error("Transfer needs {frames} frames but only {max} sequence numbers exist")]
    SequenceOverflow { frames: usize, max: usize },

    #[error("Transfer incomplete: {missing} frames missing, {delivered} of {total} bytes delivered")]
    IncompleteTransfer {
        missing: usize,
        delivered: u64,
        total: u64,
    },

    #[error("Codec error: {0}")]
    Codec(CodecError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

impl From<CodecError> for TransferError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::SequenceOverflow { frames, max } => {
                TransferError::SequenceOverflow { frames, max }
            }
            other => TransferError::Codec(other),
        }
    }
}

/// Which end of the link produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Outcome of one transfer
///
/// Always carries whatever was recovered: a sender reports the prefix the
/// receiver confirmed, a receiver reports the contiguous prefix it holds.
#[derive(Debug)]
pub struct TransferReport {
    /// Side of the link this report describes
    pub role: Role,
    /// ARQ discipline used
    pub mode: ArqMode,
    /// Delivered (sender) or recovered (receiver) bytes
    pub payload: Bytes,
    /// Size of the whole payload
    pub total_bytes: u64,
    /// Every frame arrived
    pub complete: bool,
    /// The peer confirmed completion (false when completion was assumed)
    pub receiver_confirmed: bool,
    /// Sequences still missing when the transfer ended
    pub missing: Vec<SeqNumber>,
    /// Counters and timings
    pub stats: SessionStats,
    /// Why the transfer stopped short, if it did
    pub failure: Option<TransferError>,
}

impl TransferReport {
    pub(crate) fn new(role: Role, mode: ArqMode, stats: SessionStats) -> Self {
        TransferReport {
            role,
            mode,
            payload: Bytes::new(),
            total_bytes: 0,
            complete: false,
            receiver_confirmed: false,
            missing: Vec::new(),
            stats,
            failure: None,
        }
    }

    /// Check if the transfer completed
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whole payload, or the reason it is not whole
    pub fn into_result(self) -> Result<Bytes, TransferError> {
        if self.complete {
            return Ok(self.payload);
        }
        Err(self
            .failure
            .unwrap_or(TransferError::IncompleteTransfer {
                missing: self.missing.len(),
                delivered: self.stats.bytes_delivered,
                total: self.total_bytes,
            }))
    }
}

/// One transfer over an exclusively held link
pub struct TransferSession<C: LinkChannel> {
    link: C,
    config: SessionConfig,
    span: Span,
}

impl<C: LinkChannel> TransferSession<C> {
    /// Create a session; the configuration is validated here
    pub fn new(link: C, config: SessionConfig, span: Span) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(TransferSession { link, config, span })
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Access the underlying link
    pub fn link_mut(&mut self) -> &mut C {
        &mut self.link
    }

    /// Release the link
    pub fn into_inner(self) -> C {
        self.link
    }

    /// Send `payload` to a receiver that already knows its size
    ///
    /// Fails up front only when the payload cannot be framed; everything
    /// that happens on the link is described by the report.
    pub fn send(&mut self, payload: Bytes) -> Result<TransferReport, TransferError> {
        let span = self.span.clone();
        Sender::new(&mut self.link, &self.config, span).send(payload)
    }

    /// Receive a payload of `total_bytes`
    pub fn receive(&mut self, total_bytes: usize) -> Result<TransferReport, TransferError> {
        let plan = TransferPlan::new(total_bytes, self.config.mtu)?;
        let span = self.span.clone();
        Ok(Receiver::new(&mut self.link, &self.config, span).receive(&plan))
    }

    /// Announce the payload with a header frame, then send it
    ///
    /// The header's `total_size` is taken from the payload.
    pub fn send_announced(
        &mut self,
        payload: Bytes,
        width: u16,
        height: u16,
    ) -> Result<TransferReport, TransferError> {
        // Plans are capped well below u32::MAX
        let plan = TransferPlan::new(payload.len(), self.config.mtu)?;
        let header = TransferHeader::new(width, height, plan.total_bytes() as u32);

        let span = self.span.clone();
        let mut sender = Sender::new(&mut self.link, &self.config, span);
        sender.announce(header)?;
        sender.send(payload)
    }

    /// Wait for a header announcement, then receive the payload it describes
    pub fn receive_announced(
        &mut self,
    ) -> Result<(TransferHeader, TransferReport), TransferError> {
        let span = self.span.clone();
        let mut receiver = Receiver::new(&mut self.link, &self.config, span);
        let header = receiver.await_header()?;
        let plan = TransferPlan::new(header.total_size as usize, self.config.mtu)?;
        Ok((header, receiver.receive(&plan)))
    }
}
