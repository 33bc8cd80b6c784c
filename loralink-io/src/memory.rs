//! In-process link pair
//!
//! Two [`MemoryLink`] endpoints joined by crossbeam channels. Frames sent on
//! one end arrive intact and in order at the other. Wrap an end in
//! [`Impaired`](crate::impair::Impaired) to add loss and corruption.

use crate::time::Pacer;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use loralink_protocol::channel::{LinkChannel, LinkError, LinkLog, LinkEvent, Received};
use std::thread;
use std::time::Duration;

/// Largest frame a single radio packet carries
pub const MAX_RADIO_FRAME: usize = 255;

/// One end of an in-process link
pub struct MemoryLink {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    max_frame: usize,
    pacer: Option<Pacer>,
    log: LinkLog,
}

impl MemoryLink {
    /// Create two connected endpoints
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = channel::unbounded();
        let (b_tx, a_rx) = channel::unbounded();

        (MemoryLink::new(a_tx, a_rx), MemoryLink::new(b_tx, b_rx))
    }

    fn new(tx: Sender<Bytes>, rx: Receiver<Bytes>) -> Self {
        MemoryLink {
            tx,
            rx,
            max_frame: MAX_RADIO_FRAME,
            pacer: None,
            log: LinkLog::new(),
        }
    }

    /// Hold every send for its airtime
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Reject frames longer than `max_frame`
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Handle onto this end's record of sends and receives
    pub fn log(&self) -> LinkLog {
        self.log.clone()
    }

    /// Pacer state, if pacing is enabled
    pub fn pacer(&self) -> Option<&Pacer> {
        self.pacer.as_ref()
    }

    /// Frames queued for this end and not yet received
    pub fn pending_inbound(&self) -> usize {
        self.rx.len()
    }
}

impl LinkChannel for MemoryLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let frame = Bytes::copy_from_slice(frame);
        self.log.record(LinkEvent::Sent(frame.clone()));

        if frame.len() > self.max_frame {
            return Err(LinkError::FrameTooLarge {
                len: frame.len(),
                max: self.max_frame,
            });
        }

        if let Some(pacer) = self.pacer.as_mut() {
            pacer.transmit(frame.len());
        }

        self.tx.send(frame).map_err(|_| LinkError::Closed)
    }

    fn recv(&mut self, timeout: Duration) -> Received {
        let received = match self.rx.recv_timeout(timeout) {
            Ok(frame) => Received::Ok(frame),
            Err(RecvTimeoutError::Timeout) => Received::Timeout,
            Err(RecvTimeoutError::Disconnected) => {
                // A radio hears nothing from a peer that has gone away
                tracing::debug!("Peer endpoint dropped, waiting out {:?}", timeout);
                thread::sleep(timeout);
                Received::Timeout
            }
        };

        self.log.record(LinkEvent::Received(received.clone()));
        received
    }
}
