//! Link channel abstraction
//!
//! The radio driver is the only boundary of the protocol. It moves whole
//! frames, blocks on send until the frame is on air, and reports each
//! receive as intact, corrupted, or nothing heard before the deadline.
//!
//! A radio cannot tell a vanished peer from silence, so receive never fails:
//! hard faults surface as [`Received::Timeout`].

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Link errors
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Frame of {len} bytes exceeds the link limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Link is closed")]
    Closed,
}

/// Outcome of one receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Frame arrived with a valid checksum
    Ok(Bytes),
    /// Frame arrived but failed the link-layer check; bytes are best effort
    Corrupt(Bytes),
    /// Nothing arrived before the deadline
    Timeout,
}

impl Received {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Received::Ok(_) => "ok",
            Received::Corrupt(_) => "corrupt",
            Received::Timeout => "timeout",
        }
    }
}

/// Half-duplex frame transport
pub trait LinkChannel {
    /// Transmit one frame; never retries internally
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Wait up to `timeout` for one inbound frame
    fn recv(&mut self, timeout: Duration) -> Received;
}

impl<C: LinkChannel + ?Sized> LinkChannel for &mut C {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        (**self).send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> Received {
        (**self).recv(timeout)
    }
}

impl<C: LinkChannel + ?Sized> LinkChannel for Box<C> {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        (**self).send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> Received {
        (**self).recv(timeout)
    }
}

/// One recorded link operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A frame handed to `send` (recorded even when the send fails)
    Sent(Bytes),
    /// The result handed back from `recv`
    Received(Received),
}

/// Shared, ordered record of link operations
///
/// Cloning yields a handle onto the same record, so a test can keep one
/// while the link is owned by a session.
#[derive(Debug, Clone, Default)]
pub struct LinkLog {
    events: Arc<Mutex<Vec<LinkEvent>>>,
}

impl LinkLog {
    /// Create an empty log
    pub fn new() -> Self {
        LinkLog::default()
    }

    /// Append an event
    pub fn record(&self, event: LinkEvent) {
        self.events.lock().push(event);
    }

    /// Snapshot of every event so far
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().clone()
    }

    /// Frames passed to `send`, in order
    pub fn sent(&self) -> Vec<Bytes> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LinkEvent::Sent(frame) => Some(frame.clone()),
                LinkEvent::Received(_) => None,
            })
            .collect()
    }

    /// Intact frames returned from `recv`, in order
    pub fn received(&self) -> Vec<Bytes> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                LinkEvent::Received(Received::Ok(frame)) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of frames passed to `send`
    pub fn sent_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, LinkEvent::Sent(_)))
            .count()
    }

    /// Forget every recorded event
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Received> + Send>;

/// Deterministic link driven by a responder closure
///
/// Each sent frame is shown to the responder, whose replies are queued for
/// subsequent `recv` calls. A `recv` on an empty queue returns
/// [`Received::Timeout`] immediately, so tests never wait on real clocks.
pub struct ScriptedLink {
    responder: Responder,
    inbound: VecDeque<Received>,
    failing_sends: usize,
    log: LinkLog,
}

impl ScriptedLink {
    /// Create a link whose replies come from `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Received> + Send + 'static,
    {
        ScriptedLink {
            responder: Box::new(responder),
            inbound: VecDeque::new(),
            failing_sends: 0,
            log: LinkLog::new(),
        }
    }

    /// Create a link that never replies
    pub fn silent() -> Self {
        ScriptedLink::new(|_| Vec::new())
    }

    /// Create a link that replays `frames` and ignores whatever is sent
    pub fn replay<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Received>,
    {
        let mut link = ScriptedLink::silent();
        link.inbound.extend(frames);
        link
    }

    /// Queue an inbound result ahead of any responder output
    pub fn push(&mut self, received: Received) {
        self.inbound.push_back(received);
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&mut self, count: usize) {
        self.failing_sends = count;
    }

    /// Handle onto this link's event log
    pub fn log(&self) -> LinkLog {
        self.log.clone()
    }

    /// Number of results still queued
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }
}

impl LinkChannel for ScriptedLink {
    fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.log.record(LinkEvent::Sent(Bytes::copy_from_slice(frame)));

        if self.failing_sends > 0 {
            self.failing_sends -= 1;
            return Err(LinkError::SendFailed("scripted failure".to_string()));
        }

        let replies = (self.responder)(frame);
        self.inbound.extend(replies);
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> Received {
        let received = self.inbound.pop_front().unwrap_or(Received::Timeout);
        self.log.record(LinkEvent::Received(received.clone()));
        received
    }
}
