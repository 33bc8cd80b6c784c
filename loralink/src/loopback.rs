//! In-process transfers
//!
//! Runs a sender and a receiver on two threads joined by a
//! [`MemoryLink`](crate::io::MemoryLink) pair, with independent impairment
//! in each direction and optional airtime pacing.

use crate::io::{Impaired, Impairment, MemoryLink, Pacer};
use crate::protocol::airtime::RadioProfile;
use crate::protocol::{SessionConfig, TransferError, TransferHeader, TransferReport, TransferSession};
use bytes::Bytes;
use thiserror::Error;

/// Loopback errors
#[derive(Error, Debug)]
pub enum LoopbackError {
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("The {0} thread panicked")]
    Panicked(&'static str),
}

/// How to run a loopback transfer
#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    /// Session parameters shared by both ends
    pub config: SessionConfig,
    /// Impairment of frames the receiver hears
    pub forward: Impairment,
    /// Impairment of frames the sender hears
    pub reverse: Impairment,
    /// Pace both ends at this preset's airtime
    pub profile: Option<RadioProfile>,
    /// Fraction of real airtime slept when pacing
    pub pace_scale: f64,
    /// Send a header frame before the data
    pub announce: bool,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        LoopbackOptions {
            config: SessionConfig::default(),
            forward: Impairment::none(),
            reverse: Impairment::none(),
            profile: None,
            pace_scale: 1.0,
            announce: false,
        }
    }
}

/// Both ends' view of one loopback transfer
#[derive(Debug)]
pub struct LoopbackOutcome {
    pub sender: TransferReport,
    pub receiver: TransferReport,
    /// Header the receiver accepted, for announced transfers
    pub header: Option<TransferHeader>,
}

impl LoopbackOutcome {
    /// The receiver recovered the exact payload
    pub fn delivered(&self, payload: &[u8]) -> bool {
        self.receiver.complete && self.receiver.payload.as_ref() == payload
    }
}

fn paced(link: MemoryLink, options: &LoopbackOptions) -> MemoryLink {
    match options.profile {
        Some(profile) => {
            link.with_pacer(Pacer::from_profile(profile).with_scale(options.pace_scale))
        }
        None => link,
    }
}

/// Transfer `payload` from one thread to another
pub fn run(payload: Bytes, options: &LoopbackOptions) -> Result<LoopbackOutcome, LoopbackError> {
    options.config.validate().map_err(TransferError::from)?;

    let (sender_end, receiver_end) = MemoryLink::pair();
    let sender_link = Impaired::new(paced(sender_end, options), options.reverse);
    let receiver_link = Impaired::new(paced(receiver_end, options), options.forward);

    let total_bytes = payload.len();
    let announce = options.announce;

    tracing::info!(
        "Loopback transfer of {} bytes, {} mode",
        total_bytes,
        options.config.mode
    );

    crossbeam::thread::scope(|scope| -> Result<LoopbackOutcome, LoopbackError> {
        let receiver = scope.spawn(|_| -> Result<_, TransferError> {
            let span = tracing::info_span!("receiver");
            let mut session = TransferSession::new(receiver_link, options.config.clone(), span)?;
            if announce {
                let (header, report) = session.receive_announced()?;
                Ok((Some(header), report))
            } else {
                Ok((None, session.receive(total_bytes)?))
            }
        });

        let span = tracing::info_span!("sender");
        let sender = TransferSession::new(sender_link, options.config.clone(), span).and_then(
            |mut session| {
                if announce {
                    session.send_announced(payload, 0, 0)
                } else {
                    session.send(payload)
                }
            },
        );

        let received = receiver
            .join()
            .map_err(|_| LoopbackError::Panicked("receiver"))?;
        let (header, receiver) = received?;

        Ok(LoopbackOutcome {
            sender: sender?,
            receiver,
            header,
        })
    })
    .map_err(|_| LoopbackError::Panicked("sender"))?
}
