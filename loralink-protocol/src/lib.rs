//! loralink Protocol Core
//!
//! Reliable chunked transfer over a lossy, half-duplex, low-bandwidth radio
//! link. This crate holds the sequence space, wire frames, payload codec,
//! receive-side bookkeeping, the stop-and-wait and bulk selective-repeat
//! ARQ engines, and the time-on-air cost model. All I/O goes through the
//! [`LinkChannel`] trait.

pub mod airtime;
pub mod buffer;
pub mod channel;
pub mod codec;
pub mod config;
pub mod frame;
pub mod pending;
pub mod receiver;
pub mod sender;
pub mod sequence;
pub mod session;
pub mod stats;

pub use airtime::{estimate, CostEstimate, Modulation, RadioProfile};
pub use buffer::{InsertOutcome, ReceiveBuffer};
pub use channel::{LinkChannel, LinkError, LinkEvent, LinkLog, Received, ScriptedLink};
pub use codec::{reassemble, reassemble_partial, split, CodecError, TransferPlan};
pub use config::{ArqMode, ConfigError, RetryPolicy, SessionConfig};
pub use frame::{CorruptionList, Frame, FrameError, ReceiverFrame, SenderFrame, TransferHeader};
pub use pending::PendingSet;
pub use receiver::Receiver;
pub use sender::Sender;
pub use sequence::SeqNumber;
pub use session::{Role, TransferError, TransferReport, TransferSession};
pub use stats::SessionStats;
