//! loralink - Reliable transfer over lossy half-duplex radio links
//!
//! High-level Rust API: the protocol core, the link implementations, and a
//! loopback runner that drives both ends of a transfer in one process.

pub use loralink_io as io;
pub use loralink_protocol as protocol;

pub mod loopback;

// Re-export commonly used types
pub use loopback::{LoopbackError, LoopbackOptions, LoopbackOutcome};
pub use protocol::{
    ArqMode, LinkChannel, Received, SessionConfig, TransferError, TransferHeader, TransferReport,
    TransferSession,
};
