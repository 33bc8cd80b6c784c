//! loralink I/O and Link Emulation
//!
//! Concrete [`LinkChannel`](loralink_protocol::LinkChannel) implementations:
//! a UDP transport that stands in for the radio, an in-process channel pair
//! for tests, an impairment wrapper that drops and corrupts frames, and an
//! airtime pacer that makes either of them as slow as a real modulation.

pub mod impair;
pub mod memory;
pub mod socket;
pub mod time;

pub use impair::{ImpairStats, Impaired, Impairment};
pub use memory::MemoryLink;
pub use socket::{RadioSocket, SocketError, UdpLink};
pub use time::{Pacer, Timestamp};
