//! loralink CLI Library
//!
//! Shared functionality for loralink command-line tools.

pub mod args;
pub mod config;
pub mod payload;
pub mod stats;

pub use args::SessionArgs;
pub use config::{Config, ConfigError, LinkConfig, ReceiverConfig, SenderConfig, SessionSettings, TransferMode};
pub use payload::{read_input, write_output};
pub use stats::{display_compact_report, display_report, format_bandwidth, format_bytes, format_duration};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
