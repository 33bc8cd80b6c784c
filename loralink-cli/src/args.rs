//! Command-line flags shared by the binaries

use crate::config::{Config, ConfigError, TransferMode};
use clap::Args;
use std::path::PathBuf;

/// Flags that override the session and link sections of a config file
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// ARQ mode
    #[arg(short, long, value_enum)]
    pub mode: Option<TransferMode>,

    /// Frame size including the sequence byte (2-255)
    #[arg(long)]
    pub mtu: Option<usize>,

    /// Attempts per frame before giving up
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Ack wait per attempt in milliseconds
    #[arg(long)]
    pub ack_timeout_ms: Option<u64>,

    /// Retransmission rounds allowed in bulk mode
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Radio preset to pace transmissions at
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Fraction of real airtime slept when pacing
    #[arg(long)]
    pub pace_scale: Option<f64>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl SessionArgs {
    /// Load the config file, or start from `fallback`, then apply flags
    pub fn resolve(&self, fallback: Config) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => fallback,
        };

        if let Some(mode) = self.mode {
            config.session.mode = mode;
        }
        if let Some(mtu) = self.mtu {
            config.session.mtu = mtu;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.session.max_attempts = max_attempts;
        }
        if let Some(ack_timeout_ms) = self.ack_timeout_ms {
            config.session.ack_timeout_ms = ack_timeout_ms;
        }
        if let Some(max_rounds) = self.max_rounds {
            config.session.max_rounds = max_rounds;
        }
        if let Some(profile) = &self.profile {
            config.link.profile = Some(profile.clone());
        }
        if let Some(pace_scale) = self.pace_scale {
            config.link.pace_scale = pace_scale;
        }

        Ok(config)
    }
}
