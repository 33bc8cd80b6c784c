//! Configuration file support for loralink CLI tools

use loralink_protocol::airtime::RadioProfile;
use loralink_protocol::config::{
    ArqMode, RetryPolicy, SessionConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_ROUNDS, DEFAULT_MTU,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// ARQ discipline as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    /// One frame in flight, per-frame ack
    #[default]
    StopAndWait,
    /// Whole burst, then selective retransmission
    Bulk,
}

impl From<TransferMode> for ArqMode {
    fn from(mode: TransferMode) -> Self {
        match mode {
            TransferMode::StopAndWait => ArqMode::StopAndWait,
            TransferMode::Bulk => ArqMode::BulkSelectiveRepeat,
        }
    }
}

/// Link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Local bind address
    pub bind: SocketAddr,
    /// Remote address; a receiver may leave it out and learn it
    pub peer: Option<SocketAddr>,
    /// Radio preset to pace transmissions at (e.g. "lora-fastest")
    pub profile: Option<String>,
    /// Fraction of real airtime slept when pacing
    #[serde(default = "default_pace_scale")]
    pub pace_scale: f64,
}

fn default_pace_scale() -> f64 {
    1.0
}

/// Protocol parameters
///
/// Both ends must agree on `mode` and `mtu`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_corruption_list_timeout_ms")]
    pub corruption_list_timeout_ms: u64,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_first_frame_timeout_ms")]
    pub first_frame_timeout_ms: u64,
    #[serde(default = "default_inter_frame_timeout_ms")]
    pub inter_frame_timeout_ms: u64,
    #[serde(default = "default_retransmission_timeout_ms")]
    pub retransmission_timeout_ms: u64,
}

fn default_mtu() -> usize {
    DEFAULT_MTU
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_corruption_list_timeout_ms() -> u64 {
    10_000
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

fn default_first_frame_timeout_ms() -> u64 {
    60_000
}

fn default_inter_frame_timeout_ms() -> u64 {
    5_000
}

fn default_retransmission_timeout_ms() -> u64 {
    30_000
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            mode: TransferMode::default(),
            mtu: default_mtu(),
            max_attempts: default_max_attempts(),
            ack_timeout_ms: default_ack_timeout_ms(),
            corruption_list_timeout_ms: default_corruption_list_timeout_ms(),
            max_rounds: default_max_rounds(),
            first_frame_timeout_ms: default_first_frame_timeout_ms(),
            inter_frame_timeout_ms: default_inter_frame_timeout_ms(),
            retransmission_timeout_ms: default_retransmission_timeout_ms(),
        }
    }
}

impl SessionSettings {
    /// Convert to a validated protocol configuration
    pub fn to_session_config(&self) -> Result<SessionConfig, ConfigError> {
        let config = SessionConfig {
            mode: self.mode.into(),
            mtu: self.mtu,
            retry: RetryPolicy::new(self.max_attempts, Duration::from_millis(self.ack_timeout_ms)),
            corruption_list_timeout: Duration::from_millis(self.corruption_list_timeout_ms),
            max_rounds: self.max_rounds,
            first_frame_timeout: Duration::from_millis(self.first_frame_timeout_ms),
            inter_frame_timeout: Duration::from_millis(self.inter_frame_timeout_ms),
            retransmission_timeout: Duration::from_millis(self.retransmission_timeout_ms),
        };

        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }
}

/// Sender configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Input source (file path or "-" for stdin)
    pub input: String,
    /// Announce the payload with a header frame first
    #[serde(default = "default_announce")]
    pub announce: bool,
    /// Width carried in the header (0 for non-image payloads)
    #[serde(default)]
    pub width: u16,
    /// Height carried in the header (0 for non-image payloads)
    #[serde(default)]
    pub height: u16,
}

fn default_announce() -> bool {
    true
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            input: "-".to_string(),
            announce: default_announce(),
            width: 0,
            height: 0,
        }
    }
}

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Output destination (file path or "-" for stdout)
    pub output: String,
    /// Payload size when the sender does not announce one
    pub expected_size: Option<usize>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            output: "-".to_string(),
            expected_size: None,
        }
    }
}

/// Combined configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Link configuration
    pub link: LinkConfig,
    /// Protocol parameters
    #[serde(default)]
    pub session: SessionSettings,
    /// Sender configuration
    pub sender: Option<SenderConfig>,
    /// Receiver configuration
    pub receiver: Option<ReceiverConfig>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create example sender configuration
    pub fn example_sender() -> Self {
        Config {
            link: LinkConfig {
                bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
                peer: Some(SocketAddr::from((Ipv4Addr::LOCALHOST, 9000))),
                profile: Some(RadioProfile::FskHighSpeed.name().to_string()),
                pace_scale: 1.0,
            },
            session: SessionSettings::default(),
            sender: Some(SenderConfig::default()),
            receiver: None,
        }
    }

    /// Create example receiver configuration
    pub fn example_receiver() -> Self {
        Config {
            link: LinkConfig {
                bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9000)),
                peer: None,
                profile: Some(RadioProfile::FskHighSpeed.name().to_string()),
                pace_scale: 1.0,
            },
            session: SessionSettings::default(),
            sender: None,
            receiver: Some(ReceiverConfig::default()),
        }
    }

    /// Validated protocol configuration
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        self.session.to_session_config()
    }

    /// Radio preset named by the link section, if any
    pub fn radio_profile(&self) -> Result<Option<RadioProfile>, ConfigError> {
        self.link.profile.as_deref().map(parse_profile).transpose()
    }
}

/// Look up a radio preset by name
pub fn parse_profile(name: &str) -> Result<RadioProfile, ConfigError> {
    RadioProfile::from_name(name).ok_or_else(|| {
        let known: Vec<_> = RadioProfile::ALL.iter().map(|p| p.name()).collect();
        ConfigError::Invalid(format!(
            "unknown radio profile '{}' (expected one of: {})",
            name,
            known.join(", ")
        ))
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
