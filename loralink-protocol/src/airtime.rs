//! Time-on-air and transfer cost estimates
//!
//! Theoretical numbers for planning and for comparing against measured
//! throughput. LoRa timing follows the SX126x datasheet formula; FSK timing
//! counts preamble, sync word, length byte, payload and CRC bits.

use crate::codec::TransferPlan;
use crate::config::{ArqMode, SessionConfig};
use crate::frame::{CorruptionList, SEQ_FIELD_SIZE};
use std::time::Duration;

/// LoRa symbol time above which low data rate optimisation is mandatory
const LDRO_SYMBOL_THRESHOLD_MS: f64 = 16.0;

/// FSK modulation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FskParams {
    /// Bit rate in bits per second
    pub bitrate_bps: f64,
    /// Preamble length in bits
    pub preamble_bits: u32,
    /// Sync word length in bits
    pub sync_bits: u32,
    /// CRC length in bytes (0 when disabled)
    pub crc_bytes: u32,
}

/// LoRa modulation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoraParams {
    /// Spreading factor (5..=12)
    pub spreading_factor: u8,
    /// Bandwidth in Hz
    pub bandwidth_hz: f64,
    /// Coding rate denominator offset: 1 = 4/5 ... 4 = 4/8
    pub coding_rate: u8,
    /// Preamble length in symbols
    pub preamble_symbols: u16,
    /// Explicit header present
    pub explicit_header: bool,
    /// Payload CRC enabled
    pub crc: bool,
}

/// Radio modulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modulation {
    Fsk(FskParams),
    Lora(LoraParams),
}

impl FskParams {
    /// Time on air for a packet carrying `payload_len` bytes
    pub fn time_on_air(&self, payload_len: usize) -> Duration {
        let bits = self.preamble_bits as f64
            + self.sync_bits as f64
            + 8.0
            + payload_len as f64 * 8.0
            + self.crc_bytes as f64 * 8.0;
        Duration::from_secs_f64(bits / self.bitrate_bps)
    }
}

impl LoraParams {
    /// Duration of one symbol
    pub fn symbol_time(&self) -> Duration {
        Duration::from_secs_f64(self.symbol_secs())
    }

    fn symbol_secs(&self) -> f64 {
        f64::from(1u32 << self.spreading_factor) / self.bandwidth_hz
    }

    /// Whether low data rate optimisation applies
    pub fn low_data_rate_optimize(&self) -> bool {
        self.symbol_secs() * 1000.0 >= LDRO_SYMBOL_THRESHOLD_MS
    }

    /// Total symbols for a packet carrying `payload_len` bytes
    pub fn symbol_count(&self, payload_len: usize) -> f64 {
        let sf = f64::from(self.spreading_factor);
        let cr = f64::from(self.coding_rate);
        let crc_bits = if self.crc { 16.0 } else { 0.0 };
        let header_bits = if self.explicit_header { 20.0 } else { 0.0 };
        let payload_bits = payload_len as f64 * 8.0;
        let preamble = f64::from(self.preamble_symbols);

        if self.spreading_factor < 7 {
            let num = (payload_bits + crc_bits - 4.0 * sf + header_bits).max(0.0);
            preamble + 6.25 + 8.0 + (num / (4.0 * sf)).ceil() * (cr + 4.0)
        } else {
            let num = (payload_bits + crc_bits - 4.0 * sf + 8.0 + header_bits).max(0.0);
            let denom = if self.low_data_rate_optimize() {
                4.0 * (sf - 2.0)
            } else {
                4.0 * sf
            };
            preamble + 4.25 + 8.0 + (num / denom).ceil() * (cr + 4.0)
        }
    }

    /// Time on air for a packet carrying `payload_len` bytes
    pub fn time_on_air(&self, payload_len: usize) -> Duration {
        Duration::from_secs_f64(self.symbol_count(payload_len) * self.symbol_secs())
    }
}

impl Modulation {
    /// Time on air for a packet carrying `payload_len` bytes
    pub fn time_on_air(&self, payload_len: usize) -> Duration {
        match self {
            Modulation::Fsk(params) => params.time_on_air(payload_len),
            Modulation::Lora(params) => params.time_on_air(payload_len),
        }
    }

    /// Raw modulation bit rate, before framing overhead
    pub fn raw_bitrate_bps(&self) -> f64 {
        match self {
            Modulation::Fsk(params) => params.bitrate_bps,
            Modulation::Lora(params) => {
                let sf = f64::from(params.spreading_factor);
                let cr = 4.0 / (4.0 + f64::from(params.coding_rate));
                sf * cr / params.symbol_secs()
            }
        }
    }
}

/// Modulation presets used on the bench
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadioProfile {
    /// FSK at 200 kbps, 16 bit preamble and sync, 2 byte CRC
    FskHighSpeed,
    /// FSK at 50 kbps
    FskStandard,
    /// LoRa SF5, 500 kHz, CR 4/5
    LoraFastest,
    /// LoRa SF7, 125 kHz, CR 4/5
    LoraBalanced,
    /// LoRa SF12, 125 kHz, CR 4/5
    LoraLongRange,
}

impl RadioProfile {
    /// All presets
    pub const ALL: [RadioProfile; 5] = [
        RadioProfile::FskHighSpeed,
        RadioProfile::FskStandard,
        RadioProfile::LoraFastest,
        RadioProfile::LoraBalanced,
        RadioProfile::LoraLongRange,
    ];

    /// Modulation parameters for this preset
    pub fn modulation(self) -> Modulation {
        match self {
            RadioProfile::FskHighSpeed => Modulation::Fsk(FskParams {
                bitrate_bps: 200_000.0,
                preamble_bits: 16,
                sync_bits: 16,
                crc_bytes: 2,
            }),
            RadioProfile::FskStandard => Modulation::Fsk(FskParams {
                bitrate_bps: 50_000.0,
                preamble_bits: 32,
                sync_bits: 16,
                crc_bytes: 2,
            }),
            RadioProfile::LoraFastest => Modulation::Lora(lora(5, 500_000.0)),
            RadioProfile::LoraBalanced => Modulation::Lora(lora(7, 125_000.0)),
            RadioProfile::LoraLongRange => Modulation::Lora(lora(12, 125_000.0)),
        }
    }

    /// Stable name used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            RadioProfile::FskHighSpeed => "fsk-high-speed",
            RadioProfile::FskStandard => "fsk-standard",
            RadioProfile::LoraFastest => "lora-fastest",
            RadioProfile::LoraBalanced => "lora-balanced",
            RadioProfile::LoraLongRange => "lora-long-range",
        }
    }

    /// Look up a preset by name
    pub fn from_name(name: &str) -> Option<Self> {
        RadioProfile::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Time on air for a packet carrying `payload_len` bytes
    pub fn time_on_air(self, payload_len: usize) -> Duration {
        self.modulation().time_on_air(payload_len)
    }
}

fn lora(spreading_factor: u8, bandwidth_hz: f64) -> LoraParams {
    LoraParams {
        spreading_factor,
        bandwidth_hz,
        coding_rate: 1,
        preamble_symbols: 8,
        explicit_header: true,
        crc: true,
    }
}

/// Theoretical cost of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CostEstimate {
    /// Airtime of every data frame transmission
    pub data_airtime: Duration,
    /// Airtime of acks or corruption lists
    pub control_airtime: Duration,
    /// Link direction changes (one per round trip)
    pub round_trips: u32,
    /// Per-turnaround processing allowance, summed
    pub processing: Duration,
}

impl CostEstimate {
    /// Estimated wall-clock time
    pub fn total(&self) -> Duration {
        self.data_airtime + self.control_airtime + self.processing
    }

    /// Estimated payload throughput in bits per second
    pub fn throughput_bps(&self, plan: &TransferPlan) -> u64 {
        let secs = self.total().as_secs_f64();
        if secs > 0.0 {
            (plan.total_bytes() as f64 * 8.0 / secs) as u64
        } else {
            0
        }
    }
}

/// Estimate the loss-free cost of moving `plan` in `mode`
///
/// Stop-and-wait costs one round trip per frame: data airtime, processing,
/// and a one-byte ack. Bulk mode costs one burst and one empty corruption
/// list regardless of the frame count. `processing` is the allowance for
/// each link turnaround.
pub fn estimate(
    plan: &TransferPlan,
    mode: ArqMode,
    profile: RadioProfile,
    processing: Duration,
) -> CostEstimate {
    let modulation = profile.modulation();
    let data_airtime = plan
        .sequences()
        .map(|seq| modulation.time_on_air(SEQ_FIELD_SIZE + plan.frame_len(seq)))
        .sum::<Duration>();
    let frames = plan.frame_count() as u32;

    match mode {
        ArqMode::StopAndWait => CostEstimate {
            data_airtime,
            control_airtime: modulation.time_on_air(SEQ_FIELD_SIZE) * frames,
            round_trips: frames,
            processing: processing * frames,
        },
        ArqMode::BulkSelectiveRepeat => CostEstimate {
            data_airtime,
            control_airtime: modulation.time_on_air(CorruptionList::default().to_bytes().len()),
            round_trips: 1,
            processing,
        },
    }
}

/// Estimate using the MTU and mode of a session configuration
pub fn estimate_for(
    total_bytes: usize,
    config: &SessionConfig,
    profile: RadioProfile,
    processing: Duration,
) -> Option<CostEstimate> {
    let plan = TransferPlan::new(total_bytes, config.mtu).ok()?;
    Some(estimate(&plan, config.mode, profile, processing))
}
