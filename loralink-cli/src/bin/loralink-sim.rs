//! loralink Simulator - In-process transfer over an impaired link
//!
//! Runs a sender and a receiver on two threads over a lossy in-memory link
//! and prints both reports next to the theoretical airtime cost.

use bytes::Bytes;
use clap::Parser;
use loralink::loopback::{self, LoopbackOptions};
use loralink_cli::{display_report, Config, SessionArgs};
use loralink_io::Impairment;
use loralink_protocol::airtime::estimate_for;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "loralink-sim")]
#[command(about = "Simulate a loralink transfer over an impaired in-process link", long_about = None)]
struct Args {
    /// Payload size in bytes
    #[arg(long, default_value = "10240")]
    size: usize,

    /// Probability a data frame is lost
    #[arg(long, default_value = "0.0")]
    drop: f64,

    /// Probability a data frame is corrupted
    #[arg(long, default_value = "0.0")]
    corrupt: f64,

    /// Probability a reply (ack or list) is lost
    #[arg(long, default_value = "0.0")]
    reverse_drop: f64,

    /// Probability a reply is corrupted
    #[arg(long, default_value = "0.0")]
    reverse_corrupt: f64,

    /// RNG seed for the payload and the impairments
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Announce the payload with a header frame
    #[arg(long)]
    announce: bool,

    /// Multiply every protocol timeout by this factor
    #[arg(long, default_value = "1.0")]
    time_scale: f64,

    #[command(flatten)]
    session: SessionArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    loralink_cli::init_logging(args.session.verbose);

    if !(args.time_scale > 0.0) {
        anyhow::bail!("--time-scale must be positive");
    }

    let config = args.session.resolve(Config::example_sender())?;
    let mut session_config = config.session_config()?;
    session_config.retry.timeout = session_config.retry.timeout.mul_f64(args.time_scale);
    session_config.corruption_list_timeout =
        session_config.corruption_list_timeout.mul_f64(args.time_scale);
    session_config.first_frame_timeout = session_config.first_frame_timeout.mul_f64(args.time_scale);
    session_config.inter_frame_timeout = session_config.inter_frame_timeout.mul_f64(args.time_scale);
    session_config.retransmission_timeout =
        session_config.retransmission_timeout.mul_f64(args.time_scale);
    session_config.validate()?;

    let profile = config.radio_profile()?;
    let estimate =
        profile.and_then(|p| estimate_for(args.size, &session_config, p, Duration::ZERO));

    let mut rng = StdRng::seed_from_u64(args.seed);
    let payload: Bytes = (0..args.size).map(|_| rng.gen::<u8>()).collect::<Vec<_>>().into();

    let options = LoopbackOptions {
        config: session_config,
        forward: Impairment::new(args.drop, args.corrupt, args.seed.wrapping_add(1)),
        reverse: Impairment::new(args.reverse_drop, args.reverse_corrupt, args.seed.wrapping_add(2)),
        profile,
        pace_scale: config.link.pace_scale,
        announce: args.announce,
    };

    tracing::info!(
        "Simulating {} byte transfer, drop {:.2}/{:.2}, corrupt {:.2}/{:.2}",
        args.size,
        args.drop,
        args.reverse_drop,
        args.corrupt,
        args.reverse_corrupt
    );

    let outcome = loopback::run(payload.clone(), &options)?;

    display_report(&outcome.sender, estimate.as_ref());
    display_report(&outcome.receiver, estimate.as_ref());

    if outcome.delivered(&payload) {
        eprintln!("\nPayload verified: {} bytes intact", payload.len());
        Ok(())
    } else {
        anyhow::bail!("Payload not delivered intact")
    }
}
