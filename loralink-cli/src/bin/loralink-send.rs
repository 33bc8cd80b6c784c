//! loralink Sender - Reliable file transfer over a radio link
//!
//! Reads a payload from stdin or a file and delivers it to a receiver over
//! the UDP radio stand-in.

use clap::Parser;
use loralink_cli::{display_report, read_input, Config, SessionArgs};
use loralink_io::{Pacer, UdpLink};
use loralink_protocol::airtime::estimate_for;
use loralink_protocol::TransferSession;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "loralink-send")]
#[command(about = "Send a payload over a loralink radio link", long_about = None)]
struct Args {
    /// Input source: file path or '-' for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Receiver address (host:port)
    #[arg(long)]
    peer: Option<SocketAddr>,

    /// Local bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Skip the header frame (the receiver must know the size)
    #[arg(long)]
    no_announce: bool,

    /// Width carried in the header
    #[arg(long)]
    width: Option<u16>,

    /// Height carried in the header
    #[arg(long)]
    height: Option<u16>,

    #[command(flatten)]
    session: SessionArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    loralink_cli::init_logging(args.session.verbose);

    tracing::info!("loralink sender starting...");

    let mut config = args.session.resolve(Config::example_sender())?;
    if let Some(peer) = args.peer {
        config.link.peer = Some(peer);
    }
    if let Some(bind) = args.bind {
        config.link.bind = bind;
    }

    let mut sender = config.sender.clone().unwrap_or_default();
    if let Some(input) = args.input {
        sender.input = input;
    }
    if args.no_announce {
        sender.announce = false;
    }
    sender.width = args.width.unwrap_or(sender.width);
    sender.height = args.height.unwrap_or(sender.height);

    let Some(peer) = config.link.peer else {
        anyhow::bail!("A receiver address is required (use --peer or [link] peer)");
    };

    let session_config = config.session_config()?;
    let profile = config.radio_profile()?;
    let payload = read_input(&sender.input)?;

    let mut link = UdpLink::bind(config.link.bind, Some(peer))?;
    if let Some(profile) = profile {
        tracing::info!("Pacing at {} airtime (scale {})", profile.name(), config.link.pace_scale);
        link = link.with_pacer(Pacer::from_profile(profile).with_scale(config.link.pace_scale));
    }
    tracing::info!(
        "Sending {} bytes to {} from {}, {} mode, mtu {}",
        payload.len(),
        peer,
        link.local_addr()?,
        session_config.mode,
        session_config.mtu
    );

    let estimate = profile
        .and_then(|profile| estimate_for(payload.len(), &session_config, profile, Duration::ZERO));

    let span = tracing::info_span!("send", %peer);
    let mut session = TransferSession::new(link, session_config, span)?;
    let report = if sender.announce {
        session.send_announced(payload, sender.width, sender.height)?
    } else {
        session.send(payload)?
    };

    display_report(&report, estimate.as_ref());

    if !report.complete {
        anyhow::bail!("Transfer incomplete");
    }
    Ok(())
}
