//! loralink Receiver - Reliable file transfer over a radio link
//!
//! Waits for a transfer on the UDP radio stand-in and writes the recovered
//! payload to stdout or a file.

use clap::Parser;
use loralink_cli::{display_report, format_bytes, write_output, Config, SessionArgs};
use loralink_io::{Pacer, UdpLink};
use loralink_protocol::TransferSession;
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "loralink-recv")]
#[command(about = "Receive a payload over a loralink radio link", long_about = None)]
struct Args {
    /// Output file (use '-' for stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Only accept frames from this sender
    #[arg(long)]
    peer: Option<SocketAddr>,

    /// Payload size, for senders that do not announce one
    #[arg(short, long)]
    size: Option<usize>,

    /// Keep a partial payload when the transfer is incomplete
    #[arg(long)]
    keep_partial: bool,

    #[command(flatten)]
    session: SessionArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    loralink_cli::init_logging(args.session.verbose);

    tracing::info!("loralink receiver starting...");

    let mut config = args.session.resolve(Config::example_receiver())?;
    if let Some(listen) = args.listen {
        config.link.bind = listen;
    }
    if args.peer.is_some() {
        config.link.peer = args.peer;
    }

    let mut receiver = config.receiver.clone().unwrap_or_default();
    if let Some(output) = args.output {
        receiver.output = output;
    }
    if args.size.is_some() {
        receiver.expected_size = args.size;
    }

    let session_config = config.session_config()?;
    let profile = config.radio_profile()?;

    let mut link = UdpLink::bind(config.link.bind, config.link.peer)?;
    if let Some(profile) = profile {
        link = link.with_pacer(Pacer::from_profile(profile).with_scale(config.link.pace_scale));
    }
    tracing::info!(
        "Listening on {}, {} mode, mtu {}",
        link.local_addr()?,
        session_config.mode,
        session_config.mtu
    );

    let span = tracing::info_span!("recv");
    let mut session = TransferSession::new(link, session_config, span)?;
    let report = match receiver.expected_size {
        Some(size) => session.receive(size)?,
        None => {
            let (header, report) = session.receive_announced()?;
            tracing::info!(
                "Header: {}x{}, {}",
                header.width,
                header.height,
                format_bytes(u64::from(header.total_size))
            );
            report
        }
    };

    display_report(&report, None);

    if report.complete || args.keep_partial {
        write_output(&receiver.output, &report.payload)?;
    }
    if !report.complete {
        anyhow::bail!("Transfer incomplete: {} frames missing", report.missing.len());
    }
    Ok(())
}
