//! Report display and formatting
//!
//! Reports go to stderr so a payload can be written to stdout.

use loralink_protocol::airtime::CostEstimate;
use loralink_protocol::session::{Role, TransferReport};
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;

    if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else if secs > 0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Label/value rows summarising a report
pub fn report_rows(report: &TransferReport, estimate: Option<&CostEstimate>) -> Vec<(String, String)> {
    let stats = &report.stats;
    let mut rows = vec![
        ("Mode".to_string(), report.mode.to_string()),
        (
            "Data size".to_string(),
            format!(
                "{} of {}",
                format_bytes(stats.bytes_delivered),
                format_bytes(report.total_bytes)
            ),
        ),
    ];

    match report.role {
        Role::Sender => {
            rows.push(("Frames sent".to_string(), stats.frames_sent.to_string()));
            rows.push(("Retransmitted".to_string(), stats.retries.to_string()));
        }
        Role::Receiver => {
            rows.push(("Frames received".to_string(), stats.frames_received.to_string()));
            rows.push(("Corrupted".to_string(), stats.corrupt_frames.to_string()));
            rows.push(("Duplicates".to_string(), stats.duplicate_frames.to_string()));
        }
    }

    if stats.rounds > 0 {
        rows.push(("Rounds".to_string(), stats.rounds.to_string()));
    }
    if !report.missing.is_empty() {
        rows.push(("Missing frames".to_string(), report.missing.len().to_string()));
    }

    rows.push(("Initial pass".to_string(), format_duration(stats.initial_pass)));
    rows.push(("Recovery".to_string(), format_duration(stats.recovery)));
    rows.push(("Total time".to_string(), format_duration(stats.elapsed)));
    rows.push((
        "Data rate".to_string(),
        format_bandwidth(stats.throughput_bps()),
    ));

    if let Some(estimate) = estimate {
        rows.push((
            "Theoretical time".to_string(),
            format_duration(estimate.total()),
        ));
    }

    rows
}

/// Display a transfer report as a boxed summary
pub fn display_report(report: &TransferReport, estimate: Option<&CostEstimate>) {
    let title = match (report.complete, report.role) {
        (true, Role::Sender) if !report.receiver_confirmed => "TRANSMISSION COMPLETE (UNCONFIRMED)",
        (true, _) => "TRANSMISSION COMPLETE",
        (false, _) => "TRANSMISSION INCOMPLETE",
    };

    eprintln!("\n┌─────────────────────────────────────────────────────────────┐");
    eprintln!("│ {:<59} │", title);
    eprintln!("├─────────────────────────────────────────────────────────────┤");
    for (label, value) in report_rows(report, estimate) {
        eprintln!("│ {:<18} {:<40} │", format!("{}:", label), value);
    }
    if let Some(failure) = &report.failure {
        eprintln!("├─────────────────────────────────────────────────────────────┤");
        eprintln!("│ {:<59} │", failure.to_string());
    }
    eprintln!("└─────────────────────────────────────────────────────────────┘");
}

/// Display a report on one line
pub fn display_compact_report(report: &TransferReport) {
    let stats = &report.stats;
    eprintln!(
        "[{:?}] {} | {}/{} | {} | frames {} | retries {} | rounds {}",
        report.role,
        if report.complete { "complete" } else { "incomplete" },
        format_bytes(stats.bytes_delivered),
        format_bytes(report.total_bytes),
        format_bandwidth(stats.throughput_bps()),
        stats.frames_sent.max(stats.frames_received),
        stats.retries,
        stats.rounds
    );
}
