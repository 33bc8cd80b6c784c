//! Transfer statistics

use std::time::{Duration, Instant};

/// Session statistics
///
/// Filled in by the sender or receiver while a transfer runs; callers get a
/// finished copy through the transfer report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    /// Payload bytes confirmed delivered (sender) or recovered (receiver)
    pub bytes_delivered: u64,
    /// Data frames transmitted, retransmissions included
    pub frames_sent: u64,
    /// Transmissions beyond the first for any frame
    pub retries: u64,
    /// Retransmission rounds after the initial pass (bulk mode)
    pub rounds: u32,
    /// Time from first byte on the link to delivery or abort
    pub elapsed: Duration,
    /// Intact data frames received
    pub frames_received: u64,
    /// Frames flagged corrupt by the link
    pub corrupt_frames: u64,
    /// Intact frames for a sequence already held
    pub duplicate_frames: u64,
    /// Corruption lists transmitted
    pub corruption_lists_sent: u64,
    /// Receive waits that ended with nothing heard
    pub timeouts: u64,
    /// Duration of the initial pass over all frames
    pub initial_pass: Duration,
    /// Duration of everything after the initial pass
    pub recovery: Duration,
    started: Option<Instant>,
    initial_done: Option<Instant>,
}

impl SessionStats {
    /// Create empty statistics
    pub fn new() -> Self {
        SessionStats::default()
    }

    /// Start the clock (first call wins)
    pub fn mark_started(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    /// Close the initial pass (first call wins)
    pub fn mark_initial_pass_done(&mut self) {
        if let (Some(started), None) = (self.started, self.initial_done) {
            let now = Instant::now();
            self.initial_pass = now.duration_since(started);
            self.initial_done = Some(now);
        }
    }

    /// Stop the clock
    pub fn mark_finished(&mut self) {
        let Some(started) = self.started else {
            return;
        };
        let now = Instant::now();
        self.elapsed = now.duration_since(started);
        match self.initial_done {
            Some(initial_done) => self.recovery = now.duration_since(initial_done),
            None => self.initial_pass = self.elapsed,
        }
    }

    /// Whether any byte has touched the link
    pub fn has_started(&self) -> bool {
        self.started.is_some()
    }

    /// Delivered payload bytes per second of elapsed time
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_delivered as f64 / secs
        } else {
            0.0
        }
    }

    /// Delivered payload bits per second of elapsed time
    pub fn throughput_bps(&self) -> u64 {
        (self.bytes_per_sec() * 8.0) as u64
    }
}
