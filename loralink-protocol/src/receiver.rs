//! Inbound transfer
//!
//! `WAITING_FIRST_FRAME -> ACCUMULATING -> tail`, where the tail depends on
//! the ARQ mode:
//!
//! * stop-and-wait acks every intact frame, duplicates included, then
//!   lingers after the last frame to re-ack retransmissions whose ack was
//!   lost
//! * bulk selective repeat ends each burst on silence, answers with a
//!   corruption list of the pending sequences, and collects retransmissions
//!   until nothing is pending or the round budget is spent

use crate::buffer::{InsertOutcome, ReceiveBuffer};
use crate::channel::{LinkChannel, Received};
use crate::codec::TransferPlan;
use crate::config::{ArqMode, SessionConfig};
use crate::frame::{Frame, ReceiverFrame, SenderFrame, TransferHeader};
use crate::pending::PendingSet;
use crate::sequence::SeqNumber;
use crate::session::{Role, TransferError, TransferReport};
use crate::stats::SessionStats;
use std::time::{Duration, Instant};
use tracing::Span;

/// What one receive contributed to the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Heard {
    /// A new frame of the plan was stored
    Stored(SeqNumber),
    /// A frame already held arrived again
    Duplicate(SeqNumber),
    /// A frame failed the link check; the sequence byte is kept if plausible
    Corrupt(Option<SeqNumber>),
    /// Intact but unusable: out of plan, oversized, or not a data frame
    Noise,
    /// Nothing before the deadline
    Silence,
}

/// Transfer receiver
pub struct Receiver<'a, C: LinkChannel + ?Sized> {
    link: &'a mut C,
    config: &'a SessionConfig,
    span: Span,
    stats: SessionStats,
    buffer: ReceiveBuffer,
    /// A header ack was sent; repeated headers are re-acked
    header_acked: bool,
}

impl<'a, C: LinkChannel + ?Sized> Receiver<'a, C> {
    /// Create a receiver over `link`; events are logged inside `span`
    pub fn new(link: &'a mut C, config: &'a SessionConfig, span: Span) -> Self {
        Receiver {
            link,
            config,
            span,
            stats: SessionStats::new(),
            buffer: ReceiveBuffer::new(),
            header_acked: false,
        }
    }

    /// Wait for a transfer header and acknowledge it
    pub fn await_header(&mut self) -> Result<TransferHeader, TransferError> {
        let _enter = self.span.clone().entered();
        let timeout = self.config.first_frame_timeout;
        let deadline = Instant::now() + timeout;
        let mut heard_corrupt = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let received = if remaining.is_zero() {
                Received::Timeout
            } else {
                self.link.recv(remaining)
            };

            match received {
                Received::Ok(bytes) => match SenderFrame::decode(&bytes) {
                    Ok(SenderFrame::Header(header)) => {
                        self.stats.mark_started();
                        self.link.send(&ReceiverFrame::HeaderAck.to_bytes())?;
                        self.header_acked = true;
                        tracing::info!(
                            "Header received: {}x{}, {} bytes",
                            header.width,
                            header.height,
                            header.total_size
                        );
                        return Ok(header);
                    }
                    other => tracing::debug!("Ignoring {:?} while waiting for header", other),
                },
                Received::Corrupt(_) => {
                    heard_corrupt = true;
                    self.stats.corrupt_frames += 1;
                    tracing::warn!("Corrupted frame while waiting for header");
                }
                Received::Timeout => {
                    self.stats.timeouts += 1;
                    return Err(if heard_corrupt {
                        TransferError::LinkCorruption
                    } else {
                        TransferError::LinkTimeout(timeout)
                    });
                }
            }
        }
    }

    /// Receive the transfer described by `plan`
    pub fn receive(mut self, plan: &TransferPlan) -> TransferReport {
        let _enter = self.span.clone().entered();
        tracing::info!(
            "Receiving {} bytes in {} frames ({})",
            plan.total_bytes(),
            plan.frame_count(),
            self.config.mode
        );

        let failure = match self.config.mode {
            ArqMode::StopAndWait => self.receive_stop_and_wait(plan),
            ArqMode::BulkSelectiveRepeat => self.receive_bulk(plan),
        };
        self.stats.mark_finished();
        self.finish(plan, failure)
    }

    fn finish(self, plan: &TransferPlan, failure: Option<TransferError>) -> TransferReport {
        let mut report = TransferReport::new(Role::Receiver, self.config.mode, self.stats);
        report.total_bytes = plan.total_bytes() as u64;
        report.missing = plan
            .sequences()
            .filter(|seq| !self.buffer.contains(*seq))
            .collect();
        report.stats.bytes_delivered = self.buffer.bytes_in_plan(plan) as u64;

        match self.buffer.reassemble(plan) {
            Ok(payload) => {
                report.payload = payload;
                report.complete = true;
                report.receiver_confirmed = true;
            }
            Err(_) => {
                report.payload = self.buffer.reassemble_partial(plan);
                report.failure = Some(failure.unwrap_or(TransferError::IncompleteTransfer {
                    missing: report.missing.len(),
                    delivered: report.stats.bytes_delivered,
                    total: report.total_bytes,
                }));
            }
        }

        tracing::info!(
            "Receive finished: complete={}, {} of {} frames, {} corrupted, {} duplicates",
            report.complete,
            plan.frame_count() - report.missing.len(),
            plan.frame_count(),
            report.stats.corrupt_frames,
            report.stats.duplicate_frames
        );
        report
    }

    /// Receive one frame and account for it
    fn hear(&mut self, plan: &TransferPlan, timeout: Duration) -> Heard {
        match self.link.recv(timeout) {
            Received::Ok(bytes) => match SenderFrame::decode(&bytes) {
                Ok(SenderFrame::Data(frame)) => {
                    if !plan.contains(frame.seq) {
                        tracing::warn!("Frame {} is outside the transfer", frame.seq);
                        return Heard::Noise;
                    }
                    if let Err(e) = plan.check_frame(&frame) {
                        tracing::warn!("Dropping frame {}: {}", frame.seq, e);
                        return Heard::Noise;
                    }

                    self.stats.mark_started();
                    let len = frame.payload.len();
                    match self.buffer.insert(frame.seq, frame.payload) {
                        InsertOutcome::Stored => {
                            self.stats.frames_received += 1;
                            tracing::debug!("Stored frame {} ({} bytes)", frame.seq, len);
                            Heard::Stored(frame.seq)
                        }
                        InsertOutcome::Duplicate => {
                            self.stats.duplicate_frames += 1;
                            tracing::debug!("Duplicate frame {}", frame.seq);
                            Heard::Duplicate(frame.seq)
                        }
                    }
                }
                Ok(SenderFrame::Header(_)) => {
                    if self.header_acked {
                        tracing::debug!("Header repeated, re-acknowledging");
                        self.reply(ReceiverFrame::HeaderAck);
                    }
                    Heard::Noise
                }
                Err(e) => {
                    tracing::warn!("Undecodable frame: {}", e);
                    Heard::Noise
                }
            },
            Received::Corrupt(bytes) => {
                self.stats.mark_started();
                self.stats.corrupt_frames += 1;
                match Frame::peek_seq(&bytes).filter(|seq| plan.contains(*seq)) {
                    Some(seq) => {
                        tracing::warn!("Frame {} corrupted", seq);
                        Heard::Corrupt(Some(seq))
                    }
                    None => {
                        tracing::warn!("Corrupted frame of {} bytes", bytes.len());
                        Heard::Corrupt(None)
                    }
                }
            }
            Received::Timeout => {
                self.stats.timeouts += 1;
                Heard::Silence
            }
        }
    }

    /// Send a control frame; a lost reply is recovered by the sender's retry
    fn reply(&mut self, frame: ReceiverFrame) -> bool {
        match self.link.send(&frame.to_bytes()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send {:?}: {}", frame, e);
                false
            }
        }
    }

    /// Failure to report when nothing usable arrived during the first wait
    fn first_wait_failure(&self) -> TransferError {
        if self.stats.corrupt_frames > 0 {
            TransferError::LinkCorruption
        } else {
            TransferError::LinkTimeout(self.config.first_frame_timeout)
        }
    }

    fn receive_stop_and_wait(&mut self, plan: &TransferPlan) -> Option<TransferError> {
        // Longest silence while the sender still retries one frame
        let idle = self.config.retry.timeout * self.config.retry.max_attempts
            + self.config.inter_frame_timeout;
        let mut timeout = self.config.first_frame_timeout;

        while !self.buffer.is_complete(plan) {
            match self.hear(plan, timeout) {
                Heard::Stored(seq) | Heard::Duplicate(seq) => {
                    self.reply(ReceiverFrame::Ack(seq));
                    timeout = idle;
                }
                Heard::Silence => {
                    if self.buffer.is_empty() {
                        return Some(self.first_wait_failure());
                    }
                    tracing::warn!(
                        "Sender silent for {:?} with {} of {} frames held",
                        timeout,
                        self.buffer.len(),
                        plan.frame_count()
                    );
                    return None;
                }
                Heard::Corrupt(_) | Heard::Noise => {}
            }
        }
        self.stats.mark_initial_pass_done();

        self.linger(plan);
        None
    }

    /// Re-ack retransmissions whose ack was lost
    ///
    /// The window restarts after each re-ack and spans two ack timeouts, so
    /// a retransmission sent one timeout after the original still lands
    /// inside it.
    fn linger(&mut self, plan: &TransferPlan) {
        if plan.frame_count() == 0 {
            return;
        }

        let window = self.config.retry.timeout * 2;
        let mut deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match self.hear(plan, remaining) {
                Heard::Silence => return,
                Heard::Stored(seq) | Heard::Duplicate(seq) => {
                    tracing::debug!("Re-acknowledging frame {}", seq);
                    self.reply(ReceiverFrame::Ack(seq));
                    deadline = Instant::now() + window;
                }
                Heard::Corrupt(_) | Heard::Noise => {}
            }
        }
    }

    fn receive_bulk(&mut self, plan: &TransferPlan) -> Option<TransferError> {
        let mut pending = PendingSet::full(plan);

        if plan.frame_count() > 0 {
            self.collect_burst(plan, &mut pending, self.config.first_frame_timeout);
            if !self.stats.has_started() {
                return Some(self.first_wait_failure());
            }
        }
        self.stats.mark_initial_pass_done();

        loop {
            pending.settle(&self.buffer);
            let list = pending.corruption_list(self.config.mtu);
            tracing::info!(
                "Round {}: {} frames pending, {} corrupted, requesting {}",
                self.stats.rounds,
                pending.len(),
                pending.corrupted_count(),
                list.len()
            );
            if self.reply(ReceiverFrame::CorruptionList(list)) {
                self.stats.corruption_lists_sent += 1;
            }

            if pending.is_empty() {
                return None;
            }
            if self.stats.rounds >= self.config.max_rounds {
                tracing::warn!(
                    "Round budget of {} spent with {} frames missing",
                    self.config.max_rounds,
                    pending.len()
                );
                return None;
            }

            self.stats.rounds += 1;
            self.collect_burst(plan, &mut pending, self.config.retransmission_timeout);
        }
    }

    /// Collect frames until the burst goes quiet or every frame is held
    fn collect_burst(&mut self, plan: &TransferPlan, pending: &mut PendingSet, first_wait: Duration) {
        let mut timeout = first_wait;

        while !self.buffer.is_complete(plan) {
            match self.hear(plan, timeout) {
                Heard::Silence => return,
                Heard::Stored(seq) | Heard::Duplicate(seq) => {
                    pending.remove(seq);
                }
                Heard::Corrupt(Some(seq)) => {
                    pending.mark_corrupted(seq);
                }
                Heard::Corrupt(None) | Heard::Noise => {}
            }
            timeout = self.config.inter_frame_timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ScriptedLink;
    use crate::codec;
    use crate::config::RetryPolicy;
    use crate::frame::CorruptionList;
    use crate::sequence::SeqNumber;
    use bytes::Bytes;

    fn pattern(len: usize) -> Bytes {
        (0..len).map(|i| (i * 13 % 256) as u8).collect::<Vec<_>>().into()
    }

    fn frames_of(payload: &Bytes, mtu: usize) -> Vec<Bytes> {
        codec::split(payload, mtu)
            .unwrap()
            .iter()
            .map(|f| f.to_bytes().freeze())
            .collect()
    }

    fn quick_config(mode: ArqMode) -> SessionConfig {
        SessionConfig {
            retry: RetryPolicy::new(5, Duration::from_millis(20)),
            ..SessionConfig::with_mode(mode)
        }
    }

    #[test]
    fn test_stop_and_wait_acks_every_frame() {
        let payload = pattern(1000);
        let mut link = ScriptedLink::replay(frames_of(&payload, 254).into_iter().map(Received::Ok));
        let log = link.log();
        let config = quick_config(ArqMode::StopAndWait);
        let plan = TransferPlan::new(1000, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(report.complete);
        assert_eq!(report.payload, payload);
        assert_eq!(report.stats.bytes_delivered, 1000);

        let acks: Vec<Bytes> = log.sent();
        assert_eq!(acks, (0u8..4).map(|s| Bytes::from(vec![s])).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_and_wait_does_not_ack_corrupt_frames() {
        let payload = pattern(500);
        let frames = frames_of(&payload, 254);
        let mut link = ScriptedLink::replay(vec![
            Received::Ok(frames[0].clone()),
            Received::Corrupt(frames[1].clone()),
            Received::Ok(frames[1].clone()),
        ]);
        let log = link.log();
        let config = quick_config(ArqMode::StopAndWait);
        let plan = TransferPlan::new(500, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(report.complete);
        assert_eq!(report.stats.corrupt_frames, 1);
        assert_eq!(log.sent(), vec![Bytes::from_static(&[0]), Bytes::from_static(&[1])]);
    }

    #[test]
    fn test_stop_and_wait_reacks_duplicates_while_lingering() {
        let payload = pattern(300);
        let frames = frames_of(&payload, 254);
        let mut link = ScriptedLink::replay(vec![
            Received::Ok(frames[0].clone()),
            Received::Ok(frames[1].clone()),
            Received::Ok(frames[1].clone()),
        ]);
        let log = link.log();
        let config = quick_config(ArqMode::StopAndWait);
        let plan = TransferPlan::new(300, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(report.complete);
        assert_eq!(report.stats.duplicate_frames, 1);
        assert_eq!(log.sent_count(), 3);
    }

    #[test]
    fn test_stop_and_wait_partial_on_silence() {
        let payload = pattern(1000);
        let frames = frames_of(&payload, 254);
        let mut link = ScriptedLink::replay(vec![
            Received::Ok(frames[0].clone()),
            Received::Ok(frames[1].clone()),
        ]);
        let config = quick_config(ArqMode::StopAndWait);
        let plan = TransferPlan::new(1000, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(!report.complete);
        assert_eq!(report.payload, payload.slice(..506));
        assert_eq!(report.missing, vec![SeqNumber::new(2), SeqNumber::new(3)]);
        assert!(matches!(
            report.failure,
            Some(TransferError::IncompleteTransfer { missing: 2, .. })
        ));
    }

    #[test]
    fn test_first_frame_timeout() {
        let mut link = ScriptedLink::silent();
        let config = quick_config(ArqMode::BulkSelectiveRepeat);
        let plan = TransferPlan::new(1000, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(!report.complete);
        assert!(matches!(report.failure, Some(TransferError::LinkTimeout(_))));
        assert_eq!(link.log().sent_count(), 0);
    }

    #[test]
    fn test_bulk_requests_missing_and_corrupt() {
        let payload = pattern(1200);
        let frames = frames_of(&payload, 254);
        let retransmit = frames.clone();
        let mut link = ScriptedLink::new(move |sent| {
            let list = match ReceiverFrame::decode(sent) {
                Ok(ReceiverFrame::CorruptionList(list)) => list,
                _ => return Vec::new(),
            };
            list.seqs
                .iter()
                .map(|seq| Received::Ok(retransmit[seq.index()].clone()))
                .collect()
        });
        // Burst: frame 1 lost, frame 3 corrupted
        link.push(Received::Ok(frames[0].clone()));
        link.push(Received::Ok(frames[2].clone()));
        link.push(Received::Corrupt(frames[3].clone()));
        link.push(Received::Ok(frames[4].clone()));
        let log = link.log();
        let config = quick_config(ArqMode::BulkSelectiveRepeat);
        let plan = TransferPlan::new(1200, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(report.complete);
        assert_eq!(report.payload, payload);
        assert_eq!(report.stats.rounds, 1);
        assert_eq!(report.stats.corruption_lists_sent, 2);

        let lists: Vec<CorruptionList> = log
            .sent()
            .iter()
            .map(|b| CorruptionList::from_bytes(b).unwrap())
            .collect();
        assert_eq!(lists[0].seqs, vec![SeqNumber::new(1), SeqNumber::new(3)]);
        assert!(lists[1].is_empty());
    }

    #[test]
    fn test_bulk_short_frame_stays_pending() {
        let payload = pattern(600);
        let frames = frames_of(&payload, 254);
        let retransmit = frames.clone();
        let mut link = ScriptedLink::new(move |sent| match ReceiverFrame::decode(sent) {
            Ok(ReceiverFrame::CorruptionList(list)) => list
                .seqs
                .iter()
                .map(|seq| Received::Ok(retransmit[seq.index()].clone()))
                .collect(),
            _ => Vec::new(),
        });
        // Intact checksum, but frame 0 carries 10 bytes instead of 253
        link.push(Received::Ok(frames[0].slice(..11)));
        link.push(Received::Ok(frames[1].clone()));
        link.push(Received::Ok(frames[2].clone()));
        let log = link.log();
        let config = quick_config(ArqMode::BulkSelectiveRepeat);
        let plan = TransferPlan::new(600, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(report.complete);
        assert_eq!(report.payload, payload);
        assert_eq!(report.stats.bytes_delivered, 600);

        let first = CorruptionList::from_bytes(&log.sent()[0]).unwrap();
        assert_eq!(first.seqs, vec![SeqNumber::new(0)]);
    }

    #[test]
    fn test_bulk_pending_shrinks_monotonically() {
        let payload = pattern(2000);
        let frames = frames_of(&payload, 254);
        let frame_count = frames.len();
        let retransmit = frames.clone();
        // Each round only the lowest requested frame gets through
        let mut link = ScriptedLink::new(move |sent| match ReceiverFrame::decode(sent) {
            Ok(ReceiverFrame::CorruptionList(list)) => list
                .seqs
                .first()
                .map(|seq| Received::Ok(retransmit[seq.index()].clone()))
                .into_iter()
                .collect(),
            _ => Vec::new(),
        });
        link.push(Received::Ok(frames[0].clone()));
        for frame in &frames[4..] {
            link.push(Received::Ok(frame.clone()));
        }
        let log = link.log();
        let config = quick_config(ArqMode::BulkSelectiveRepeat);
        let plan = TransferPlan::new(2000, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);

        let sizes: Vec<usize> = log
            .sent()
            .iter()
            .map(|b| CorruptionList::from_bytes(b).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 2, 1, 0]);
        assert!(sizes.windows(2).all(|w| w[1] <= w[0]));
        assert!(report.complete);
        assert_eq!(report.stats.rounds, 3);
        assert_eq!(report.stats.frames_received as usize, frame_count);
    }

    #[test]
    fn test_bulk_budget_exhausted_returns_partial() {
        let payload = pattern(1000);
        let frames = frames_of(&payload, 254);
        let mut link = ScriptedLink::replay(vec![
            Received::Ok(frames[0].clone()),
            Received::Ok(frames[1].clone()),
            Received::Ok(frames[3].clone()),
        ]);
        let log = link.log();
        let config = quick_config(ArqMode::BulkSelectiveRepeat);
        let plan = TransferPlan::new(1000, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(!report.complete);
        assert_eq!(report.stats.rounds, 3);
        assert_eq!(log.sent_count(), 4);
        assert_eq!(report.payload, payload.slice(..506));
        assert_eq!(report.stats.bytes_delivered, 1000 - 253);
    }

    #[test]
    fn test_header_then_data() {
        let payload = pattern(300);
        let mut frames: Vec<Received> = vec![Received::Ok(
            TransferHeader::new(8, 4, 300).to_bytes().freeze(),
        )];
        frames.extend(frames_of(&payload, 254).into_iter().map(Received::Ok));
        let mut link = ScriptedLink::replay(frames);
        let log = link.log();
        let config = quick_config(ArqMode::StopAndWait);

        let mut receiver = Receiver::new(&mut link, &config, Span::none());
        let header = receiver.await_header().unwrap();
        assert_eq!(header, TransferHeader::new(8, 4, 300));

        let plan = TransferPlan::new(header.total_size as usize, 254).unwrap();
        let report = receiver.receive(&plan);
        assert!(report.complete);
        assert_eq!(log.sent()[0], Bytes::from_static(&[0xFF]));
    }

    #[test]
    fn test_empty_bulk_transfer_sends_empty_list() {
        let mut link = ScriptedLink::silent();
        let log = link.log();
        let config = quick_config(ArqMode::BulkSelectiveRepeat);
        let plan = TransferPlan::new(0, 254).unwrap();

        let report = Receiver::new(&mut link, &config, Span::none()).receive(&plan);
        assert!(report.complete);
        assert_eq!(log.sent(), vec![Bytes::from_static(&[0xFF, 0])]);
    }
}
