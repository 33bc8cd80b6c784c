//! Outbound transfer
//!
//! Two ARQ disciplines share one sender:
//!
//! * stop-and-wait: `SEND -> WAIT_ACK -> {ADVANCE | RETRY | ABORT}` per
//!   frame, never more than one frame in flight
//! * bulk selective repeat: burst every frame, then retransmit exactly the
//!   sequences named by the receiver's corruption list, for a bounded number
//!   of rounds

use crate::channel::{LinkChannel, Received};
use crate::codec::{self, TransferPlan};
use crate::config::{ArqMode, SessionConfig};
use crate::frame::{CorruptionList, Frame, ReceiverFrame, TransferHeader};
use crate::session::{Role, TransferError, TransferReport};
use crate::sequence::SeqNumber;
use crate::stats::SessionStats;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::Span;

/// Result of waiting for the corruption list after a burst
enum ListWait {
    List(CorruptionList),
    Silence,
}

/// Transfer sender
pub struct Sender<'a, C: LinkChannel + ?Sized> {
    link: &'a mut C,
    config: &'a SessionConfig,
    span: Span,
    stats: SessionStats,
}

impl<'a, C: LinkChannel + ?Sized> Sender<'a, C> {
    /// Create a sender over `link`; events are logged inside `span`
    pub fn new(link: &'a mut C, config: &'a SessionConfig, span: Span) -> Self {
        Sender {
            link,
            config,
            span,
            stats: SessionStats::new(),
        }
    }

    /// Announce the transfer and wait for the header ack
    ///
    /// Retried under the same policy as stop-and-wait data frames.
    pub fn announce(&mut self, header: TransferHeader) -> Result<(), TransferError> {
        let _enter = self.span.enter();
        let bytes = header.to_bytes();
        let policy = self.config.retry;

        for attempt in 1..=policy.max_attempts {
            self.stats.mark_started();
            if let Err(e) = self.link.send(&bytes) {
                tracing::warn!("Header send failed (attempt {}): {}", attempt, e);
                continue;
            }

            match self.link.recv(policy.timeout) {
                Received::Ok(reply) => match ReceiverFrame::decode(&reply) {
                    Ok(ReceiverFrame::HeaderAck) => {
                        tracing::info!(
                            "Header acknowledged: {}x{}, {} bytes",
                            header.width,
                            header.height,
                            header.total_size
                        );
                        return Ok(());
                    }
                    other => tracing::warn!("Unexpected reply to header: {:?}", other),
                },
                Received::Corrupt(_) => {
                    self.stats.corrupt_frames += 1;
                    tracing::warn!("Corrupted header ack (attempt {})", attempt);
                }
                Received::Timeout => {
                    self.stats.timeouts += 1;
                    tracing::warn!("Header ack timeout (attempt {})", attempt);
                }
            }
        }

        Err(TransferError::HeaderNotAcknowledged {
            attempts: policy.max_attempts,
        })
    }

    /// Send `payload` using the configured ARQ mode
    ///
    /// Returns an error only when the payload cannot be framed.
    pub fn send(mut self, payload: Bytes) -> Result<TransferReport, TransferError> {
        let _enter = self.span.clone().entered();
        let plan = TransferPlan::new(payload.len(), self.config.mtu)?;
        let frames = codec::split(&payload, self.config.mtu)?;

        tracing::info!(
            "Sending {} bytes in {} frames ({})",
            plan.total_bytes(),
            plan.frame_count(),
            self.config.mode
        );

        let mut report = match self.config.mode {
            ArqMode::StopAndWait => self.send_stop_and_wait(&plan, &frames, &payload),
            ArqMode::BulkSelectiveRepeat => self.send_bulk(&plan, &frames, &payload),
        };

        report.stats.mark_finished();
        tracing::info!(
            "Send finished: complete={}, {} of {} bytes delivered, {} frames sent, {} retries",
            report.complete,
            report.stats.bytes_delivered,
            plan.total_bytes(),
            report.stats.frames_sent,
            report.stats.retries
        );
        Ok(report)
    }

    fn finish(&mut self, plan: &TransferPlan) -> TransferReport {
        let mut report = TransferReport::new(
            Role::Sender,
            self.config.mode,
            std::mem::take(&mut self.stats),
        );
        report.total_bytes = plan.total_bytes() as u64;
        report
    }

    fn send_stop_and_wait(
        &mut self,
        plan: &TransferPlan,
        frames: &[Frame],
        payload: &Bytes,
    ) -> TransferReport {
        let policy = self.config.retry;
        let mut delivered = 0usize;

        for frame in frames {
            let bytes = frame.to_bytes();
            let mut acked = false;

            for attempt in 1..=policy.max_attempts {
                if attempt > 1 {
                    self.stats.retries += 1;
                    tracing::warn!(
                        "Retrying frame {} (attempt {}/{})",
                        frame.seq,
                        attempt,
                        policy.max_attempts
                    );
                }

                self.stats.mark_started();
                if let Err(e) = self.link.send(&bytes) {
                    tracing::warn!("Send of frame {} failed: {}", frame.seq, e);
                    continue;
                }
                self.stats.frames_sent += 1;

                if self.await_ack(frame.seq) {
                    acked = true;
                    break;
                }
            }

            if !acked {
                tracing::warn!(
                    "Frame {} not acknowledged after {} attempts, aborting",
                    frame.seq,
                    policy.max_attempts
                );
                let mut report = self.finish(plan);
                report.stats.bytes_delivered = delivered as u64;
                report.payload = payload.slice(..delivered);
                report.missing = plan
                    .sequences()
                    .filter(|seq| *seq >= frame.seq)
                    .collect();
                report.failure = Some(TransferError::ExceededRetries {
                    seq: frame.seq,
                    attempts: policy.max_attempts,
                });
                return report;
            }

            delivered += frame.payload.len();
            tracing::debug!("Frame {} acknowledged", frame.seq);
        }

        self.stats.mark_initial_pass_done();
        let mut report = self.finish(plan);
        report.stats.bytes_delivered = delivered as u64;
        report.payload = payload.clone();
        report.complete = true;
        report.receiver_confirmed = plan.frame_count() > 0;
        report
    }

    /// Wait one ack timeout for the ack of `seq`
    ///
    /// Any other outcome (silence, corruption, a different ack) is a failed
    /// attempt.
    fn await_ack(&mut self, seq: SeqNumber) -> bool {
        match self.link.recv(self.config.retry.timeout) {
            Received::Ok(reply) => match ReceiverFrame::decode(&reply) {
                Ok(ReceiverFrame::Ack(acked)) if acked == seq => true,
                other => {
                    tracing::warn!("Expected ack for frame {}, got {:?}", seq, other);
                    false
                }
            },
            Received::Corrupt(_) => {
                self.stats.corrupt_frames += 1;
                tracing::warn!("Corrupted ack for frame {}", seq);
                false
            }
            Received::Timeout => {
                self.stats.timeouts += 1;
                tracing::warn!("Ack timeout for frame {}", seq);
                false
            }
        }
    }

    fn send_bulk(
        &mut self,
        plan: &TransferPlan,
        frames: &[Frame],
        payload: &Bytes,
    ) -> TransferReport {
        self.stats.mark_started();
        for frame in frames {
            self.transmit(frame);
        }
        self.stats.mark_initial_pass_done();
        tracing::info!("Burst of {} frames sent, waiting for corruption list", frames.len());

        loop {
            let list = match self.await_corruption_list() {
                ListWait::List(list) => list,
                ListWait::Silence => {
                    tracing::warn!(
                        "No corruption list within {:?}, assuming delivery",
                        self.config.corruption_list_timeout
                    );
                    let mut report = self.finish(plan);
                    report.stats.bytes_delivered = plan.total_bytes() as u64;
                    report.payload = payload.clone();
                    report.complete = true;
                    return report;
                }
            };

            if list.is_empty() {
                tracing::info!("Receiver confirmed all {} frames", plan.frame_count());
                let mut report = self.finish(plan);
                report.stats.bytes_delivered = plan.total_bytes() as u64;
                report.payload = payload.clone();
                report.complete = true;
                report.receiver_confirmed = true;
                return report;
            }

            let requested: BTreeSet<SeqNumber> = list
                .seqs
                .iter()
                .copied()
                .filter(|seq| plan.contains(*seq))
                .collect();

            if self.stats.rounds >= self.config.max_rounds {
                tracing::warn!(
                    "Round budget of {} spent with {} frames still missing",
                    self.config.max_rounds,
                    requested.len()
                );
                let missing_bytes: usize = requested.iter().map(|seq| plan.frame_len(*seq)).sum();
                let delivered = plan.total_bytes().saturating_sub(missing_bytes);

                let mut report = self.finish(plan);
                report.stats.bytes_delivered = delivered as u64;
                report.failure = Some(TransferError::IncompleteTransfer {
                    missing: requested.len(),
                    delivered: delivered as u64,
                    total: plan.total_bytes() as u64,
                });
                report.missing = requested.into_iter().collect();
                return report;
            }

            self.stats.rounds += 1;
            tracing::info!(
                "Round {}: retransmitting {} frames",
                self.stats.rounds,
                requested.len()
            );
            for seq in requested {
                self.stats.retries += 1;
                self.transmit(&frames[seq.index()]);
            }
        }
    }

    /// Transmit one burst frame; a failed send is left for the receiver to report
    fn transmit(&mut self, frame: &Frame) {
        match self.link.send(&frame.to_bytes()) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                tracing::debug!("Sent frame {} ({} bytes)", frame.seq, frame.size());
            }
            Err(e) => tracing::warn!("Send of frame {} failed: {}", frame.seq, e),
        }
    }

    /// Wait up to the corruption-list timeout for one corruption list
    ///
    /// Anything else heard before the deadline is ignored.
    fn await_corruption_list(&mut self) -> ListWait {
        let deadline = Instant::now() + self.config.corruption_list_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ListWait::Silence;
            }

            match self.link.recv(remaining) {
                Received::Ok(reply) => match ReceiverFrame::decode(&reply) {
                    Ok(ReceiverFrame::CorruptionList(list)) => {
                        tracing::debug!("Corruption list with {} entries", list.len());
                        return ListWait::List(list);
                    }
                    other => tracing::debug!("Ignoring {:?} while waiting for list", other),
                },
                Received::Corrupt(_) => {
                    self.stats.corrupt_frames += 1;
                    tracing::warn!("Ignoring corrupted frame while waiting for list");
                }
                Received::Timeout => {
                    self.stats.timeouts += 1;
                    return ListWait::Silence;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ScriptedLink;
    use crate::config::RetryPolicy;
    use crate::frame::SenderFrame;
    use std::time::Duration;

    fn pattern(len: usize) -> Bytes {
        (0..len).map(|i| (i * 7 % 251) as u8).collect::<Vec<_>>().into()
    }

    fn ack(seq: SeqNumber) -> Received {
        Received::Ok(ReceiverFrame::Ack(seq).to_bytes().freeze())
    }

    fn list(seqs: &[u8]) -> Received {
        let list = CorruptionList::new(seqs.iter().map(|s| SeqNumber::new(*s)).collect());
        Received::Ok(ReceiverFrame::CorruptionList(list).to_bytes().freeze())
    }

    fn data_seq(frame: &[u8]) -> Option<SeqNumber> {
        match SenderFrame::decode(frame) {
            Ok(SenderFrame::Data(data)) => Some(data.seq),
            _ => None,
        }
    }

    fn bulk_config() -> SessionConfig {
        SessionConfig::with_mode(ArqMode::BulkSelectiveRepeat)
    }

    #[test]
    fn test_stop_and_wait_clean() {
        let mut link = ScriptedLink::new(|frame| data_seq(frame).map(ack).into_iter().collect());
        let config = SessionConfig::default();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(10_240))
            .unwrap();

        assert!(report.complete);
        assert!(report.receiver_confirmed);
        assert_eq!(report.stats.frames_sent, 41);
        assert_eq!(report.stats.retries, 0);
        assert_eq!(report.stats.bytes_delivered, 10_240);
        assert_eq!(report.payload, pattern(10_240));
    }

    #[test]
    fn test_stop_and_wait_retries_after_corrupt_ack() {
        let mut first = true;
        let mut link = ScriptedLink::new(move |frame| match data_seq(frame) {
            Some(seq) if seq.as_raw() == 1 && first => {
                first = false;
                vec![Received::Corrupt(Bytes::from_static(&[1]))]
            }
            Some(seq) => vec![ack(seq)],
            None => Vec::new(),
        });
        let config = SessionConfig::default();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(600))
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.stats.retries, 1);
        assert_eq!(report.stats.frames_sent, 4);
        assert_eq!(report.stats.corrupt_frames, 1);
    }

    #[test]
    fn test_stop_and_wait_mismatched_ack_is_a_failed_attempt() {
        let mut link = ScriptedLink::new(|frame| match data_seq(frame) {
            Some(seq) if seq.as_raw() == 0 => vec![ack(SeqNumber::new(9))],
            Some(seq) => vec![ack(seq)],
            None => Vec::new(),
        });
        let config = SessionConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            ..SessionConfig::default()
        };

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(300))
            .unwrap();
        assert!(!report.complete);
        assert_eq!(report.stats.frames_sent, 3);
        assert_eq!(report.stats.bytes_delivered, 0);
        assert!(matches!(
            report.failure,
            Some(TransferError::ExceededRetries { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_send_failures_count_as_attempts() {
        let mut link = ScriptedLink::new(|frame| data_seq(frame).map(ack).into_iter().collect());
        link.fail_next_sends(2);
        let config = SessionConfig::default();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(100))
            .unwrap();
        assert!(report.complete);
        assert_eq!(report.stats.retries, 2);
        assert_eq!(report.stats.frames_sent, 1);
        assert_eq!(link.log().sent_count(), 3);
    }

    #[test]
    fn test_empty_payload() {
        let mut link = ScriptedLink::silent();
        let config = SessionConfig::default();
        let report = Sender::new(&mut link, &config, Span::none())
            .send(Bytes::new())
            .unwrap();
        assert!(report.complete);
        assert!(!report.receiver_confirmed);
        assert_eq!(report.stats.frames_sent, 0);
        assert_eq!(link.log().sent_count(), 0);
    }

    #[test]
    fn test_bulk_clean() {
        let mut link = ScriptedLink::new(|frame| match data_seq(frame) {
            Some(seq) if seq.as_raw() == 3 => vec![list(&[])],
            _ => Vec::new(),
        });
        let config = bulk_config();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(1000))
            .unwrap();
        assert!(report.complete);
        assert!(report.receiver_confirmed);
        assert_eq!(report.stats.rounds, 0);
        assert_eq!(report.stats.frames_sent, 4);
    }

    #[test]
    fn test_bulk_retransmits_exactly_the_list() {
        let mut link = ScriptedLink::new(|frame| match data_seq(frame) {
            Some(seq) if seq.as_raw() == 4 => vec![list(&[1, 3])],
            _ => Vec::new(),
        });
        let log = link.log();
        let config = bulk_config();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(1200))
            .unwrap();

        let sent: Vec<u8> = log.sent().iter().map(|f| f[0]).collect();
        assert_eq!(sent, vec![0, 1, 2, 3, 4, 1, 3]);
        assert_eq!(report.stats.rounds, 1);
        assert_eq!(report.stats.retries, 2);
        // No list after the round: delivery is assumed, not confirmed
        assert!(report.complete);
        assert!(!report.receiver_confirmed);
    }

    #[test]
    fn test_bulk_silence_is_best_effort() {
        let mut link = ScriptedLink::silent();
        let config = bulk_config();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(1000))
            .unwrap();
        assert!(report.complete);
        assert!(!report.receiver_confirmed);
        assert_eq!(report.stats.bytes_delivered, 1000);
    }

    #[test]
    fn test_bulk_budget_exhausted() {
        // Receiver keeps asking for frame 2 forever
        let mut link = ScriptedLink::new(|frame| match data_seq(frame) {
            Some(seq) if seq.as_raw() == 2 => vec![list(&[2])],
            _ => Vec::new(),
        });
        let config = bulk_config();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(1000))
            .unwrap();
        assert!(!report.complete);
        assert_eq!(report.stats.rounds, 3);
        assert_eq!(report.stats.frames_sent, 4 + 3);
        assert_eq!(report.stats.bytes_delivered, 1000 - 253);
        assert_eq!(report.missing, vec![SeqNumber::new(2)]);
        assert!(matches!(
            report.failure,
            Some(TransferError::IncompleteTransfer { missing: 1, .. })
        ));
    }

    #[test]
    fn test_bulk_repeated_list_entries() {
        // List naming frame 0 five times
        let repeated = Received::Ok(Bytes::from_static(&[0xFF, 5, 0, 0, 0, 0, 0]));
        let mut link = ScriptedLink::new(move |frame| match data_seq(frame) {
            Some(seq) if seq.as_raw() == 3 => vec![repeated.clone()],
            _ => Vec::new(),
        });
        let config = SessionConfig {
            max_rounds: 0,
            ..bulk_config()
        };

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(1000))
            .unwrap();
        assert!(!report.complete);
        assert_eq!(report.stats.bytes_delivered, 1000 - 253);
        assert_eq!(report.missing, vec![SeqNumber::new(0)]);
        assert!(matches!(
            report.failure,
            Some(TransferError::IncompleteTransfer { missing: 1, .. })
        ));
    }

    #[test]
    fn test_bulk_repeated_entry_resent_once() {
        let mut resent = false;
        let mut link = ScriptedLink::new(move |frame| match data_seq(frame) {
            Some(seq) if seq.as_raw() == 3 => {
                vec![Received::Ok(Bytes::from_static(&[0xFF, 3, 1, 1, 1]))]
            }
            Some(seq) if seq.as_raw() == 1 && resent => vec![list(&[])],
            Some(seq) if seq.as_raw() == 1 => {
                resent = true;
                Vec::new()
            }
            _ => Vec::new(),
        });
        let log = link.log();
        let config = bulk_config();

        let report = Sender::new(&mut link, &config, Span::none())
            .send(pattern(1000))
            .unwrap();

        let sent: Vec<u8> = log.sent().iter().map(|f| f[0]).collect();
        assert_eq!(sent, vec![0, 1, 2, 3, 1]);
        assert_eq!(report.stats.retries, 1);
        assert!(report.receiver_confirmed);
    }

    #[test]
    fn test_announce() {
        let mut link = ScriptedLink::new(|frame| match SenderFrame::decode(frame) {
            Ok(SenderFrame::Header(_)) => {
                vec![Received::Ok(ReceiverFrame::HeaderAck.to_bytes().freeze())]
            }
            _ => Vec::new(),
        });
        let config = SessionConfig::default();
        let mut sender = Sender::new(&mut link, &config, Span::none());
        assert!(sender.announce(TransferHeader::for_bytes(500)).is_ok());
    }

    #[test]
    fn test_announce_gives_up() {
        let mut link = ScriptedLink::silent();
        let config = SessionConfig::default();
        let mut sender = Sender::new(&mut link, &config, Span::none());

        assert!(matches!(
            sender.announce(TransferHeader::for_bytes(500)),
            Err(TransferError::HeaderNotAcknowledged { attempts: 5 })
        ));
        assert_eq!(link.log().sent_count(), 5);
    }
}
