//! Sequenced-Datagram Receiver
//!
//! The state machine that turns an unreliable, reordered, duplicated packet
//! stream into an in-order, exactly-once message stream. Gap recovery runs
//! over the same socket via retransmit-request packets; the machine itself is
//! pure: it reports the request to send and the payload to deliver, and the
//! feed loop performs the I/O.
//!
//! Single-writer by design: one feed task owns the receiver, so no locking.

use std::ops::Range;
use std::time::{Duration, Instant};

use crate::domain::market::SequenceNumber;
use crate::infrastructure::wire::{
    self, HEADER_LENGTH, MAX_MESSAGE_COUNT, MESSAGE_HEADER_LENGTH, Session, WireError,
};

/// Default throttle between repeated retransmit requests for the same gap.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration
// =============================================================================

/// Tunables for the receiver.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Minimum interval between repeated requests while a gap is open.
    pub retransmit_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout: RETRANSMIT_TIMEOUT,
        }
    }
}

// =============================================================================
// State
// =============================================================================

/// Where the receiver stands with respect to gap recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// No in-order packet observed yet.
    ColdStart,
    /// Fully caught up with the live stream.
    Synchronized,
    /// Requesting retransmits for `[next_expected, until)`.
    Recovering {
        /// First sequence after the known end of the gap; strictly greater
        /// than `next_expected` while recovering.
        until: SequenceNumber,
    },
}

/// A retransmit request the caller must put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmitRequest {
    /// Latched producer session.
    pub session: Session,
    /// First missing sequence number.
    pub start: SequenceNumber,
    /// Number of messages requested, capped at [`MAX_MESSAGE_COUNT`].
    pub count: u16,
}

impl RetransmitRequest {
    /// Serialise into the 20-byte request packet.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        wire::encode_retransmit_request(&self.session, self.start, self.count)
    }
}

/// What a handled packet asks the feed loop to do.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketOutcome {
    /// Retransmit request to send, if any.
    pub request: Option<RetransmitRequest>,
    /// Byte range of a deliverable message payload within the packet buffer.
    pub payload: Option<Range<usize>>,
}

// =============================================================================
// Receiver
// =============================================================================

/// The per-session receiver state machine.
#[derive(Debug)]
pub struct SequencedReceiver {
    config: ReceiverConfig,
    session: Option<Session>,
    next_expected: SequenceNumber,
    recovery: RecoveryState,
    last_request_at: Instant,
}

impl SequencedReceiver {
    /// Create a receiver that aligns to the first packet it sees.
    #[must_use]
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_initial_sequence(config, 0)
    }

    /// Create a receiver expecting the stream to begin at `start`.
    ///
    /// `start = 0` means "align to the first received packet"; any other
    /// value makes the receiver backfill from `start` on its first gap.
    #[must_use]
    pub fn with_initial_sequence(config: ReceiverConfig, start: SequenceNumber) -> Self {
        Self {
            config,
            session: None,
            next_expected: start,
            recovery: RecoveryState::ColdStart,
            last_request_at: Instant::now(),
        }
    }

    /// Next sequence number the receiver will deliver.
    #[must_use]
    pub const fn next_expected(&self) -> SequenceNumber {
        self.next_expected
    }

    /// Current recovery state.
    #[must_use]
    pub const fn recovery(&self) -> RecoveryState {
        self.recovery
    }

    /// The session latched from the first valid packet, if any.
    #[must_use]
    pub const fn session(&self) -> Option<Session> {
        self.session
    }

    /// Run one received datagram through the state machine.
    ///
    /// Returns the retransmit request to send (if any) and, for the in-order
    /// case, the byte range of the message payload to deliver. Each sequence
    /// number is delivered at most once.
    ///
    /// # Errors
    ///
    /// [`WireError::Truncated`] when the packet is shorter than its framing
    /// claims; the receiver state is unchanged except for any recovery
    /// bookkeeping already performed.
    pub fn handle_packet(&mut self, buf: &[u8]) -> Result<PacketOutcome, WireError> {
        let header = wire::parse_packet_header(buf)?;

        let session = *self.session.get_or_insert(header.session);
        if session != header.session {
            // Producers use one session per run; a stray packet from another
            // session is dropped rather than corrupting sequence state.
            tracing::debug!(
                expected = ?session,
                received = ?header.session,
                "dropping packet from mismatched session"
            );
            return Ok(PacketOutcome::default());
        }

        let sequence = header.sequence_number;
        let next_after = sequence + SequenceNumber::from(header.message_count);

        // Cold-start alignment: adopt the first observed sequence.
        if self.next_expected == 0 {
            self.next_expected = sequence;
        }

        if sequence > self.next_expected {
            return Ok(self.handle_gap(next_after));
        }

        if sequence < self.next_expected {
            // Duplicate or stale; already delivered or superseded.
            return Ok(PacketOutcome::default());
        }

        let request = self.maintain_recovery(next_after);

        if header.end_of_session {
            return Ok(PacketOutcome {
                request,
                payload: None,
            });
        }

        let payload = self.read_message(buf)?;
        self.next_expected += 1;

        Ok(PacketOutcome {
            request,
            payload: Some(payload),
        })
    }

    /// A packet ahead of `next_expected` arrived: open or widen the recovery
    /// window and (throttled) request the missing range.
    fn handle_gap(&mut self, next_after: SequenceNumber) -> PacketOutcome {
        let request = match self.recovery {
            RecoveryState::ColdStart | RecoveryState::Synchronized => {
                self.recovery = RecoveryState::Recovering { until: next_after };
                Some(self.build_request(self.next_expected))
            }
            RecoveryState::Recovering { until } => {
                self.recovery = RecoveryState::Recovering {
                    until: until.max(next_after),
                };
                if self.last_request_at.elapsed() > self.config.retransmit_timeout {
                    Some(self.build_request(self.next_expected))
                } else {
                    None
                }
            }
        };
        PacketOutcome {
            request,
            payload: None,
        }
    }

    /// The in-order packet arrived: close the window when its end is
    /// reached, or pipeline a request for the next missing sequence.
    fn maintain_recovery(&mut self, next_after: SequenceNumber) -> Option<RetransmitRequest> {
        match self.recovery {
            RecoveryState::ColdStart => {
                self.recovery = RecoveryState::Synchronized;
                None
            }
            RecoveryState::Recovering { until } if until == next_after => {
                self.recovery = RecoveryState::Synchronized;
                None
            }
            RecoveryState::Recovering { .. } => Some(self.build_request(next_after)),
            RecoveryState::Synchronized => None,
        }
    }

    fn build_request(&mut self, start: SequenceNumber) -> RetransmitRequest {
        let until = match self.recovery {
            RecoveryState::Recovering { until } => until,
            RecoveryState::ColdStart | RecoveryState::Synchronized => start,
        };
        let remaining = until.saturating_sub(start);
        let count = remaining.min(SequenceNumber::from(MAX_MESSAGE_COUNT)) as u16;

        self.last_request_at = Instant::now();

        RetransmitRequest {
            // The session is latched before any request can be built.
            session: self.session.unwrap_or_default(),
            start,
            count,
        }
    }

    /// Bounds-check the message frame and return the payload range.
    fn read_message(&self, buf: &[u8]) -> Result<Range<usize>, WireError> {
        let length = wire::read_u16(buf, HEADER_LENGTH)? as usize;
        let start = HEADER_LENGTH + MESSAGE_HEADER_LENGTH;
        let end = start + length;
        if end > buf.len() {
            return Err(WireError::Truncated {
                received: buf.len(),
                expected: end,
            });
        }
        Ok(start..end)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{EventKind, MarketEvent, Side};
    use crate::infrastructure::wire::{PACKET_SIZE, encode_end_of_session, encode_event_packet};

    const SESSION: Session = *b"TESTSESS01";

    fn event(price: u32) -> MarketEvent {
        MarketEvent {
            instrument_id: 1,
            side: Side::Bid,
            kind: EventKind::AddLevel,
            price,
            quantity: 10,
            exchange_ts: 0,
        }
    }

    fn packet(sequence: SequenceNumber) -> [u8; PACKET_SIZE] {
        encode_event_packet(&SESSION, sequence, &event(100))
    }

    fn receiver() -> SequencedReceiver {
        SequencedReceiver::new(ReceiverConfig::default())
    }

    #[test]
    fn in_order_stream_delivers_every_packet() {
        let mut rx = receiver();

        for (i, sequence) in [10, 11, 12].into_iter().enumerate() {
            let outcome = rx.handle_packet(&packet(sequence)).unwrap();
            assert!(outcome.payload.is_some(), "packet {i} not delivered");
            assert!(outcome.request.is_none());
            assert_eq!(rx.next_expected(), sequence + 1);
            assert_eq!(rx.recovery(), RecoveryState::Synchronized);
        }
    }

    #[test]
    fn first_packet_aligns_and_synchronises() {
        let mut rx = receiver();

        let outcome = rx.handle_packet(&packet(500)).unwrap();
        assert!(outcome.payload.is_some());
        assert_eq!(rx.next_expected(), 501);
        assert_eq!(rx.recovery(), RecoveryState::Synchronized);
    }

    #[test]
    fn single_drop_recovers_via_retransmit() {
        let mut rx = receiver();

        // Seq 10 arrives in order.
        assert!(rx.handle_packet(&packet(10)).unwrap().payload.is_some());
        assert_eq!(rx.next_expected(), 11);

        // Seq 12 arrives early: gap opens, request for 11 goes out.
        let outcome = rx.handle_packet(&packet(12)).unwrap();
        assert!(outcome.payload.is_none());
        let request = outcome.request.unwrap();
        assert_eq!(request.start, 11);
        assert_eq!(request.count, 2);
        assert_eq!(rx.next_expected(), 11);
        assert_eq!(rx.recovery(), RecoveryState::Recovering { until: 13 });

        // Retransmitted 11 arrives: delivered, still recovering for 12.
        let outcome = rx.handle_packet(&packet(11)).unwrap();
        assert!(outcome.payload.is_some());
        assert_eq!(rx.next_expected(), 12);
        let request = outcome.request.unwrap();
        assert_eq!(request.start, 12);
        assert_eq!(request.count, 1);

        // 12 again (retransmit or late original): window closes.
        let outcome = rx.handle_packet(&packet(12)).unwrap();
        assert!(outcome.payload.is_some());
        assert_eq!(rx.next_expected(), 13);
        assert_eq!(rx.recovery(), RecoveryState::Synchronized);
    }

    #[test]
    fn duplicate_is_delivered_exactly_once() {
        let mut rx = receiver();

        assert!(rx.handle_packet(&packet(10)).unwrap().payload.is_some());
        let outcome = rx.handle_packet(&packet(10)).unwrap();
        assert!(outcome.payload.is_none());
        assert!(outcome.request.is_none());
        assert_eq!(rx.next_expected(), 11);
    }

    #[test]
    fn end_of_session_delivers_nothing() {
        let mut rx = receiver();

        assert!(rx.handle_packet(&packet(10)).unwrap().payload.is_some());

        let eos = encode_end_of_session(&SESSION, 11);
        let outcome = rx.handle_packet(&eos).unwrap();
        assert!(outcome.payload.is_none());
        assert!(outcome.request.is_none());
        assert_eq!(rx.next_expected(), 11);
        assert_eq!(rx.recovery(), RecoveryState::Synchronized);
    }

    #[test]
    fn cold_start_backfills_from_initial_sequence() {
        let mut rx = SequencedReceiver::with_initial_sequence(ReceiverConfig::default(), 5);

        let outcome = rx.handle_packet(&packet(10)).unwrap();
        assert!(outcome.payload.is_none());
        let request = outcome.request.unwrap();
        assert_eq!(request.start, 5);
        assert_eq!(request.count, 6);
        assert_eq!(request.session, SESSION);
        assert_eq!(rx.recovery(), RecoveryState::Recovering { until: 11 });
    }

    #[test]
    fn widening_gap_extends_window_without_spamming_requests() {
        let mut rx = receiver();

        assert!(rx.handle_packet(&packet(10)).unwrap().payload.is_some());

        let outcome = rx.handle_packet(&packet(12)).unwrap();
        assert!(outcome.request.is_some());

        // A further-ahead packet inside the throttle window widens the
        // recovery bound but sends nothing.
        let outcome = rx.handle_packet(&packet(15)).unwrap();
        assert!(outcome.request.is_none());
        assert_eq!(rx.recovery(), RecoveryState::Recovering { until: 16 });

        // An older ahead-packet must not shrink the window.
        let outcome = rx.handle_packet(&packet(13)).unwrap();
        assert!(outcome.request.is_none());
        assert_eq!(rx.recovery(), RecoveryState::Recovering { until: 16 });
    }

    #[test]
    fn request_retries_are_throttled() {
        let config = ReceiverConfig {
            retransmit_timeout: Duration::from_millis(20),
        };
        let mut rx = SequencedReceiver::new(config);

        assert!(rx.handle_packet(&packet(10)).unwrap().payload.is_some());
        assert!(rx.handle_packet(&packet(12)).unwrap().request.is_some());
        assert!(rx.handle_packet(&packet(13)).unwrap().request.is_none());

        std::thread::sleep(Duration::from_millis(30));

        let request = rx.handle_packet(&packet(14)).unwrap().request.unwrap();
        assert_eq!(request.start, 11);
        assert_eq!(request.count, 4);
    }

    #[test]
    fn mismatched_session_is_dropped() {
        let mut rx = receiver();

        assert!(rx.handle_packet(&packet(10)).unwrap().payload.is_some());

        let stray = encode_event_packet(b"OTHERSESS9", 11, &event(100));
        let outcome = rx.handle_packet(&stray).unwrap();
        assert!(outcome.payload.is_none());
        assert!(outcome.request.is_none());
        assert_eq!(rx.next_expected(), 11);
    }

    #[test]
    fn truncated_packet_leaves_state_usable() {
        let mut rx = receiver();

        assert!(rx.handle_packet(&packet(10)).unwrap().payload.is_some());

        let truncated = &packet(11)[..PACKET_SIZE - 10];
        assert!(matches!(
            rx.handle_packet(truncated),
            Err(WireError::Truncated { .. })
        ));

        // Nothing was delivered, so the sequence is still expected and a
        // well-formed retransmit of it goes through.
        assert!(rx.handle_packet(&packet(11)).unwrap().payload.is_some());
        assert_eq!(rx.next_expected(), 12);
    }

    #[test]
    fn payload_range_points_at_the_message() {
        let mut rx = receiver();
        let buf = packet(10);

        let outcome = rx.handle_packet(&buf).unwrap();
        let range = outcome.payload.unwrap();
        let parsed = crate::infrastructure::wire::parse_event(&buf[range]).unwrap();
        assert_eq!(parsed, event(100));
    }
}
