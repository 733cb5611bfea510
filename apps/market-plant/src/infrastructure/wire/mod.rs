//! Wire Codec
//!
//! Big-endian packet framing for the exchange's sequenced-datagram protocol.
//! One message per datagram: a 20-byte session/sequence header, an optional
//! 2-byte message length, and the event payload.
//!
//! ```text
//! offset  size  field
//!   0    10    session
//!  10     8    sequence_number (u64)
//!  18     2    message_count   (u16; 0xFFFF = end of session)
//!  20     2    message_length  (u16; only when message_count > 0)
//!  22     4    instrument_id   (u32)
//!  26     1    side            (u8; 0 = BID, 1 = ASK)
//!  27     1    event_kind      (u8; 0 = ADD_LEVEL, 1 = REDUCE_LEVEL)
//!  28     4    price           (u32)
//!  32     4    quantity        (u32)
//!  36     8    exchange_ts     (u64, ns)
//! ```
//!
//! A retransmit request reuses the bare 20-byte header with `message_count`
//! set to the requested batch size; an end-of-session packet is the bare
//! header with `message_count = 0xFFFF`.

use thiserror::Error;

use crate::domain::market::{EventKind, MarketEvent, SequenceNumber, Side};

// =============================================================================
// Constants
// =============================================================================

/// Length of the opaque session identifier.
pub const SESSION_LENGTH: usize = 10;

/// Length of the packet header (session + sequence + message count).
pub const HEADER_LENGTH: usize = 20;

/// Length of the per-message length prefix.
pub const MESSAGE_HEADER_LENGTH: usize = 2;

/// Length of a serialised event payload.
pub const EVENT_LENGTH: usize = 22;

/// Total size of a live event packet.
pub const PACKET_SIZE: usize = HEADER_LENGTH + MESSAGE_HEADER_LENGTH + EVENT_LENGTH;

/// `message_count` sentinel announcing the end of the session.
pub const END_OF_SESSION: u16 = 0xFFFF;

/// Largest batch size a retransmit request may carry.
pub const MAX_MESSAGE_COUNT: u16 = END_OF_SESSION - 1;

/// Opaque session identifier, latched for the lifetime of one producer run.
pub type Session = [u8; SESSION_LENGTH];

// =============================================================================
// Errors
// =============================================================================

/// Failures while decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The buffer is shorter than the field being read requires.
    #[error("packet truncated: received {received} bytes, expected at least {expected}")]
    Truncated {
        /// Bytes actually available.
        received: usize,
        /// Bytes the read required.
        expected: usize,
    },
    /// The side byte is neither BID nor ASK.
    #[error("unknown side byte {0:#04x}")]
    UnknownSide(u8),
    /// The event-kind byte is neither ADD_LEVEL nor REDUCE_LEVEL.
    #[error("unknown event kind byte {0:#04x}")]
    UnknownEventKind(u8),
}

// =============================================================================
// Primitive reads and writes
// =============================================================================

fn check_len(buf: &[u8], expected: usize) -> Result<(), WireError> {
    if buf.len() < expected {
        return Err(WireError::Truncated {
            received: buf.len(),
            expected,
        });
    }
    Ok(())
}

/// Read a big-endian `u16` at `offset`.
pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16, WireError> {
    check_len(buf, offset + 2)?;
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&buf[offset..offset + 2]);
    Ok(u16::from_be_bytes(bytes))
}

/// Read a big-endian `u32` at `offset`.
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32, WireError> {
    check_len(buf, offset + 4)?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    Ok(u32::from_be_bytes(bytes))
}

/// Read a big-endian `u64` at `offset`.
pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64, WireError> {
    check_len(buf, offset + 8)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    Ok(u64::from_be_bytes(bytes))
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}

// =============================================================================
// Packet header
// =============================================================================

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Producer session identifier.
    pub session: Session,
    /// Sequence number of the first message in the packet.
    pub sequence_number: SequenceNumber,
    /// Number of messages in the packet, normalised to 0 for end-of-session.
    pub message_count: u16,
    /// Whether the raw count carried the end-of-session sentinel.
    pub end_of_session: bool,
}

/// Parse the 20-byte header at the start of `buf`.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] when `buf` is shorter than
/// [`HEADER_LENGTH`].
pub fn parse_packet_header(buf: &[u8]) -> Result<PacketHeader, WireError> {
    check_len(buf, HEADER_LENGTH)?;

    let mut session = [0u8; SESSION_LENGTH];
    session.copy_from_slice(&buf[..SESSION_LENGTH]);

    let sequence_number = read_u64(buf, SESSION_LENGTH)?;
    let raw_count = read_u16(buf, SESSION_LENGTH + 8)?;

    let end_of_session = raw_count == END_OF_SESSION;
    let message_count = if end_of_session { 0 } else { raw_count };

    Ok(PacketHeader {
        session,
        sequence_number,
        message_count,
        end_of_session,
    })
}

/// Encode a bare 20-byte header.
#[must_use]
pub fn encode_header(
    session: &Session,
    sequence_number: SequenceNumber,
    message_count: u16,
) -> [u8; HEADER_LENGTH] {
    let mut buf = [0u8; HEADER_LENGTH];
    buf[..SESSION_LENGTH].copy_from_slice(session);
    write_u64(&mut buf, SESSION_LENGTH, sequence_number);
    write_u16(&mut buf, SESSION_LENGTH + 8, message_count);
    buf
}

/// Encode a retransmit request: the first missing sequence plus the number
/// of messages wanted.
#[must_use]
pub fn encode_retransmit_request(
    session: &Session,
    start: SequenceNumber,
    count: u16,
) -> [u8; HEADER_LENGTH] {
    encode_header(session, start, count)
}

/// Encode an end-of-session announcement.
#[must_use]
pub fn encode_end_of_session(
    session: &Session,
    sequence_number: SequenceNumber,
) -> [u8; HEADER_LENGTH] {
    encode_header(session, sequence_number, END_OF_SESSION)
}

// =============================================================================
// Event payload
// =============================================================================

/// Parse an event payload (the bytes after the message-length prefix).
///
/// # Errors
///
/// Returns [`WireError::Truncated`] when the payload is shorter than
/// [`EVENT_LENGTH`], or an unknown-byte error for an unrecognised side or
/// event kind.
pub fn parse_event(payload: &[u8]) -> Result<MarketEvent, WireError> {
    check_len(payload, EVENT_LENGTH)?;

    let instrument_id = read_u32(payload, 0)?;
    let side = Side::from_wire(payload[4]).ok_or(WireError::UnknownSide(payload[4]))?;
    let kind = EventKind::from_wire(payload[5]).ok_or(WireError::UnknownEventKind(payload[5]))?;
    let price = read_u32(payload, 6)?;
    let quantity = read_u32(payload, 10)?;
    let exchange_ts = read_u64(payload, 14)?;

    Ok(MarketEvent {
        instrument_id,
        side,
        kind,
        price,
        quantity,
        exchange_ts,
    })
}

/// Encode a complete 44-byte live event packet.
#[must_use]
pub fn encode_event_packet(
    session: &Session,
    sequence_number: SequenceNumber,
    event: &MarketEvent,
) -> [u8; PACKET_SIZE] {
    let mut buf = [0u8; PACKET_SIZE];

    buf[..SESSION_LENGTH].copy_from_slice(session);
    write_u64(&mut buf, SESSION_LENGTH, sequence_number);
    write_u16(&mut buf, SESSION_LENGTH + 8, 1);
    write_u16(&mut buf, HEADER_LENGTH, EVENT_LENGTH as u16);

    let base = HEADER_LENGTH + MESSAGE_HEADER_LENGTH;
    write_u32(&mut buf, base, event.instrument_id);
    buf[base + 4] = event.side.to_wire();
    buf[base + 5] = event.kind.to_wire();
    write_u32(&mut buf, base + 6, event.price);
    write_u32(&mut buf, base + 10, event.quantity);
    write_u64(&mut buf, base + 14, event.exchange_ts);

    buf
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: Session = *b"SESSION001";

    fn sample_event() -> MarketEvent {
        MarketEvent {
            instrument_id: 42,
            side: Side::Ask,
            kind: EventKind::ReduceLevel,
            price: 99,
            quantity: 1500,
            exchange_ts: 1_234_567_891_234_567_890,
        }
    }

    #[test]
    fn header_round_trip() {
        let encoded = encode_header(&SESSION, 77, 1);
        let header = parse_packet_header(&encoded).unwrap();

        assert_eq!(header.session, SESSION);
        assert_eq!(header.sequence_number, 77);
        assert_eq!(header.message_count, 1);
        assert!(!header.end_of_session);
    }

    #[test]
    fn end_of_session_normalises_count() {
        let encoded = encode_end_of_session(&SESSION, 500);
        let header = parse_packet_header(&encoded).unwrap();

        assert!(header.end_of_session);
        assert_eq!(header.message_count, 0);
        assert_eq!(header.sequence_number, 500);
    }

    #[test]
    fn event_packet_round_trip() {
        let event = sample_event();
        let packet = encode_event_packet(&SESSION, 9, &event);
        assert_eq!(packet.len(), PACKET_SIZE);

        let header = parse_packet_header(&packet).unwrap();
        assert_eq!(header.sequence_number, 9);
        assert_eq!(header.message_count, 1);

        let length = read_u16(&packet, HEADER_LENGTH).unwrap() as usize;
        assert_eq!(length, EVENT_LENGTH);

        let payload_start = HEADER_LENGTH + MESSAGE_HEADER_LENGTH;
        let parsed = parse_event(&packet[payload_start..payload_start + length]).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = parse_packet_header(&[0u8; HEADER_LENGTH - 1]).unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                received: 19,
                expected: HEADER_LENGTH
            }
        );
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let err = parse_event(&[0u8; EVENT_LENGTH - 1]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn unknown_side_and_kind_are_rejected() {
        let event = sample_event();
        let packet = encode_event_packet(&SESSION, 1, &event);
        let base = HEADER_LENGTH + MESSAGE_HEADER_LENGTH;

        let mut bad_side = packet;
        bad_side[base + 4] = 7;
        assert_eq!(
            parse_event(&bad_side[base..]).unwrap_err(),
            WireError::UnknownSide(7)
        );

        let mut bad_kind = packet;
        bad_kind[base + 5] = 9;
        assert_eq!(
            parse_event(&bad_kind[base..]).unwrap_err(),
            WireError::UnknownEventKind(9)
        );
    }

    #[test]
    fn retransmit_request_carries_batch() {
        let encoded = encode_retransmit_request(&SESSION, 11, 2);
        let header = parse_packet_header(&encoded).unwrap();

        assert_eq!(header.sequence_number, 11);
        assert_eq!(header.message_count, 2);
        assert!(!header.end_of_session);
    }
}
