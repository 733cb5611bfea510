//! Synthetic Market Simulation
//!
//! The pieces behind the simulator's three activities: the event generator
//! (with its live per-instrument book state), the append-only sequence
//! history, and the retransmit lookup. All of it is pure; the sockets live
//! in `main`.

use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;

use market_plant::wire::{PacketHeader, Session};
use market_plant::{EventKind, InstrumentId, MarketEvent, Price, Quantity, SequenceNumber, Side};

use crate::config::ExchangeConfig;

/// One event queued for sending, with the sequence assigned at generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedPacket {
    /// Assigned sequence number.
    pub sequence: SequenceNumber,
    /// The event payload.
    pub event: MarketEvent,
}

// =============================================================================
// History
// =============================================================================

/// Append-only record of every generated event, indexed by sequence number.
///
/// The retransmitter replays from here, so a replayed packet carries exactly
/// the original payload bytes.
#[derive(Debug, Default)]
pub struct EventHistory {
    events: Vec<MarketEvent>,
}

impl EventHistory {
    /// Create an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next recorded event will get.
    #[must_use]
    pub fn next_sequence(&self) -> SequenceNumber {
        self.events.len() as SequenceNumber
    }

    /// Record an event, assigning it the next sequence number.
    pub fn record(&mut self, event: MarketEvent) -> SequenceNumber {
        let sequence = self.next_sequence();
        self.events.push(event);
        sequence
    }

    /// Resolve a retransmit request against the recorded stream.
    ///
    /// Returns the packets for every requested sequence that has actually
    /// been generated; sequences at or past the head are silently ignored.
    #[must_use]
    pub fn retransmits(&self, request: &PacketHeader) -> Vec<QueuedPacket> {
        let start = request.sequence_number;
        let end = start + SequenceNumber::from(request.message_count);

        (start..end)
            .take_while(|&sequence| sequence < self.next_sequence())
            .map(|sequence| QueuedPacket {
                sequence,
                event: self.events[sequence as usize],
            })
            .collect()
    }
}

/// Whether a request packet is addressed to this simulator run.
#[must_use]
pub fn request_matches_session(request: &PacketHeader, session: &Session) -> bool {
    request.session == *session
}

// =============================================================================
// Generator
// =============================================================================

/// Live synthetic state of one book side.
#[derive(Debug)]
struct SideState {
    levels: HashMap<Price, Quantity>,
    /// Prices not currently occupied by a level.
    available: Vec<Price>,
}

impl SideState {
    fn new(config: &ExchangeConfig) -> Self {
        Self {
            levels: HashMap::new(),
            available: (config.min_price..=config.max_price).collect(),
        }
    }
}

/// Produces a plausible event stream: adds and reduces that always agree
/// with the book state built so far.
#[derive(Debug)]
pub struct EventGenerator {
    config: ExchangeConfig,
    books: HashMap<(InstrumentId, Side), SideState>,
    rng: StdRng,
    epoch: Instant,
}

impl EventGenerator {
    /// Create a generator with its own entropy.
    #[must_use]
    pub fn new(config: ExchangeConfig, rng: StdRng) -> Self {
        Self {
            config,
            books: HashMap::new(),
            rng,
            epoch: Instant::now(),
        }
    }

    /// Generate the next synthetic event and update the live state.
    pub fn next_event(&mut self) -> MarketEvent {
        let instrument_id = self
            .rng
            .random_range(self.config.min_instrument_id..=self.config.max_instrument_id);
        let side = if self.rng.random_range(0..2) == 0 {
            Side::Bid
        } else {
            Side::Ask
        };

        let exchange_ts = self.epoch.elapsed().as_nanos() as u64;
        let config = self.config.clone();
        let book = self
            .books
            .entry((instrument_id, side))
            .or_insert_with(|| SideState::new(&config));

        let add_level = book.levels.is_empty()
            || Self::roll(&mut self.rng) <= config.chance_of_add;

        let (kind, price, quantity) = if add_level {
            Self::generate_add(&mut self.rng, &config, book)
        } else {
            Self::generate_reduce(&mut self.rng, &config, book)
        };

        MarketEvent {
            instrument_id,
            side,
            kind,
            price,
            quantity,
            exchange_ts,
        }
    }

    /// Pause to insert between events.
    pub fn next_interval_ms(&mut self) -> u64 {
        self.rng
            .random_range(self.config.min_interval_ms..=self.config.max_interval_ms)
    }

    fn roll(rng: &mut StdRng) -> u32 {
        rng.random_range(1..=100)
    }

    fn generate_add(
        rng: &mut StdRng,
        config: &ExchangeConfig,
        book: &mut SideState,
    ) -> (EventKind, Price, Quantity) {
        let quantity = rng.random_range(config.min_quantity..=config.max_quantity);
        let open_new = book.levels.is_empty()
            || (!book.available.is_empty() && Self::roll(rng) <= config.chance_of_new_price);

        let price = if open_new {
            let index = rng.random_range(0..book.available.len());
            let price = book.available.swap_remove(index);
            book.levels.insert(price, quantity);
            price
        } else {
            let price = Self::pick_existing(rng, book);
            if let Some(level) = book.levels.get_mut(&price) {
                *level += quantity;
            }
            price
        };

        (EventKind::AddLevel, price, quantity)
    }

    fn generate_reduce(
        rng: &mut StdRng,
        config: &ExchangeConfig,
        book: &mut SideState,
    ) -> (EventKind, Price, Quantity) {
        let price = Self::pick_existing(rng, book);
        let resting = book.levels.get(&price).copied().unwrap_or(0);

        let delete_level = resting <= 1 || Self::roll(rng) <= config.chance_of_delete;
        let quantity = if delete_level {
            book.levels.remove(&price);
            book.available.push(price);
            resting
        } else {
            let removed = rng.random_range(1..resting);
            if let Some(level) = book.levels.get_mut(&price) {
                *level -= removed;
            }
            removed
        };

        (EventKind::ReduceLevel, price, quantity)
    }

    // Callers guarantee the side has at least one level.
    fn pick_existing(rng: &mut StdRng, book: &SideState) -> Price {
        let skip = rng.random_range(0..book.levels.len());
        book.levels.keys().nth(skip).copied().unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use market_plant::wire;
    use rand::SeedableRng;

    const SESSION: Session = *b"SIMSESSION";

    fn test_config() -> ExchangeConfig {
        ExchangeConfig {
            plant_ip: "127.0.0.1".to_string(),
            plant_port: 9001,
            exchange_port: 9000,
            chance_of_add: 55,
            chance_of_delete: 50,
            chance_of_new_price: 50,
            min_interval_ms: 1,
            max_interval_ms: 2,
            min_instrument_id: 1,
            max_instrument_id: 3,
            min_price: 1,
            max_price: 50,
            min_quantity: 1,
            max_quantity: 100,
        }
    }

    fn sample_event(price: Price) -> MarketEvent {
        MarketEvent {
            instrument_id: 1,
            side: Side::Bid,
            kind: EventKind::AddLevel,
            price,
            quantity: 10,
            exchange_ts: 0,
        }
    }

    #[test]
    fn history_assigns_increasing_sequences() {
        let mut history = EventHistory::new();

        assert_eq!(history.record(sample_event(1)), 0);
        assert_eq!(history.record(sample_event(2)), 1);
        assert_eq!(history.record(sample_event(3)), 2);
        assert_eq!(history.next_sequence(), 3);
    }

    #[test]
    fn retransmits_replay_the_original_events() {
        let mut history = EventHistory::new();
        for price in 1..=5 {
            history.record(sample_event(price));
        }

        let request = wire::parse_packet_header(&wire::encode_retransmit_request(&SESSION, 1, 3))
            .unwrap();
        let packets = history.retransmits(&request);

        assert_eq!(packets.len(), 3);
        for (offset, packet) in packets.iter().enumerate() {
            let sequence = 1 + offset as SequenceNumber;
            assert_eq!(packet.sequence, sequence);
            assert_eq!(packet.event, sample_event(sequence as Price + 1));
        }
    }

    #[test]
    fn retransmits_stop_at_the_stream_head() {
        let mut history = EventHistory::new();
        history.record(sample_event(1));
        history.record(sample_event(2));

        let request = wire::parse_packet_header(&wire::encode_retransmit_request(&SESSION, 1, 10))
            .unwrap();
        let packets = history.retransmits(&request);

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].sequence, 1);
    }

    #[test]
    fn out_of_range_requests_are_ignored() {
        let mut history = EventHistory::new();
        history.record(sample_event(1));

        let request = wire::parse_packet_header(&wire::encode_retransmit_request(&SESSION, 50, 4))
            .unwrap();
        assert!(history.retransmits(&request).is_empty());
    }

    #[test]
    fn session_filter_rejects_foreign_requests() {
        let request = wire::parse_packet_header(&wire::encode_retransmit_request(&SESSION, 0, 1))
            .unwrap();

        assert!(request_matches_session(&request, &SESSION));
        assert!(!request_matches_session(&request, b"OTHER-SESS"));
    }

    #[test]
    fn generated_stream_is_internally_consistent() {
        let mut generator = EventGenerator::new(test_config(), StdRng::seed_from_u64(7));

        // Replay the generated stream into reference books and check the
        // generator never reduces more than is resting.
        let mut books: HashMap<(InstrumentId, Side), HashMap<Price, Quantity>> = HashMap::new();

        for _ in 0..5_000 {
            let event = generator.next_event();
            let config = test_config();
            assert!((config.min_instrument_id..=config.max_instrument_id)
                .contains(&event.instrument_id));
            assert!((config.min_price..=config.max_price).contains(&event.price));
            assert!(event.quantity >= 1);

            let book = books.entry((event.instrument_id, event.side)).or_default();
            match event.kind {
                EventKind::AddLevel => {
                    *book.entry(event.price).or_insert(0) += event.quantity;
                }
                EventKind::ReduceLevel => {
                    let resting = book.get(&event.price).copied().unwrap_or(0);
                    assert!(
                        event.quantity <= resting,
                        "reduce of {} exceeds resting {resting}",
                        event.quantity
                    );
                    if event.quantity == resting {
                        book.remove(&event.price);
                    } else {
                        *book.entry(event.price).or_insert(0) -= event.quantity;
                    }
                }
            }
        }
    }

    #[test]
    fn intervals_respect_the_configured_range() {
        let mut generator = EventGenerator::new(test_config(), StdRng::seed_from_u64(3));
        for _ in 0..100 {
            let interval = generator.next_interval_ms();
            assert!((1..=2).contains(&interval));
        }
    }
}
