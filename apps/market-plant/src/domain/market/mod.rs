//! Core Market Types
//!
//! Canonical ingest records and the identifiers shared by every layer of the
//! plant. These types carry no protocol or transport concerns; the wire
//! binding lives in `infrastructure::wire` and the RPC binding in
//! `infrastructure::grpc`.

// =============================================================================
// Identifiers
// =============================================================================

/// Instrument identifier assigned by the exchange.
pub type InstrumentId = u32;

/// Price of a book level, in exchange ticks.
pub type Price = u32;

/// Quantity resting at a book level.
pub type Quantity = u32;

/// Per-session message index assigned by the producer.
pub type SequenceNumber = u64;

/// Identifier of a streaming subscriber, allocated by the plant.
pub type SubscriberId = u32;

/// Number of price levels per side emitted in a snapshot.
pub type Depth = usize;

/// Exchange timestamp, nanoseconds on the producer's monotonic clock.
pub type Timestamp = u64;

// =============================================================================
// Events
// =============================================================================

/// Side of the book an event applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Buy side, iterated best (highest) price first.
    Bid,
    /// Sell side, iterated best (lowest) price first.
    Ask,
}

impl Side {
    /// Decode from the single-byte wire representation.
    #[must_use]
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Bid),
            1 => Some(Self::Ask),
            _ => None,
        }
    }

    /// Encode to the single-byte wire representation.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::Bid => 0,
            Self::Ask => 1,
        }
    }
}

/// Kind of level mutation an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Increase the quantity at a price, creating the level if absent.
    AddLevel,
    /// Decrease the quantity at a price; the level is removed when the
    /// remaining quantity reaches zero.
    ReduceLevel,
}

impl EventKind {
    /// Decode from the single-byte wire representation.
    #[must_use]
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::AddLevel),
            1 => Some(Self::ReduceLevel),
            _ => None,
        }
    }

    /// Encode to the single-byte wire representation.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        match self {
            Self::AddLevel => 0,
            Self::ReduceLevel => 1,
        }
    }
}

/// The canonical ingest record: one order-book mutation for one instrument.
///
/// Born when parsed from a datagram payload, applied once to exactly one
/// book, and referenced by subscriber queues as part of a shared update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketEvent {
    /// Instrument the event applies to.
    pub instrument_id: InstrumentId,
    /// Side of the book.
    pub side: Side,
    /// Add or reduce.
    pub kind: EventKind,
    /// Price level touched.
    pub price: Price,
    /// Quantity added or removed.
    pub quantity: Quantity,
    /// Producer timestamp, nanoseconds.
    pub exchange_ts: Timestamp,
}

// =============================================================================
// Updates
// =============================================================================

/// One price level as carried inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    /// Side the level belongs to.
    pub side: Side,
    /// Level price.
    pub price: Price,
    /// Resting quantity.
    pub quantity: Quantity,
}

/// A message bound for subscriber queues.
///
/// Built once per book mutation (or subscription initialisation) and shared
/// across every recipient queue behind an `Arc`, so the hot path never copies
/// per subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookUpdate {
    /// Depth-bounded state of one book, delivered before any increment of
    /// the same instrument.
    Snapshot {
        /// Instrument the snapshot describes.
        instrument_id: InstrumentId,
        /// Bid levels, best (highest) price first.
        bids: Vec<BookLevel>,
        /// Ask levels, best (lowest) price first.
        asks: Vec<BookLevel>,
    },
    /// A single applied event.
    Incremental {
        /// Instrument the event applied to.
        instrument_id: InstrumentId,
        /// The applied event.
        event: MarketEvent,
    },
}

impl BookUpdate {
    /// Instrument this update concerns.
    #[must_use]
    pub const fn instrument_id(&self) -> InstrumentId {
        match self {
            Self::Snapshot { instrument_id, .. } | Self::Incremental { instrument_id, .. } => {
                *instrument_id
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
