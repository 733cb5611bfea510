#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value
    )
)]

//! Market-Data Plant
//!
//! Ingests a totally ordered order-book event stream from an exchange over a
//! sequenced-datagram protocol, maintains per-instrument books, and fans
//! incremental updates plus initial snapshots out to streaming gRPC
//! subscribers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: market semantics, no transport concerns
//!   - `market`: events, sides, identifiers
//!   - `book`: price-level books, snapshotting, fan-out
//!   - `subscription`: subscribers, session keys, the plant registry
//!
//! - **Infrastructure**: protocol and transport adapters
//!   - `wire`: big-endian packet codec
//!   - `feed`: sequenced receiver state machine + UDP loop
//!   - `config`: environment, instrument file, CLI
//!   - `grpc`: streaming server and vendored protobuf stubs
//!
//! # Data Flow
//!
//! ```text
//! Exchange UDP ──▶ SequencedReceiver ──▶ OrderBook ──▶ Subscriber queues
//!                    (gap recovery)      (apply +        │
//!                                         fan-out)       ▼
//!                                                   gRPC streams ──▶ Client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - core market-data semantics.
pub mod domain;

/// Infrastructure layer - protocol and transport adapters.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::book::{BookManager, OrderBook, UnknownInstrument};
pub use domain::market::{
    BookLevel, BookUpdate, Depth, EventKind, InstrumentId, MarketEvent, Price, Quantity,
    SequenceNumber, Side, SubscriberId, Timestamp,
};
pub use domain::subscription::{
    LookupError, SessionKey, Subscriber, SubscriberRegistry, SESSION_KEY_LENGTH,
};

// Infrastructure
pub use infrastructure::config::{Cli, ConfigError, InstrumentsConfig, PlantConfig};
pub use infrastructure::feed::{
    ExchangeFeed, FeedError, PacketOutcome, ReceiverConfig, RecoveryState, RetransmitRequest,
    SequencedReceiver, RETRANSMIT_TIMEOUT,
};
pub use infrastructure::grpc::{proto::market_plant::v1 as proto, MarketPlantServer};
pub use infrastructure::wire;
