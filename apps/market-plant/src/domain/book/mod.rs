//! Order Books
//!
//! Per-instrument price-level books, snapshotting, and the fan-out path that
//! pushes applied events to every live subscriber.
//!
//! # Locking
//!
//! Each book owns one mutex over its levels *and* its subscription table.
//! `apply_and_publish` and `init_subscription` both serialise on it, which is
//! what makes the snapshot-before-increments guarantee hold: a snapshot is
//! enqueued while the mutex is held, so no later event applied to the same
//! book can reach the subscriber's queue first.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;

use crate::domain::market::{
    BookLevel, BookUpdate, Depth, EventKind, InstrumentId, MarketEvent, Price, Quantity, Side,
    SubscriberId,
};
use crate::domain::subscription::Subscriber;

// =============================================================================
// Order Book
// =============================================================================

/// Bid and ask levels plus the subscription table, guarded by one mutex.
#[derive(Debug, Default)]
struct BookState {
    bids: BTreeMap<Price, Quantity>,
    asks: BTreeMap<Price, Quantity>,
    subscriptions: HashMap<SubscriberId, Weak<Subscriber>>,
}

impl BookState {
    fn apply(&mut self, event: &MarketEvent) {
        let levels = match event.side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        match event.kind {
            EventKind::AddLevel => {
                *levels.entry(event.price).or_insert(0) += event.quantity;
            }
            EventKind::ReduceLevel => {
                // A missing level means a producer-side bug or a stale
                // retransmit; ignoring keeps reduces idempotent.
                let Some(resting) = levels.get_mut(&event.price) else {
                    return;
                };
                if event.quantity >= *resting {
                    levels.remove(&event.price);
                } else {
                    *resting -= event.quantity;
                }
            }
        }
    }

    /// Upgrade every registered subscriber, pruning entries whose stream has
    /// terminated.
    fn collect_recipients(&mut self) -> Vec<Arc<Subscriber>> {
        let mut recipients = Vec::with_capacity(self.subscriptions.len());
        self.subscriptions.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) => {
                recipients.push(subscriber);
                true
            }
            None => false,
        });
        recipients
    }

    fn snapshot_levels(&self, depth: Depth) -> (Vec<BookLevel>, Vec<BookLevel>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(&price, &quantity)| BookLevel {
                side: Side::Bid,
                price,
                quantity,
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(&price, &quantity)| BookLevel {
                side: Side::Ask,
                price,
                quantity,
            })
            .collect();
        (bids, asks)
    }
}

/// One instrument's live book.
#[derive(Debug)]
pub struct OrderBook {
    id: InstrumentId,
    depth: Depth,
    state: Mutex<BookState>,
}

impl OrderBook {
    /// Create an empty book.
    #[must_use]
    pub fn new(id: InstrumentId, depth: Depth) -> Self {
        Self {
            id,
            depth,
            state: Mutex::new(BookState::default()),
        }
    }

    /// The instrument this book tracks.
    #[must_use]
    pub const fn id(&self) -> InstrumentId {
        self.id
    }

    /// Maximum levels per side a snapshot carries.
    #[must_use]
    pub const fn depth(&self) -> Depth {
        self.depth
    }

    /// Apply one event and fan the resulting update out to every live
    /// subscriber of this book.
    ///
    /// The update message is built once and shared across all recipient
    /// queues; enqueueing happens after the mutex is released.
    pub fn apply_and_publish(&self, event: &MarketEvent) {
        let recipients = {
            let mut state = self.state.lock();
            state.apply(event);
            state.collect_recipients()
        };

        if recipients.is_empty() {
            return;
        }

        let update = Arc::new(BookUpdate::Incremental {
            instrument_id: self.id,
            event: *event,
        });
        for subscriber in recipients {
            subscriber.enqueue(Arc::clone(&update));
        }
    }

    /// Register a subscriber and enqueue its initial snapshot.
    ///
    /// The snapshot is enqueued before the mutex is released, so any
    /// concurrent `apply_and_publish` is ordered strictly after it.
    pub fn init_subscription(&self, subscriber: &Arc<Subscriber>) {
        let mut state = self.state.lock();
        state
            .subscriptions
            .insert(subscriber.id(), Arc::downgrade(subscriber));

        let (bids, asks) = state.snapshot_levels(self.depth);
        subscriber.enqueue(Arc::new(BookUpdate::Snapshot {
            instrument_id: self.id,
            bids,
            asks,
        }));
    }

    /// Remove a subscriber from this book's table.
    pub fn cancel_subscription(&self, id: SubscriberId) {
        self.state.lock().subscriptions.remove(&id);
    }

    /// Depth-bounded snapshot of the current levels, best prices first.
    #[must_use]
    pub fn snapshot(&self) -> (Vec<BookLevel>, Vec<BookLevel>) {
        self.state.lock().snapshot_levels(self.depth)
    }

    /// Current levels of one side in market-depth order, unbounded.
    #[must_use]
    pub fn levels(&self, side: Side) -> Vec<(Price, Quantity)> {
        let state = self.state.lock();
        match side {
            Side::Bid => state.bids.iter().rev().map(|(&p, &q)| (p, q)).collect(),
            Side::Ask => state.asks.iter().map(|(&p, &q)| (p, q)).collect(),
        }
    }

    /// Number of registered subscriptions, including not-yet-pruned entries.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}

// =============================================================================
// Book Manager
// =============================================================================

/// Raised when an instrument id has no configured book.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown instrument id {0}")]
pub struct UnknownInstrument(pub InstrumentId);

/// Constant instrument-id → book mapping, built once at startup.
#[derive(Debug)]
pub struct BookManager {
    books: HashMap<InstrumentId, OrderBook>,
}

impl BookManager {
    /// Build one book per configured `(instrument id, depth)` pair.
    #[must_use]
    pub fn new(instruments: impl IntoIterator<Item = (InstrumentId, Depth)>) -> Self {
        let books = instruments
            .into_iter()
            .map(|(id, depth)| (id, OrderBook::new(id, depth)))
            .collect();
        Self { books }
    }

    /// Resolve an instrument id to its book.
    ///
    /// # Errors
    ///
    /// [`UnknownInstrument`] when the id was not configured.
    pub fn book(&self, id: InstrumentId) -> Result<&OrderBook, UnknownInstrument> {
        self.books.get(&id).ok_or(UnknownInstrument(id))
    }

    /// Number of configured instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether no instruments are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::SessionKey;

    fn event(side: Side, kind: EventKind, price: Price, quantity: Quantity) -> MarketEvent {
        MarketEvent {
            instrument_id: 1,
            side,
            kind,
            price,
            quantity,
            exchange_ts: 0,
        }
    }

    fn add(side: Side, price: Price, quantity: Quantity) -> MarketEvent {
        event(side, EventKind::AddLevel, price, quantity)
    }

    fn reduce(side: Side, price: Price, quantity: Quantity) -> MarketEvent {
        event(side, EventKind::ReduceLevel, price, quantity)
    }

    #[test]
    fn add_accumulates_quantity() {
        let book = OrderBook::new(1, 8);
        book.apply_and_publish(&add(Side::Bid, 100, 5));
        book.apply_and_publish(&add(Side::Bid, 100, 3));

        assert_eq!(book.levels(Side::Bid), vec![(100, 8)]);
    }

    #[test]
    fn reduce_subtracts_and_erases() {
        let book = OrderBook::new(1, 8);
        book.apply_and_publish(&add(Side::Ask, 101, 10));

        book.apply_and_publish(&reduce(Side::Ask, 101, 4));
        assert_eq!(book.levels(Side::Ask), vec![(101, 6)]);

        book.apply_and_publish(&reduce(Side::Ask, 101, 6));
        assert!(book.levels(Side::Ask).is_empty());
    }

    #[test]
    fn reduce_beyond_resting_erases() {
        let book = OrderBook::new(1, 8);
        book.apply_and_publish(&add(Side::Bid, 100, 5));
        book.apply_and_publish(&reduce(Side::Bid, 100, 50));

        assert!(book.levels(Side::Bid).is_empty());
    }

    #[test]
    fn reduce_on_missing_level_is_ignored() {
        let book = OrderBook::new(1, 8);
        book.apply_and_publish(&reduce(Side::Bid, 100, 5));

        assert!(book.levels(Side::Bid).is_empty());
    }

    #[test]
    fn no_level_ever_holds_zero_quantity() {
        let book = OrderBook::new(1, 8);
        let events = [
            add(Side::Bid, 100, 5),
            add(Side::Bid, 99, 2),
            reduce(Side::Bid, 100, 5),
            add(Side::Ask, 101, 1),
            reduce(Side::Ask, 101, 1),
            reduce(Side::Bid, 99, 7),
        ];
        for e in &events {
            book.apply_and_publish(e);
        }

        for side in [Side::Bid, Side::Ask] {
            assert!(book.levels(side).iter().all(|&(_, q)| q > 0));
        }
    }

    #[test]
    fn levels_follow_market_depth_order() {
        let book = OrderBook::new(1, 8);
        for price in [98, 100, 99] {
            book.apply_and_publish(&add(Side::Bid, price, 1));
            book.apply_and_publish(&add(Side::Ask, price + 10, 1));
        }

        let bid_prices: Vec<Price> = book.levels(Side::Bid).iter().map(|&(p, _)| p).collect();
        let ask_prices: Vec<Price> = book.levels(Side::Ask).iter().map(|&(p, _)| p).collect();

        assert_eq!(bid_prices, vec![100, 99, 98]);
        assert_eq!(ask_prices, vec![108, 109, 110]);
    }

    #[test]
    fn snapshot_is_depth_bounded() {
        let book = OrderBook::new(1, 2);
        for price in 1..=5 {
            book.apply_and_publish(&add(Side::Bid, price, 1));
            book.apply_and_publish(&add(Side::Ask, 100 + price, 1));
        }

        let (bids, asks) = book.snapshot();
        assert_eq!(
            bids.iter().map(|l| l.price).collect::<Vec<_>>(),
            vec![5, 4]
        );
        assert_eq!(
            asks.iter().map(|l| l.price).collect::<Vec<_>>(),
            vec![101, 102]
        );
        assert!(bids.iter().all(|l| l.side == Side::Bid));
        assert!(asks.iter().all(|l| l.side == Side::Ask));
    }

    #[test]
    fn snapshot_precedes_fanned_out_increments() {
        let book = OrderBook::new(1, 8);
        book.apply_and_publish(&add(Side::Bid, 100, 5));

        let (subscriber, mut rx) = Subscriber::new(1, SessionKey::generate(), [1]);
        book.init_subscription(&subscriber);
        book.apply_and_publish(&add(Side::Bid, 100, 2));

        let first = rx.try_recv().unwrap();
        match first.as_ref() {
            BookUpdate::Snapshot { bids, .. } => {
                assert_eq!(bids.len(), 1);
                assert_eq!((bids[0].price, bids[0].quantity), (100, 5));
            }
            BookUpdate::Incremental { .. } => panic!("increment arrived before snapshot"),
        }

        let second = rx.try_recv().unwrap();
        match second.as_ref() {
            BookUpdate::Incremental { event, .. } => {
                assert_eq!((event.price, event.quantity), (100, 2));
            }
            BookUpdate::Snapshot { .. } => panic!("expected an incremental update"),
        }
    }

    #[test]
    fn fan_out_reaches_every_subscriber() {
        let book = OrderBook::new(1, 8);
        let (first, mut first_rx) = Subscriber::new(1, SessionKey::generate(), [1]);
        let (second, mut second_rx) = Subscriber::new(2, SessionKey::generate(), [1]);
        book.init_subscription(&first);
        book.init_subscription(&second);

        book.apply_and_publish(&add(Side::Ask, 101, 3));

        for rx in [&mut first_rx, &mut second_rx] {
            let snapshot = rx.try_recv().unwrap();
            assert!(matches!(snapshot.as_ref(), BookUpdate::Snapshot { .. }));
            let update = rx.try_recv().unwrap();
            assert!(matches!(update.as_ref(), BookUpdate::Incremental { .. }));
        }
    }

    #[test]
    fn dead_subscribers_are_pruned_on_fan_out() {
        let book = OrderBook::new(1, 8);
        let (subscriber, rx) = Subscriber::new(1, SessionKey::generate(), [1]);
        book.init_subscription(&subscriber);
        assert_eq!(book.subscription_count(), 1);

        drop(rx);
        drop(subscriber);

        book.apply_and_publish(&add(Side::Bid, 100, 1));
        assert_eq!(book.subscription_count(), 0);
    }

    #[test]
    fn cancel_subscription_stops_delivery() {
        let book = OrderBook::new(1, 8);
        let (subscriber, mut rx) = Subscriber::new(1, SessionKey::generate(), [1]);
        book.init_subscription(&subscriber);
        let _ = rx.try_recv().unwrap();

        book.cancel_subscription(subscriber.id());
        book.apply_and_publish(&add(Side::Bid, 100, 1));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn manager_resolves_configured_instruments() {
        let manager = BookManager::new([(1, 8), (2, 4)]);

        assert_eq!(manager.len(), 2);
        assert_eq!(manager.book(1).unwrap().depth(), 8);
        assert_eq!(manager.book(2).unwrap().id(), 2);
        assert_eq!(manager.book(3).unwrap_err(), UnknownInstrument(3));
    }
}
