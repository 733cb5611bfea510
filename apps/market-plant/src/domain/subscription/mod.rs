//! Subscriber Management
//!
//! Tracks streaming subscribers: their instrument sets, their update queues,
//! and the session keys that authorise control-plane mutations.
//!
//! # Ownership
//!
//! The RPC writer task holds the only strong reference to a [`Subscriber`].
//! Books and the plant registry hold `Weak` handles: they need to know who
//! to notify, but must never keep a dead stream alive. Dangling weak entries
//! are pruned lazily; books prune on fan-out, the registry prunes on lookup.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::market::{BookUpdate, InstrumentId, SubscriberId};

/// Length of a subscriber session key.
pub const SESSION_KEY_LENGTH: usize = 16;

// =============================================================================
// Session Keys
// =============================================================================

/// Opaque per-subscriber token authorising control-plane mutations.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_LENGTH]);

impl SessionKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// The raw key bytes, for the stream's init frame.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SESSION_KEY_LENGTH] {
        &self.0
    }

    /// Whether a presented key matches this one.
    #[must_use]
    pub fn matches(&self, presented: &[u8]) -> bool {
        presented == self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionKey").field(&"[REDACTED]").finish()
    }
}

// =============================================================================
// Subscriber
// =============================================================================

/// One streaming client: its subscription set and its outbound queue.
///
/// The queue is the sending half of an unbounded channel; the matching
/// receiver is drained by the stream's writer task. Enqueueing is therefore
/// non-blocking and safe while holding a book mutex, which is what preserves
/// the snapshot-before-increments guarantee.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    session_key: SessionKey,
    subscribed_to: Mutex<HashSet<InstrumentId>>,
    queue: mpsc::UnboundedSender<Arc<BookUpdate>>,
    halted: CancellationToken,
}

impl Subscriber {
    /// Create a subscriber with an initial instrument set.
    ///
    /// Returns the shared subscriber handle and the receiving half of its
    /// queue, which the stream writer owns.
    #[must_use]
    pub fn new(
        id: SubscriberId,
        session_key: SessionKey,
        instruments: impl IntoIterator<Item = InstrumentId>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<BookUpdate>>) {
        let (queue, updates) = mpsc::unbounded_channel();
        let subscriber = Arc::new(Self {
            id,
            session_key,
            subscribed_to: Mutex::new(instruments.into_iter().collect()),
            queue,
            halted: CancellationToken::new(),
        });
        // An initially empty set means the stream has nothing to deliver.
        if subscriber.subscribed_to.lock().is_empty() {
            subscriber.halted.cancel();
        }
        (subscriber, updates)
    }

    /// The subscriber's plant-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// The subscriber's session key.
    #[must_use]
    pub const fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// Add an instrument to the subscription set.
    ///
    /// Returns `true` iff the instrument was newly added; callers only
    /// initialise a book subscription (and deliver a snapshot) on `true`.
    pub fn subscribe(&self, id: InstrumentId) -> bool {
        self.subscribed_to.lock().insert(id)
    }

    /// Remove an instrument from the subscription set.
    ///
    /// An emptied set halts the subscriber: its stream has nothing left to
    /// deliver and terminates on the next wakeup.
    pub fn unsubscribe(&self, id: InstrumentId) {
        let mut subscribed = self.subscribed_to.lock();
        subscribed.remove(&id);
        if subscribed.is_empty() {
            self.halted.cancel();
        }
    }

    /// Whether the subscriber currently holds the instrument.
    #[must_use]
    pub fn is_subscribed(&self, id: InstrumentId) -> bool {
        self.subscribed_to.lock().contains(&id)
    }

    /// Number of instruments currently subscribed.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscribed_to.lock().len()
    }

    /// Append an update to the outbound queue.
    ///
    /// A closed queue means the writer task already exited; the update is
    /// dropped, and the stale book entries are pruned on the next fan-out.
    pub fn enqueue(&self, update: Arc<BookUpdate>) {
        let _ = self.queue.send(update);
    }

    /// Token cancelled when the subscription set empties.
    #[must_use]
    pub fn halted(&self) -> CancellationToken {
        self.halted.clone()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Lookup failures on the control plane.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    /// No subscriber was ever registered under the id.
    #[error("unknown subscriber id {0}")]
    Unknown(SubscriberId),
    /// The subscriber existed but its stream has since terminated.
    #[error("subscriber {0} has disconnected")]
    Expired(SubscriberId),
}

/// Plant-wide map of live subscribers.
///
/// Read path serves control-plane lookups; write path serves stream
/// open/close. Ids come from a monotonically increasing counter and are
/// never reused.
#[derive(Debug)]
pub struct SubscriberRegistry {
    next_id: AtomicU32,
    subscribers: RwLock<HashMap<SubscriberId, Weak<Subscriber>>>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate the next subscriber id.
    pub fn allocate_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a subscriber under its id.
    pub fn insert(&self, subscriber: &Arc<Subscriber>) {
        self.subscribers
            .write()
            .insert(subscriber.id(), Arc::downgrade(subscriber));
    }

    /// Remove a subscriber; called when its stream terminates.
    pub fn remove(&self, id: SubscriberId) {
        self.subscribers.write().remove(&id);
    }

    /// Resolve an id to a live subscriber.
    ///
    /// # Errors
    ///
    /// [`LookupError::Unknown`] for an id that was never registered;
    /// [`LookupError::Expired`] when the stream has terminated, in which
    /// case the stale entry is pruned.
    pub fn lookup(&self, id: SubscriberId) -> Result<Arc<Subscriber>, LookupError> {
        let weak = self
            .subscribers
            .read()
            .get(&id)
            .cloned()
            .ok_or(LookupError::Unknown(id))?;

        weak.upgrade().ok_or_else(|| {
            self.subscribers.write().remove(&id);
            LookupError::Expired(id)
        })
    }

    /// Number of registered subscribers, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether the registry holds no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
