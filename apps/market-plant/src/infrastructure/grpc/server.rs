//! Plant Server Implementation
//!
//! Implements the `MarketPlantService` RPCs on top of the book manager and
//! the subscriber registry.
//!
//! Each `StreamUpdates` call:
//!
//! 1. Allocates a subscriber id and a random session key
//! 2. Registers the subscriber and initialises each requested book
//!    subscription (which enqueues the snapshot under the book mutex)
//! 3. Writes the init frame, then forwards queued updates until the peer
//!    disconnects or the subscription set empties
//! 4. Removes the subscriber from the registry on exit

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use super::proto::market_plant::v1::{
    self as proto, StreamResponse, Subscription, UpdateSubscriptionsRequest,
    UpdateSubscriptionsResponse, market_plant_service_server::MarketPlantService,
    stream_response, subscription,
};
use crate::domain::book::{BookManager, OrderBook};
use crate::domain::market::{BookLevel, BookUpdate, EventKind, MarketEvent, Side};
use crate::domain::subscription::{SessionKey, Subscriber, SubscriberRegistry};

/// Buffer between the writer task and tonic's transport.
const STREAM_BUFFER: usize = 256;

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

// =============================================================================
// Server Implementation
// =============================================================================

/// gRPC surface of the plant.
pub struct MarketPlantServer {
    books: Arc<BookManager>,
    registry: Arc<SubscriberRegistry>,
}

impl MarketPlantServer {
    /// Create a server over the given books.
    #[must_use]
    pub fn new(books: Arc<BookManager>) -> Self {
        Self {
            books,
            registry: Arc::new(SubscriberRegistry::new()),
        }
    }

    /// The subscriber registry, shared with the streaming tasks.
    #[must_use]
    pub fn registry(&self) -> Arc<SubscriberRegistry> {
        Arc::clone(&self.registry)
    }

    /// Resolve every id in the set, failing fast on an unknown instrument.
    fn resolve_books(&self, ids: &[u32]) -> Result<Vec<&OrderBook>, Status> {
        ids.iter()
            .map(|&id| {
                self.books
                    .book(id)
                    .map_err(|error| Status::invalid_argument(error.to_string()))
            })
            .collect()
    }
}

#[tonic::async_trait]
impl MarketPlantService for MarketPlantServer {
    type StreamUpdatesStream = BoxedStream<StreamResponse>;

    async fn stream_updates(
        &self,
        request: Request<Subscription>,
    ) -> StreamResult<Self::StreamUpdatesStream> {
        let Some(subscription::Change::Subscribe(instruments)) = request.into_inner().change
        else {
            return Err(Status::invalid_argument(
                "stream request must carry a subscribe set",
            ));
        };

        let mut ids = instruments.ids;
        ids.sort_unstable();
        ids.dedup();
        let books = self.resolve_books(&ids)?;

        let subscriber_id = self.registry.allocate_id();
        let session_key = SessionKey::generate();
        let init = init_frame(subscriber_id, &session_key);
        let (subscriber, mut updates) =
            Subscriber::new(subscriber_id, session_key, ids.iter().copied());
        self.registry.insert(&subscriber);

        for book in books {
            book.init_subscription(&subscriber);
        }
        tracing::info!(subscriber_id, instruments = ids.len(), "stream opened");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let registry = Arc::clone(&self.registry);
        let halted = subscriber.halted();

        tokio::spawn(async move {
            if tx.send(Ok(init)).await.is_ok() {
                loop {
                    tokio::select! {
                        () = halted.cancelled() => break,
                        // The transport dropped the stream: the peer is gone.
                        () = tx.closed() => break,
                        next = updates.recv() => {
                            let Some(update) = next else { break };
                            if tx.send(Ok(stream_frame(&update))).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            registry.remove(subscriber.id());
            tracing::info!(subscriber_id = subscriber.id(), "stream closed");
            // Dropping the last strong reference lets the books prune their
            // weak entries on the next fan-out.
        });

        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::StreamUpdatesStream
        ))
    }

    async fn update_subscriptions(
        &self,
        request: Request<UpdateSubscriptionsRequest>,
    ) -> StreamResult<UpdateSubscriptionsResponse> {
        let request = request.into_inner();

        let subscriber = self
            .registry
            .lookup(request.subscriber_id)
            .map_err(|error| Status::not_found(error.to_string()))?;

        if !subscriber.session_key().matches(&request.session_key) {
            return Err(Status::permission_denied("session key does not match"));
        }

        let Some(change) = request.change.and_then(|subscription| subscription.change) else {
            return Err(Status::invalid_argument(
                "request must carry a subscribe or unsubscribe set",
            ));
        };

        match change {
            subscription::Change::Subscribe(instruments) => {
                for id in instruments.ids {
                    let book = self
                        .books
                        .book(id)
                        .map_err(|error| Status::invalid_argument(error.to_string()))?;
                    // Only a newly added instrument gets a snapshot; resubscribing
                    // must not replay one mid-stream.
                    if subscriber.subscribe(id) {
                        book.init_subscription(&subscriber);
                        tracing::debug!(
                            subscriber_id = subscriber.id(),
                            instrument_id = id,
                            "subscription added"
                        );
                    }
                }
            }
            subscription::Change::Unsubscribe(instruments) => {
                for id in instruments.ids {
                    let book = self
                        .books
                        .book(id)
                        .map_err(|error| Status::invalid_argument(error.to_string()))?;
                    book.cancel_subscription(subscriber.id());
                    subscriber.unsubscribe(id);
                    tracing::debug!(
                        subscriber_id = subscriber.id(),
                        instrument_id = id,
                        "subscription removed"
                    );
                }
            }
        }

        Ok(Response::new(UpdateSubscriptionsResponse {}))
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

fn init_frame(subscriber_id: u32, session_key: &SessionKey) -> StreamResponse {
    StreamResponse {
        payload: Some(stream_response::Payload::Init(proto::SessionInit {
            subscriber_id,
            session_key: session_key.as_bytes().to_vec(),
        })),
    }
}

fn side_to_proto(side: Side) -> i32 {
    match side {
        Side::Bid => proto::Side::Bid as i32,
        Side::Ask => proto::Side::Ask as i32,
    }
}

fn kind_to_proto(kind: EventKind) -> i32 {
    match kind {
        EventKind::AddLevel => proto::LevelEventType::AddLevel as i32,
        EventKind::ReduceLevel => proto::LevelEventType::ReduceLevel as i32,
    }
}

fn event_to_proto(event: &MarketEvent) -> proto::BookEvent {
    proto::BookEvent {
        kind: kind_to_proto(event.kind),
        level: Some(proto::PriceLevel {
            side: side_to_proto(event.side),
            price: event.price,
            quantity: event.quantity,
        }),
        exchange_ts: event.exchange_ts,
    }
}

fn level_to_proto(level: &BookLevel) -> proto::BookEvent {
    proto::BookEvent {
        kind: proto::LevelEventType::AddLevel as i32,
        level: Some(proto::PriceLevel {
            side: side_to_proto(level.side),
            price: level.price,
            quantity: level.quantity,
        }),
        exchange_ts: 0,
    }
}

fn stream_frame(update: &BookUpdate) -> StreamResponse {
    let book_update = match update {
        BookUpdate::Snapshot {
            instrument_id,
            bids,
            asks,
        } => proto::OrderBookUpdate {
            instrument_id: *instrument_id,
            kind: Some(proto::order_book_update::Kind::Snapshot(
                proto::SnapshotUpdate {
                    bids: bids.iter().map(level_to_proto).collect(),
                    asks: asks.iter().map(level_to_proto).collect(),
                },
            )),
        },
        BookUpdate::Incremental {
            instrument_id,
            event,
        } => proto::OrderBookUpdate {
            instrument_id: *instrument_id,
            kind: Some(proto::order_book_update::Kind::Incremental(
                proto::IncrementalUpdate {
                    update: Some(event_to_proto(event)),
                },
            )),
        },
    };

    StreamResponse {
        payload: Some(stream_response::Payload::Update(book_update)),
    }
}

// =============================================================================
// Tests
// =============================================================================
