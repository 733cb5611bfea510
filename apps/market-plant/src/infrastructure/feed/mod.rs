//! Exchange Feed
//!
//! Owns the UDP socket to the exchange and drives the sequenced receiver:
//! each delivered payload is parsed into a [`MarketEvent`] and applied to the
//! owning book, which fans the update out to subscribers synchronously.
//!
//! One feed task per plant; the receiver state machine is not shared.

pub mod receiver;

use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::domain::book::BookManager;
use crate::domain::market::MarketEvent;
use crate::infrastructure::config::PlantConfig;
use crate::infrastructure::wire;

pub use receiver::{
    PacketOutcome, ReceiverConfig, RecoveryState, RetransmitRequest, SequencedReceiver,
    RETRANSMIT_TIMEOUT,
};

/// Receive buffer size; comfortably above [`wire::PACKET_SIZE`].
const RECV_BUFFER_SIZE: usize = 512;

// =============================================================================
// Errors
// =============================================================================

/// Fatal feed-socket failures at startup.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The local market-side address could not be bound.
    #[error("failed to bind feed socket on {addr}")]
    Bind {
        /// Address we attempted to bind.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// The exchange address could not be connected.
    #[error("failed to connect feed socket to exchange at {addr}")]
    Connect {
        /// Address we attempted to connect.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Feed
// =============================================================================

/// The datagram ingest loop.
pub struct ExchangeFeed {
    socket: UdpSocket,
    receiver: SequencedReceiver,
    books: Arc<BookManager>,
}

impl ExchangeFeed {
    /// Bind the market-side socket and connect it to the exchange.
    ///
    /// # Errors
    ///
    /// [`FeedError::Bind`] / [`FeedError::Connect`] on socket setup failure;
    /// both are fatal for the plant.
    pub async fn connect(config: &PlantConfig, books: Arc<BookManager>) -> Result<Self, FeedError> {
        let market_addr = config.market_addr();
        let socket = UdpSocket::bind(market_addr.as_str())
            .await
            .map_err(|source| FeedError::Bind {
                addr: market_addr,
                source,
            })?;

        let exchange_addr = config.exchange_addr();
        socket
            .connect(exchange_addr.as_str())
            .await
            .map_err(|source| FeedError::Connect {
                addr: exchange_addr,
                source,
            })?;

        Ok(Self {
            socket,
            receiver: SequencedReceiver::new(ReceiverConfig::default()),
            books,
        })
    }

    /// The bound local address of the feed socket.
    ///
    /// # Errors
    ///
    /// Propagates the socket's `local_addr` error.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive datagrams until shutdown.
    ///
    /// Transient receive failures and malformed packets are logged and
    /// skipped; reliability is the receiver state machine's job.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("exchange feed started");
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = self.socket.recv(&mut buf) => match received {
                    // Zero-length reads are spurious wakeups.
                    Ok(0) => {}
                    Ok(len) => self.handle_datagram(&buf[..len]).await,
                    Err(error) => {
                        tracing::warn!(%error, "feed receive failed, retrying");
                    }
                },
            }
        }

        tracing::info!("exchange feed stopped");
    }

    async fn handle_datagram(&mut self, datagram: &[u8]) {
        let outcome = match self.receiver.handle_packet(datagram) {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%error, "dropping packet");
                return;
            }
        };

        if let Some(request) = outcome.request {
            tracing::debug!(
                start = request.start,
                count = request.count,
                "requesting retransmit"
            );
            if let Err(error) = self.socket.send(&request.encode()).await {
                // Best-effort: the next gap packet re-triggers the request.
                tracing::warn!(%error, "failed to send retransmit request");
            }
        }

        if let Some(range) = outcome.payload {
            match wire::parse_event(&datagram[range]) {
                Ok(event) => self.apply(&event),
                Err(error) => {
                    // A producer bug; the sequence was already consumed, so
                    // the stream keeps moving.
                    tracing::warn!(%error, "discarding malformed event payload");
                }
            }
        }
    }

    fn apply(&self, event: &MarketEvent) {
        match self.books.book(event.instrument_id) {
            Ok(book) => book.apply_and_publish(event),
            Err(error) => {
                tracing::warn!(instrument_id = event.instrument_id, %error, "event ignored");
            }
        }
    }
}
