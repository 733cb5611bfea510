//! Exchange Simulator Binary
//!
//! The reference producer for the plant's wire protocol. Three concurrent
//! activities share one UDP socket and one event history:
//!
//! - **generator**: produces synthetic events, assigns sequence numbers
//! - **sender**: serialises queued events, one datagram each
//! - **retransmitter**: answers request packets by re-queueing history
//!
//! # Usage
//!
//! ```bash
//! exchange-simulator
//! ```
//!
//! Configuration is environment-only; see `config.rs` for the variables.

mod config;
mod simulator;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use market_plant::wire::{self, Session, HEADER_LENGTH, SESSION_LENGTH};

use crate::config::ExchangeConfig;
use crate::simulator::{request_matches_session, EventGenerator, EventHistory, QueuedPacket};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ExchangeConfig::from_env()?;

    let mut session: Session = [0u8; SESSION_LENGTH];
    rand::rng().fill(&mut session[..]);

    let socket = Arc::new(UdpSocket::bind(config.bind_addr()).await?);
    let plant_addr = config.plant_addr();
    tracing::info!(
        bind = %config.bind_addr(),
        plant = %plant_addr,
        "exchange simulator started"
    );

    let history = Arc::new(Mutex::new(EventHistory::new()));
    let (send_tx, send_rx) = mpsc::unbounded_channel::<QueuedPacket>();

    let generator = EventGenerator::new(config, StdRng::from_os_rng());
    let generator_history = Arc::clone(&history);
    let generator_tx = send_tx.clone();
    tokio::spawn(async move {
        run_generator(generator, generator_history, generator_tx).await;
    });

    let sender_socket = Arc::clone(&socket);
    tokio::spawn(async move {
        run_sender(sender_socket, plant_addr, session, send_rx).await;
    });

    let retransmit_history = Arc::clone(&history);
    tokio::spawn(async move {
        run_retransmitter(socket, session, retransmit_history, send_tx).await;
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("exchange simulator stopped");
    Ok(())
}

/// Produce events forever, recording each in the history before queueing it.
async fn run_generator(
    mut generator: EventGenerator,
    history: Arc<Mutex<EventHistory>>,
    send_tx: mpsc::UnboundedSender<QueuedPacket>,
) {
    loop {
        let event = generator.next_event();
        // The sequence is assigned under the history lock, so the recorded
        // stream and the emitted stream agree.
        let sequence = history.lock().record(event);

        if send_tx.send(QueuedPacket { sequence, event }).is_err() {
            return;
        }

        let pause = generator.next_interval_ms();
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
}

/// Drain the send queue, one datagram per event.
async fn run_sender(
    socket: Arc<UdpSocket>,
    plant_addr: String,
    session: Session,
    mut send_rx: mpsc::UnboundedReceiver<QueuedPacket>,
) {
    while let Some(packet) = send_rx.recv().await {
        let datagram = wire::encode_event_packet(&session, packet.sequence, &packet.event);
        if let Err(error) = socket.send_to(&datagram, plant_addr.as_str()).await {
            tracing::warn!(%error, sequence = packet.sequence, "send failed");
        }
    }
}

/// Answer retransmit requests by re-queueing recorded events.
async fn run_retransmitter(
    socket: Arc<UdpSocket>,
    session: Session,
    history: Arc<Mutex<EventHistory>>,
    send_tx: mpsc::UnboundedSender<QueuedPacket>,
) {
    let mut buf = [0u8; HEADER_LENGTH];

    loop {
        let len = match socket.recv_from(&mut buf).await {
            Ok((0, _)) => continue,
            Ok((len, _)) => len,
            Err(error) => {
                tracing::warn!(%error, "request receive failed, retrying");
                continue;
            }
        };

        let request = match wire::parse_packet_header(&buf[..len]) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(%error, "dropping malformed request");
                continue;
            }
        };

        if !request_matches_session(&request, &session) {
            continue;
        }

        let packets = history.lock().retransmits(&request);
        if packets.is_empty() {
            continue;
        }

        tracing::debug!(
            start = request.sequence_number,
            count = packets.len(),
            "retransmitting"
        );
        for packet in packets {
            if send_tx.send(packet).is_err() {
                return;
            }
        }
    }
}
