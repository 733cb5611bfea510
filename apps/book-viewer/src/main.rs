//! Book Viewer Binary
//!
//! Subscribes to the plant's update stream and renders a live bid/ask depth
//! ladder in the terminal.
//!
//! # Environment Variables
//!
//! - `GRPC_HOST`: plant host (default: 127.0.0.1)
//! - `GRPC_PORT`: plant port (default: 50051)
//! - `INSTRUMENT_IDS`: comma-separated instrument ids (default: 1)
//! - `DISPLAY_DEPTH`: ladder rows per side (default: 10)

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use market_plant::proto::{
    market_plant_service_client::MarketPlantServiceClient, order_book_update, stream_response,
    BookEvent, InstrumentIds, LevelEventType, Side, Subscription, subscription,
};

/// One instrument's locally mirrored ladder.
#[derive(Debug, Default)]
struct Ladder {
    bids: BTreeMap<u32, u32>,
    asks: BTreeMap<u32, u32>,
}

impl Ladder {
    fn apply(&mut self, event: &BookEvent) {
        let Some(level) = event.level else { return };
        let levels = match level.side() {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
            Side::Unspecified => return,
        };

        match event.kind() {
            LevelEventType::AddLevel => {
                *levels.entry(level.price).or_insert(0) += level.quantity;
            }
            LevelEventType::ReduceLevel => {
                let Some(resting) = levels.get_mut(&level.price) else {
                    return;
                };
                if level.quantity >= *resting {
                    levels.remove(&level.price);
                } else {
                    *resting -= level.quantity;
                }
            }
            LevelEventType::LevelEventUnspecified => {}
        }
    }

    fn reset(&mut self, bids: &[BookEvent], asks: &[BookEvent]) {
        self.bids.clear();
        self.asks.clear();
        for event in bids.iter().chain(asks) {
            self.apply(event);
        }
    }

    fn render(&self, instrument_id: u32, depth: usize, out: &mut String) {
        let _ = writeln!(out, "instrument {instrument_id}");
        let _ = writeln!(out, "   BIDS (Price | Qty)       |   ASKS (Price | Qty)");
        let _ = writeln!(out, "----------------------------+-----------------------------");

        let mut bids = self.bids.iter().rev();
        let mut asks = self.asks.iter();

        for _ in 0..depth {
            match bids.next() {
                Some((price, quantity)) => {
                    let _ = write!(out, "{price:>8} | {quantity:>8}");
                }
                None => {
                    let _ = write!(out, "{:>8} | {:>8}", "-", "-");
                }
            }
            let _ = write!(out, "        |   ");
            match asks.next() {
                Some((price, quantity)) => {
                    let _ = writeln!(out, "{price:>8} | {quantity:>8}");
                }
                None => {
                    let _ = writeln!(out, "{:>8} | {:>8}", "-", "-");
                }
            }
        }
        let _ = writeln!(out, "----------------------------+-----------------------------");
    }
}

fn instrument_ids_from_env() -> Vec<u32> {
    std::env::var("INSTRUMENT_IDS")
        .unwrap_or_else(|_| "1".to_string())
        .split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let host = std::env::var("GRPC_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("GRPC_PORT").unwrap_or_else(|_| "50051".to_string());
    let depth: usize = std::env::var("DISPLAY_DEPTH")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(10);
    let instrument_ids = instrument_ids_from_env();

    let mut client = MarketPlantServiceClient::connect(format!("http://{host}:{port}")).await?;
    let mut stream = client
        .stream_updates(Subscription {
            change: Some(subscription::Change::Subscribe(InstrumentIds {
                ids: instrument_ids.clone(),
            })),
        })
        .await?
        .into_inner();

    let mut ladders: HashMap<u32, Ladder> = HashMap::new();

    while let Some(response) = stream.message().await? {
        match response.payload {
            Some(stream_response::Payload::Init(init)) => {
                println!(
                    "subscriber {} watching instruments {instrument_ids:?}",
                    init.subscriber_id
                );
            }
            Some(stream_response::Payload::Update(update)) => {
                let ladder = ladders.entry(update.instrument_id).or_default();
                match update.kind {
                    Some(order_book_update::Kind::Snapshot(snapshot)) => {
                        ladder.reset(&snapshot.bids, &snapshot.asks);
                    }
                    Some(order_book_update::Kind::Incremental(incremental)) => {
                        if let Some(event) = incremental.update {
                            ladder.apply(&event);
                        }
                    }
                    None => continue,
                }
                redraw(&ladders, depth);
            }
            None => {}
        }
    }

    Ok(())
}

fn redraw(ladders: &HashMap<u32, Ladder>, depth: usize) {
    let mut out = String::from("\x1b[2J\x1b[H");
    let mut ids: Vec<u32> = ladders.keys().copied().collect();
    ids.sort_unstable();

    for id in ids {
        if let Some(ladder) = ladders.get(&id) {
            ladder.render(id, depth, &mut out);
        }
    }
    print!("{out}");
}
