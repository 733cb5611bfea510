//! Market Plant Binary
//!
//! Starts the plant: the exchange feed and the gRPC streaming server.
//!
//! # Usage
//!
//! ```bash
//! market-plant -c instruments.json
//! ```
//!
//! # Environment Variables
//!
//! - `GRPC_HOST`: gRPC bind host (default: 0.0.0.0)
//! - `GRPC_PORT`: gRPC bind port (default: 50051)
//! - `MARKET_IP`: local feed bind address (default: 127.0.0.1)
//! - `MARKET_PORT`: local feed bind port (default: 9001)
//! - `EXCHANGE_IP`: exchange address (default: 127.0.0.1)
//! - `EXCHANGE_PORT`: exchange port (default: 9000)
//! - `RUST_LOG`: log filter (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use market_plant::proto::market_plant_service_server::MarketPlantServiceServer;
use market_plant::{BookManager, Cli, ExchangeFeed, InstrumentsConfig, MarketPlantServer, PlantConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the defaults cover local runs.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse_or_exit();
    let instruments = match InstrumentsConfig::load(&cli.config) {
        Ok(instruments) => instruments,
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(1);
        }
    };

    let config = PlantConfig::from_env()?;
    tracing::info!(
        grpc = %config.grpc_addr(),
        market = %config.market_addr(),
        exchange = %config.exchange_addr(),
        instruments = instruments.instruments.len(),
        "configuration loaded"
    );

    let books = Arc::new(BookManager::new(instruments.book_specs()));
    let shutdown = CancellationToken::new();

    // Bind/connect failures here are fatal.
    let feed = ExchangeFeed::connect(&config, Arc::clone(&books)).await?;
    let feed_shutdown = shutdown.clone();
    tokio::spawn(async move {
        feed.run(feed_shutdown).await;
    });

    let server = MarketPlantServer::new(books);
    let grpc_addr: SocketAddr = config.grpc_addr().parse()?;
    tracing::info!(addr = %grpc_addr, "gRPC server listening");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        await_shutdown(signal_shutdown).await;
    });

    Server::builder()
        .add_service(MarketPlantServiceServer::new(server))
        .serve_with_shutdown(grpc_addr, shutdown.cancelled())
        .await?;

    tracing::info!("market plant stopped");
    Ok(())
}

/// Wait for SIGTERM or SIGINT, then cancel the root token.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    shutdown.cancel();
}
