//! gRPC Streaming Server
//!
//! Exposes the plant's two RPCs: the server-streaming `StreamUpdates` feed
//! and the unary `UpdateSubscriptions` control plane.
//!
//! The protobuf stubs are vendored under `proto/`; regenerate them from
//! `proto/market_plant.proto` at the crate root when the schema changes.

pub mod server;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod market_plant {
        pub mod v1 {
            include!("proto/market_plant.v1.rs");
            include!("proto/market_plant.v1.tonic.rs");
        }
    }
}

pub use server::MarketPlantServer;
