//! Infrastructure layer - wire protocol, sockets, configuration and RPC.

/// Big-endian wire codec and packet framing.
pub mod wire;

/// Sequenced receiver and the UDP feed loop.
pub mod feed;

/// Environment, instrument-file and CLI configuration.
pub mod config;

/// gRPC server and vendored protobuf stubs.
pub mod grpc;
