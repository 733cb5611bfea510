//! Plant Configuration
//!
//! Network endpoints come from environment variables (with `.env` support);
//! the instrument universe comes from a JSON file passed on the command line.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |---|---|
//! | `GRPC_HOST` | `0.0.0.0` |
//! | `GRPC_PORT` | `50051` |
//! | `MARKET_IP` | `127.0.0.1` |
//! | `MARKET_PORT` | `9001` |
//! | `EXCHANGE_IP` | `127.0.0.1` |
//! | `EXCHANGE_PORT` | `9000` |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse.
    #[error("invalid value {value:?} for {name}")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// The instrument file could not be read.
    #[error("unable to read config file {path}")]
    Read {
        /// File path as given.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The instrument file is not valid JSON of the expected shape.
    #[error("unable to parse config file {path}")]
    Parse {
        /// File path as given.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// Environment settings
// =============================================================================

fn env_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value }),
        Err(_) => Ok(default),
    }
}

/// Network endpoints for the plant.
#[derive(Debug, Clone)]
pub struct PlantConfig {
    /// Host the gRPC server binds.
    pub grpc_host: String,
    /// Port the gRPC server binds.
    pub grpc_port: u16,
    /// Local address the feed socket binds.
    pub market_ip: String,
    /// Local port the feed socket binds.
    pub market_port: u16,
    /// Exchange address the feed socket connects to.
    pub exchange_ip: String,
    /// Exchange port the feed socket connects to.
    pub exchange_port: u16,
}

impl PlantConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidVar`] when a set variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            grpc_host: env_or("GRPC_HOST", "0.0.0.0"),
            grpc_port: env_parse("GRPC_PORT", 50051)?,
            market_ip: env_or("MARKET_IP", "127.0.0.1"),
            market_port: env_parse("MARKET_PORT", 9001)?,
            exchange_ip: env_or("EXCHANGE_IP", "127.0.0.1"),
            exchange_port: env_parse("EXCHANGE_PORT", 9000)?,
        })
    }

    /// `host:port` the gRPC server listens on.
    #[must_use]
    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.grpc_host, self.grpc_port)
    }

    /// `ip:port` the feed socket binds.
    #[must_use]
    pub fn market_addr(&self) -> String {
        format!("{}:{}", self.market_ip, self.market_port)
    }

    /// `ip:port` of the exchange the feed socket connects to.
    #[must_use]
    pub fn exchange_addr(&self) -> String {
        format!("{}:{}", self.exchange_ip, self.exchange_port)
    }
}

// =============================================================================
// Instrument file
// =============================================================================

/// Per-instrument trading specifications.
#[derive(Debug, Clone, Deserialize)]
pub struct Specifications {
    /// Maximum snapshot depth per side.
    pub depth: u64,
}

/// One configured instrument.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentSpec {
    /// Exchange-assigned instrument id.
    pub instrument_id: u32,
    /// Trading specifications.
    pub specifications: Specifications,
}

/// The instrument universe the plant serves.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentsConfig {
    /// Configured instruments.
    pub instruments: Vec<InstrumentSpec>,
}

impl InstrumentsConfig {
    /// The `(instrument id, depth)` pairs the book manager is built from.
    pub fn book_specs(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.instruments
            .iter()
            .map(|instrument| (instrument.instrument_id, instrument.specifications.depth as usize))
    }

    /// Load and parse the JSON instrument file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] when the file cannot be read,
    /// [`ConfigError::Parse`] when it is not the expected JSON shape.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

// =============================================================================
// CLI
// =============================================================================

/// Command-line interface of the plant binary.
#[derive(Debug, Parser)]
#[command(name = "market-plant", disable_version_flag = true)]
pub struct Cli {
    /// Path to the JSON instrument config file.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: PathBuf,
}

impl Cli {
    /// Parse `std::env::args`, exiting the process on help or usage errors.
    ///
    /// `-h`/`--help` prints usage and exits 0; anything malformed prints the
    /// error plus usage and exits 1.
    #[must_use]
    pub fn parse_or_exit() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(err) if err.kind() == clap::error::ErrorKind::DisplayHelp => {
                let _ = err.print();
                std::process::exit(0);
            }
            Err(err) => {
                let _ = err.print();
                std::process::exit(1);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
