//! Simulator Configuration
//!
//! Everything comes from environment variables so the simulator can be
//! pointed at any plant without a config file.
//!
//! | Variable | Default |
//! |---|---|
//! | `PLANT_IP` | `127.0.0.1` |
//! | `PLANT_PORT` | `9001` |
//! | `EXCHANGE_PORT` | `9000` |
//! | `CHANCE_OF_ADD` | `55` |
//! | `CHANCE_OF_DELETE` | `50` |
//! | `CHANCE_OF_NEW_PRICE` | `50` |
//! | `MIN_INTERVAL_MS` / `MAX_INTERVAL_MS` | `50` / `100` |
//! | `MIN_INSTRUMENT_ID` / `MAX_INSTRUMENT_ID` | `1` / `1` |
//! | `MIN_PRICE` / `MAX_PRICE` | `1` / `100` |
//! | `MIN_QUANTITY` / `MAX_QUANTITY` | `1` / `100` |

use std::str::FromStr;

use thiserror::Error;

/// A badly formed environment variable.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {name}")]
pub struct ConfigError {
    /// Variable name.
    pub name: &'static str,
    /// Offending value.
    pub value: String,
}

fn env_parse<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError { name, value }),
        Err(_) => Ok(default),
    }
}

/// Simulator tunables: where to send, and what the synthetic market looks
/// like. Chances are percentages rolled against 1..=100.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Plant address datagrams are sent to.
    pub plant_ip: String,
    /// Plant port datagrams are sent to.
    pub plant_port: u16,
    /// Local port the simulator binds for retransmit requests.
    pub exchange_port: u16,

    /// Chance a generated event adds rather than reduces.
    pub chance_of_add: u32,
    /// Chance a reduce removes the whole level.
    pub chance_of_delete: u32,
    /// Chance an add opens a new price level.
    pub chance_of_new_price: u32,

    /// Shortest pause between generated events, milliseconds.
    pub min_interval_ms: u64,
    /// Longest pause between generated events, milliseconds.
    pub max_interval_ms: u64,

    /// Lowest instrument id generated.
    pub min_instrument_id: u32,
    /// Highest instrument id generated.
    pub max_instrument_id: u32,
    /// Lowest price generated.
    pub min_price: u32,
    /// Highest price generated.
    pub max_price: u32,
    /// Smallest quantity generated.
    pub min_quantity: u32,
    /// Largest quantity generated.
    pub max_quantity: u32,
}

impl ExchangeConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a set variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            plant_ip: std::env::var("PLANT_IP").unwrap_or_else(|_| "127.0.0.1".to_string()),
            plant_port: env_parse("PLANT_PORT", 9001)?,
            exchange_port: env_parse("EXCHANGE_PORT", 9000)?,

            chance_of_add: env_parse("CHANCE_OF_ADD", 55)?,
            chance_of_delete: env_parse("CHANCE_OF_DELETE", 50)?,
            chance_of_new_price: env_parse("CHANCE_OF_NEW_PRICE", 50)?,

            min_interval_ms: env_parse("MIN_INTERVAL_MS", 50)?,
            max_interval_ms: env_parse("MAX_INTERVAL_MS", 100)?,

            min_instrument_id: env_parse("MIN_INSTRUMENT_ID", 1)?,
            max_instrument_id: env_parse("MAX_INSTRUMENT_ID", 1)?,
            min_price: env_parse("MIN_PRICE", 1)?,
            max_price: env_parse("MAX_PRICE", 100)?,
            min_quantity: env_parse("MIN_QUANTITY", 1)?,
            max_quantity: env_parse("MAX_QUANTITY", 100)?,
        })
    }

    /// `ip:port` of the plant.
    #[must_use]
    pub fn plant_addr(&self) -> String {
        format!("{}:{}", self.plant_ip, self.plant_port)
    }

    /// Local `0.0.0.0:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.exchange_port)
    }
}
