//! Configuration loading from the environment plus an optional TOML file.
//!
//! Credentials and endpoints come from the environment (`.env` is loaded by
//! the binary first). Tunable limits live in the `[worker]` table of
//! `config.toml`; every field has a default, and a missing file means
//! "all defaults".

use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_EMAIL: &str = "EMAIL";
pub const ENV_PASSWORD: &str = "PASSWORD";
pub const ENV_GRAPHQL_URI: &str = "GRAPHQL_URI";
pub const ENV_CHANNELS_URI: &str = "CHANNELS_URI";

/// Lowest price the default strategy will draw.
pub const MIN_ORDER_PRICE: u32 = 100;
/// Lowest quantity the default strategy will draw.
pub const MIN_ORDER_QUANTITY: u32 = 1;
/// Longest forward window accepted for the market catalog query.
pub const MAX_MARKET_WINDOW_DAYS: i64 = 3650;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub endpoints: Endpoints,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub graphql_uri: String,
    pub channels_uri: String,
}

/// Limits for the control loop and the record sink.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Order attempts per open market per cycle.
    pub orders_per_market: u32,
    /// Exclusive upper bound for drawn prices.
    pub max_order_price: u32,
    /// Exclusive upper bound for drawn quantities.
    pub max_order_quantity: u32,
    /// Sleep at the top of each cycle.
    pub cycle_delay_ms: u64,
    /// Forward window for the market catalog query.
    pub market_window_days: i64,
    /// Capacity of the record queue.
    pub record_buffer: usize,
    pub keep_session_alive: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            orders_per_market: 100,
            max_order_price: 1000,
            max_order_quantity: 2,
            cycle_delay_ms: 1000,
            market_window_days: 7,
            record_buffer: 1024,
            keep_session_alive: true,
        }
    }
}

impl WorkerConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    /// Reject limits that would leave a draw range empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_order_price <= MIN_ORDER_PRICE {
            return Err(ConfigError::InvalidValue {
                field: "max_order_price",
                reason: format!("must be greater than {MIN_ORDER_PRICE}"),
            });
        }
        if self.max_order_quantity <= MIN_ORDER_QUANTITY {
            return Err(ConfigError::InvalidValue {
                field: "max_order_quantity",
                reason: format!("must be greater than {MIN_ORDER_QUANTITY}"),
            });
        }
        if !(1..=MAX_MARKET_WINDOW_DAYS).contains(&self.market_window_days) {
            return Err(ConfigError::InvalidValue {
                field: "market_window_days",
                reason: format!("must be between 1 and {MAX_MARKET_WINDOW_DAYS}"),
            });
        }
        if self.record_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "record_buffer",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    worker: WorkerConfig,
}

impl AppConfig {
    /// Load limits from `path` (optional) and secrets from the process environment.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => Some(c),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ConfigError::ReadFile {
                    path: path.to_string(),
                    source,
                })
            }
        };
        Self::from_sources(path, contents.as_deref(), |name| std::env::var(name).ok())
    }

    /// Build from already-read file contents and an environment lookup.
    pub fn from_sources<F>(path: &str, contents: Option<&str>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match contents {
            Some(c) => toml::from_str(c).map_err(|source| ConfigError::Parse {
                path: path.to_string(),
                source,
            })?,
            None => FileConfig::default(),
        };
        file.worker.validate()?;

        let require = |name: &'static str| -> Result<String, ConfigError> {
            env(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv { name })
        };

        Ok(Self {
            credentials: Credentials {
                email: require(ENV_EMAIL)?,
                password: SecretString::new(require(ENV_PASSWORD)?),
            },
            endpoints: Endpoints {
                graphql_uri: require(ENV_GRAPHQL_URI)?,
                channels_uri: require(ENV_CHANNELS_URI)?,
            },
            worker: file.worker,
        })
    }
}
