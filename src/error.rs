//! Error types shared across the worker.
//!
//! `SdkError` is what every venue call returns. `ConfigError` covers the
//! environment/file surface, and `StartupError` wraps whichever step of the
//! one-time startup sequence failed. Everything in `StartupError` is fatal.

use thiserror::Error;

/// Failure reported by a venue client call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SdkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SdkError::Decode(e.to_string())
        } else if e.is_connect() || e.is_timeout() {
            SdkError::Connection(e.to_string())
        } else {
            SdkError::Api(e.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SdkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SdkError::Connection(e.to_string())
    }
}

/// Configuration errors. All of them abort startup before login.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required environment variable not set: {name}")]
    MissingEnv { name: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// A step of the startup sequence failed.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("login failed: {0}")]
    Login(#[source] SdkError),

    #[error("market catalog fetch failed: {0}")]
    Catalog(#[source] SdkError),

    #[error("failed to start {channel} channel: {source}")]
    ChannelStart {
        channel: &'static str,
        #[source]
        source: SdkError,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
