//! Error types for the DNS poisoning countermeasure.

use std::io;

use thiserror::Error;

/// Main error type for dnspoison operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("DNS protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid exempt resolver {value:?}: {reason}")]
    InvalidResolver { value: String, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Interface lifecycle errors returned by the registry.
///
/// None of these leave the registry in a modified state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("interface {0} already exists")]
    AlreadyExists(String),

    #[error("interface {0} does not exist")]
    NotFound(String),

    #[error("interface {0} is already running")]
    AlreadyRunning(String),
}

/// Network-related errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network interface {0:?} not found")]
    NoInterface(String),

    #[error("failed to open datalink channel: {0}")]
    ChannelOpen(String),

    #[error("unsupported channel type")]
    UnsupportedChannel,

    #[error("failed to send packet: {0}")]
    SendFailed(String),

    #[error("packet construction failed: {0}")]
    PacketConstruction(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
