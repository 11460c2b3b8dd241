//! Error types for the IRC daemon

use thiserror::Error;

/// Main error type for the IRC daemon
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Listening socket could not be created; fatal at startup
    #[error("Failed to bind socket: {0}")]
    Bind(String),

    #[error("Message parsing error: {0}")]
    MessageParse(String),

    /// Nick lookup miss, carrying the argument as the caller spelled it
    #[error("No such nick/channel: {0}")]
    NoSuchNick(String),

    /// Channel lookup miss, carrying the argument as the caller spelled it
    #[error("No such channel: {0}")]
    NoSuchChannel(String),

    #[error("Unknown client: {0}")]
    UnknownClient(crate::client::ClientId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
