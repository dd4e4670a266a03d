//! Shared error type

use thiserror::Error;

/// Relay-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid session code: {0}")]
    InvalidSessionCode(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Relay-wide result alias
pub type Result<T> = std::result::Result<T, Error>;
