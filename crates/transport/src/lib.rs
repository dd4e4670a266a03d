//! Duplex wire envelopes
//!
//! Every message on the edge connection is a JSON object with an `event`
//! discriminator and the payload fields inlined. Audio travels inside the
//! JSON envelope, base64-encoded, alongside its format hint and ordering
//! metadata.

pub mod envelope;

pub use envelope::{AudioStreamPayload, ClientEvent, ServerEvent};

use thiserror::Error;

/// Transport-layer errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Connection closed")]
    Closed,

    #[error("Send queue full")]
    QueueFull,
}

/// Decode one inbound frame.
pub fn decode(frame: &str) -> Result<ClientEvent, TransportError> {
    Ok(serde_json::from_str(frame)?)
}

/// Encode one outbound frame.
pub fn encode(event: &ServerEvent) -> Result<String, TransportError> {
    Ok(serde_json::to_string(event)?)
}
