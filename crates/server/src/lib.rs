//! Conference translation relay server
//!
//! Provides the WebSocket edge and the HTTP control plane. The session
//! hub routes speaker transcripts into per-language pipelines and fans
//! text and audio back out to listeners.

pub mod http;
pub mod hub;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use hub::{Session, SessionHub};
pub use metrics::init_metrics;
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::WebSocket(_) | ServerError::InvalidRequest(_) => {
                axum::http::StatusCode::BAD_REQUEST
            }
            ServerError::Upstream(_) => axum::http::StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
