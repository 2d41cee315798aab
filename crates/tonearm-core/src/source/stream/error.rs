//! Streaming source error types

use thiserror::Error;

/// Errors from opening or running a network stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Stream request failed with HTTP status {0}")]
    Status(u16),

    #[error("Failed to read stream metadata: {0}")]
    Metadata(String),

    #[error("Stream decode failed: {0}")]
    Decode(String),

    #[error("Stream element was released")]
    Released,

    #[error("Failed to start stream thread: {0}")]
    Spawn(String),
}
