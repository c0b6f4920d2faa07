//! Error types for scripter-rs.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The backend did not hand out a usable session id.
    #[error("session creation failed: {0}")]
    SessionCreation(String),

    /// The event stream could not be opened, broke, or closed early.
    #[error("stream transport error: {0}")]
    StreamTransport(String),

    /// The backend reported a failure on the event stream. Message is verbatim.
    #[error("{0}")]
    Protocol(String),

    /// The stream completed but never carried a structured idea.
    #[error("generation finished but generated_idea was not found")]
    ResultNotFound,

    #[error("generation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
