//! FX error types.

use thiserror::Error;

/// Reasons a rate source or the cache store could not deliver.
///
/// None of these reach callers of the resolver; providers and the cache
/// classify and log them, then report the source as unavailable.
#[derive(Debug, Error)]
pub enum FxError {
    /// Network-level failure (connect, TLS, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status.
    #[error("Provider returned HTTP {0}")]
    HttpStatus(u16),

    /// Attempt exceeded its time bound.
    #[error("Request timed out")]
    Timeout,

    /// Body was not the expected JSON shape, or reported failure.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Payload parsed but carried no usable rate.
    #[error("Missing rate field: {0}")]
    MissingRate(&'static str),

    /// Rate present but not a finite positive number.
    #[error("Invalid rate value: {0}")]
    InvalidRate(f64),

    /// Provider lacks configuration it needs (endpoint, credential).
    #[error("Provider not configured: {0}")]
    NotConfigured(&'static str),

    /// Cache store I/O failure.
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Cache blob could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FxError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FxError::Timeout
        } else if e.is_decode() {
            FxError::MalformedPayload(e.to_string())
        } else if let Some(status) = e.status() {
            FxError::HttpStatus(status.as_u16())
        } else {
            FxError::Transport(e.to_string())
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
