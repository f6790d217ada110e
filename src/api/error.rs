//! API-client error types.

use thiserror::Error;

/// Result type for platform API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A transport-level failure, before any HTTP status is available.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),
}

/// Errors that can occur talking to the tabular platform.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-retryable (or retry-exhausted) HTTP status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Transport failure after the retry ceiling.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The platform reported an error inside a 200 response body.
    #[error("platform error: {message}")]
    Platform { message: String },

    /// Response body did not match the documented shape.
    #[error("invalid response shape: {0}")]
    InvalidShape(String),

    /// Response body was not valid JSON for the expected type.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Statuses the retry policy covers; everything else propagates immediately.
pub fn retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
