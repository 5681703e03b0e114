//! Error types for the TorBox SDK.

use http::StatusCode;
use thiserror::Error;

/// Errors produced by an [`HttpClient`](crate::HttpClient) backend.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other backend failure.
    #[error("http client error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors returned by [`TorboxClient`](crate::TorboxClient) operations.
#[derive(Debug, Error)]
pub enum TorboxError {
    /// The transport failed before a response was received.
    #[error(transparent)]
    Http(#[from] HttpClientError),

    /// The API answered with a non-success status.
    #[error("API returned HTTP {status}: {detail}")]
    Api {
        /// The HTTP status code.
        status: StatusCode,
        /// The `detail` field of the error envelope, or the raw body.
        detail: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Every attempt allowed by the retry policy failed.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// The number of attempts made.
        attempts: u32,
        /// The error observed on the final attempt.
        last: Box<TorboxError>,
    },

    /// A ranged download returned a body of the wrong length.
    #[error("range request returned {got} bytes, expected {expected}")]
    ShortBody {
        /// The requested byte count.
        expected: u64,
        /// The byte count actually received.
        got: u64,
    },

    /// A request could not be constructed from the given arguments.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TorboxError {
    /// Returns `true` if the error is worth retrying under the retry policy.
    ///
    /// Only rate limiting and transport failures qualify; any other HTTP status is final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == StatusCode::TOO_MANY_REQUESTS,
            Self::Decode(_)
            | Self::RetriesExhausted { .. }
            | Self::ShortBody { .. }
            | Self::InvalidRequest(_) => false,
        }
    }
}
