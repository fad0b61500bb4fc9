/*
[INPUT]:  Error sources (HTTP, upload API, serialization, cancellation)
[OUTPUT]: Structured error types with a cancellation check
[POS]:    Error handling layer - unified transfer error type for the crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for remote transfers
#[derive(Error, Debug)]
pub enum UploadError {
    /// The caller signaled the cancellation token
    #[error("transfer canceled")]
    Canceled,

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upload API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: u16, message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UploadError {
    /// Check if the transfer stopped because it was canceled
    pub fn is_canceled(&self) -> bool {
        matches!(self, UploadError::Canceled)
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        UploadError::Api {
            code: status.as_u16(),
            message: message.into(),
        }
    }
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, UploadError>;
