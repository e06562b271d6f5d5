/*
[INPUT]:  Error sources (HTTP transport, API responses, auth, local IO)
[OUTPUT]: Structured error types with context and retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the fieldsync backend adapter
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: i32, message: String },

    /// Request was rejected even after a token refresh
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Local file access failed while preparing an upload
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http(_) | ApiError::InvalidResponse(_) => true,
            // Server-side failures are worth retrying; client errors are not.
            ApiError::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Api {
            code: status.as_u16() as i32,
            message: message.into(),
        }
    }
}

/// Result type alias for fieldsync API operations
pub type Result<T> = std::result::Result<T, ApiError>;
