//! Client error types.

use thiserror::Error;

/// Errors produced by the HTTP pipeline, including interceptor failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code.
    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Interceptor '{name}' failed: {message}")]
    Interceptor { name: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn interceptor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Interceptor {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }
}
