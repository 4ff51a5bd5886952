//! PKI client errors

use thiserror::Error;

/// Errors that can occur when interacting with the PKI API
#[derive(Debug, Error)]
pub enum PkiError {
    /// HTTP request/response error (connection, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials were refused
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The PKI understood the request and refused it
    #[error("PKI rejected the request ({code}): {message}")]
    Rejected {
        /// PKI error code (e.g., "RE-REVOKE-003")
        code: String,
        /// PKI error message
        message: String,
    },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client configuration is unusable (bad URL, CA bundle, credentials)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The PKI answered with something we cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PkiError {
    /// Whether the PKI itself refused the request with a structured error
    pub fn is_rejection(&self) -> bool {
        matches!(self, PkiError::Rejected { .. })
    }
}
