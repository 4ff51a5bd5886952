//! PkiClient trait for mocking
//!
//! The concrete PkiClient implements this trait; the controller only ever
//! sees `dyn PkiClientTrait`, so tests can substitute the in-memory mock.

use crate::credentials::{ClientConfig, Credentials};
use crate::error::PkiError;
use crate::models::{EnrollRequest, PkiRequest, RevocationReason};
use std::sync::Arc;

/// Trait for PKI API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait PkiClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Authenticated no-op call used as a health probe
    async fn check_health(&self) -> Result<(), PkiError>;

    /// Submits an enrollment, returns the PKI request id
    async fn submit_enroll(&self, request: &EnrollRequest) -> Result<String, PkiError>;

    /// Submits a renewal of `certificate_id`, returns the PKI request id
    async fn submit_renew(&self, certificate_id: &str, csr: &str) -> Result<String, PkiError>;

    /// Fetches the current state of a request
    async fn poll_status(&self, request_id: &str) -> Result<PkiRequest, PkiError>;

    /// Revokes a certificate
    async fn revoke(&self, certificate_pem: &str, reason: RevocationReason) -> Result<(), PkiError>;
}

/// Builds clients from transport settings and credentials
pub trait PkiClientFactory: Send + Sync {
    /// Build a client
    fn build(
        &self,
        config: &ClientConfig,
        credentials: Credentials,
    ) -> Result<Arc<dyn PkiClientTrait>, PkiError>;
}
