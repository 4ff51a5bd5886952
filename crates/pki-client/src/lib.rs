//! PKI REST API Client
//!
//! A Rust client library for the enrollment PKI used by the PKIops issuer.
//! Provides typed models and methods for the request workflows (enroll,
//! renew, revoke), request polling and an authenticated health probe.
//!
//! # Example
//!
//! ```no_run
//! use pki_client::{ClientConfig, Credentials, EnrollRequest, PkiClient, PkiClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PkiClient::new(
//!     &ClientConfig::new("https://pki.example.com"),
//!     Credentials::Password {
//!         username: "svc-k8s".to_string(),
//!         password: "secret".to_string(),
//!     },
//! )?;
//!
//! client.check_health().await?;
//!
//! let request_id = client
//!     .submit_enroll(&EnrollRequest {
//!         profile: "kubernetes".to_string(),
//!         csr: "-----BEGIN CERTIFICATE REQUEST-----...".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let request = client.poll_status(&request_id).await?;
//! println!("{} is {}", request.id, request.status);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod credentials;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod pki_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{HttpPkiClientFactory, PkiClient};
pub use credentials::{ClientConfig, Credentials};
pub use error::PkiError;
pub use models::*;
pub use pki_trait::{PkiClientFactory, PkiClientTrait};
#[cfg(feature = "test-util")]
pub use mock::{MockCall, MockPkiClient, MockPkiClientFactory, Operation};
