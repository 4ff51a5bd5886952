//! Client configuration and credentials
//!
//! Credentials come from a Kubernetes Secret: a `kubernetes.io/tls` Secret
//! authenticates with its key pair, an `Opaque` Secret with a
//! username/password pair.

use crate::error::PkiError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Secret type carrying a client key pair
pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";
/// Secret type carrying a username/password pair
pub const SECRET_TYPE_OPAQUE: &str = "Opaque";

/// Transport settings of a PKI client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the PKI
    pub base_url: String,
    /// Custom PEM trust anchors
    pub ca_bundle: Option<String>,
    /// Accept any server certificate
    pub skip_tls_verify: bool,
    /// Proxy URL
    pub proxy: Option<String>,
    /// Per-call timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Config for the given URL with default settings
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ca_bundle: None,
            skip_tls_verify: false,
            proxy: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Authentication material
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Mutual TLS with a client certificate
    ClientCertificate {
        /// PEM certificate
        certificate_pem: Vec<u8>,
        /// PEM private key
        key_pem: Vec<u8>,
    },
    /// API id and key headers
    Password {
        /// User name
        username: String,
        /// Password
        password: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::ClientCertificate { .. } => f
                .debug_struct("ClientCertificate")
                .finish_non_exhaustive(),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl Credentials {
    /// Reads credentials from decoded Secret data.
    ///
    /// # Arguments
    /// * `secret_name` - used in error messages
    /// * `secret_type` - Secret `type` field (`Opaque` when unset)
    /// * `data` - decoded Secret data
    pub fn from_secret(
        secret_name: &str,
        secret_type: Option<&str>,
        data: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Self, PkiError> {
        let field = |key: &str| {
            data.get(key).ok_or_else(|| {
                PkiError::InvalidConfig(format!("Missing {key} in secret {secret_name}"))
            })
        };

        match secret_type.unwrap_or(SECRET_TYPE_OPAQUE) {
            SECRET_TYPE_TLS => Ok(Credentials::ClientCertificate {
                certificate_pem: field("tls.crt")?.clone(),
                key_pem: field("tls.key")?.clone(),
            }),
            SECRET_TYPE_OPAQUE => {
                let text = |key: &str| {
                    String::from_utf8(field(key)?.clone()).map_err(|_| {
                        PkiError::InvalidConfig(format!(
                            "{key} in secret {secret_name} is not valid UTF-8"
                        ))
                    })
                };
                Ok(Credentials::Password {
                    username: text("username")?,
                    password: text("password")?,
                })
            }
            other => Err(PkiError::InvalidConfig(format!(
                "Unsupported secret type {other:?} for secret {secret_name}"
            ))),
        }
    }
}
