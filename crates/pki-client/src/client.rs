//! PKI API client
//!
//! Implements the PKI REST API used by the issuer:
//! `/api/v1/requests/submit`, `/api/v1/requests/{id}` and
//! `/api/v1/security/principals/self`.

use crate::credentials::{ClientConfig, Credentials};
use crate::error::PkiError;
use crate::models::*;
use crate::pki_trait::{PkiClientFactory, PkiClientTrait};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

const HEALTH_PATH: &str = "/api/v1/security/principals/self";
const SUBMIT_PATH: &str = "/api/v1/requests/submit";
const REQUESTS_PATH: &str = "/api/v1/requests";

/// API id header for password authentication
pub const API_ID_HEADER: &str = "X-API-ID";
/// API key header for password authentication
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// PKI API client
pub struct PkiClient {
    client: Client,
    base_url: String,
    password: Option<(String, String)>,
}

impl std::fmt::Debug for PkiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PkiClient {
    /// Create a new PKI client
    ///
    /// # Arguments
    /// * `config` - Base URL and transport settings
    /// * `credentials` - Client certificate or username/password
    pub fn new(config: &ClientConfig, credentials: Credentials) -> Result<Self, PkiError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| PkiError::InvalidConfig(format!("Invalid base URL: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(PkiError::InvalidConfig(format!(
                "Invalid base URL: unsupported scheme {}",
                base_url.scheme()
            )));
        }

        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout);

        if config.skip_tls_verify {
            warn!("Skipping TLS verification. Not recommended in production.");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(bundle) = &config.ca_bundle {
            debug!("Adding custom CA bundle to trust store");
            let roots = reqwest::Certificate::from_pem_bundle(bundle.as_bytes())
                .map_err(|e| PkiError::InvalidConfig(format!("Failed to parse CA bundle: {e}")))?;
            if roots.is_empty() {
                return Err(PkiError::InvalidConfig(
                    "Failed to parse CA bundle: no certificate found".to_string(),
                ));
            }
            for root in roots {
                builder = builder.add_root_certificate(root);
            }
        }

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| PkiError::InvalidConfig(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let password = match credentials {
            Credentials::ClientCertificate {
                certificate_pem,
                key_pem,
            } => {
                let mut pem = certificate_pem;
                if !pem.ends_with(b"\n") {
                    pem.push(b'\n');
                }
                pem.extend_from_slice(&key_pem);
                let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                    PkiError::InvalidConfig(format!("Failed to load TLS certificate: {e}"))
                })?;
                builder = builder.identity(identity);
                None
            }
            Credentials::Password { username, password } => Some((username, password)),
        };

        let client = builder.build().map_err(PkiError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            password,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.password {
            Some((id, key)) => builder
                .header(API_ID_HEADER, id)
                .header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, PkiError> {
        let response = builder.send().await.map_err(PkiError::Http)?;
        let status = response.status();
        let body = response.text().await.map_err(PkiError::Http)?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PkiError::Authentication(format!("{status} - {body}")));
        }

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(PkiError::Rejected {
                    code: api_error.error,
                    message: api_error.message,
                });
            }
            if status == StatusCode::NOT_FOUND {
                return Err(PkiError::NotFound(body));
            }
            return Err(PkiError::InvalidResponse(format!(
                "{status} - {}",
                body.chars().take(500).collect::<String>()
            )));
        }

        serde_json::from_str(&body).map_err(PkiError::Serialization)
    }

    async fn submit(&self, body: &SubmitRequest) -> Result<PkiRequest, PkiError> {
        self.send(self.request(reqwest::Method::POST, SUBMIT_PATH).json(body))
            .await
    }
}

#[async_trait::async_trait]
impl PkiClientTrait for PkiClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_health(&self) -> Result<(), PkiError> {
        let _: serde_json::Value = self
            .send(self.request(reqwest::Method::GET, HEALTH_PATH))
            .await?;
        Ok(())
    }

    async fn submit_enroll(&self, request: &EnrollRequest) -> Result<String, PkiError> {
        let submitted = self.submit(&SubmitRequest::enroll(request)).await?;
        debug!("Enroll request {} submitted on profile {}", submitted.id, request.profile);
        Ok(submitted.id)
    }

    async fn submit_renew(&self, certificate_id: &str, csr: &str) -> Result<String, PkiError> {
        let submitted = self.submit(&SubmitRequest::renew(certificate_id, csr)).await?;
        debug!("Renew request {} submitted for certificate {}", submitted.id, certificate_id);
        Ok(submitted.id)
    }

    async fn poll_status(&self, request_id: &str) -> Result<PkiRequest, PkiError> {
        self.send(self.request(
            reqwest::Method::GET,
            &format!("{REQUESTS_PATH}/{request_id}"),
        ))
        .await
    }

    async fn revoke(&self, certificate_pem: &str, reason: RevocationReason) -> Result<(), PkiError> {
        let submitted = self
            .submit(&SubmitRequest::revoke(certificate_pem, reason))
            .await?;
        debug!("Revoke request {} submitted", submitted.id);
        Ok(())
    }
}

/// Factory building [`PkiClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpPkiClientFactory;

impl PkiClientFactory for HttpPkiClientFactory {
    fn build(
        &self,
        config: &ClientConfig,
        credentials: Credentials,
    ) -> Result<Arc<dyn PkiClientTrait>, PkiError> {
        Ok(Arc::new(PkiClient::new(config, credentials)?))
    }
}
