//! Reconciliation logic for the PKI issuer.
//!
//! - `certificate_request`: the request lifecycle (submit, poll, accept)
//! - `deletion`: revocation guard behind the request finalizer
//! - `issuer`: Issuer / ClusterIssuer health probes
//! - `attributes`, `dns_check`, `trust_chain`: pure helpers used on the way

pub mod attributes;
pub mod certificate_request;
pub mod conditions;
pub mod deletion;
pub mod dns_check;
pub mod issuer;
pub mod trust_chain;


use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::store::ResourceStore;
use crds::AnyIssuer;
use dns_check::NameResolver;
use pki_client::{ClientConfig, Credentials, PkiClientFactory, PkiClientTrait};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Shared state handed to every reconcile
pub struct Context {
    /// Kubernetes object access
    pub store: Arc<dyn ResourceStore>,
    /// Builds PKI clients from issuer settings
    pub pki: Arc<dyn PkiClientFactory>,
    /// DNS ownership lookups
    pub resolver: Arc<dyn NameResolver>,
    /// Runtime settings
    pub config: ControllerConfig,
    /// Error backoff per object key
    backoff_states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl Context {
    /// Creates a context from its collaborators
    pub fn new(
        store: Arc<dyn ResourceStore>,
        pki: Arc<dyn PkiClientFactory>,
        resolver: Arc<dyn NameResolver>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            pki,
            resolver,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a PKI client from the issuer settings and its credential Secret
    pub async fn client_for(&self, issuer: &AnyIssuer) -> Result<Arc<dyn PkiClientTrait>, ControllerError> {
        let spec = issuer.spec();
        let namespace = issuer.secret_namespace(&self.config.cluster_resource_namespace);
        let secret = self
            .store
            .get_secret(namespace, &spec.auth_secret_name)
            .await?
            .ok_or_else(|| {
                ControllerError::Credentials(format!(
                    "secret {}/{} not found",
                    namespace, spec.auth_secret_name
                ))
            })?;

        let data: BTreeMap<String, Vec<u8>> = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect();
        let credentials = Credentials::from_secret(&spec.auth_secret_name, secret.type_.as_deref(), &data)
            .map_err(|e| ControllerError::Credentials(e.to_string()))?;

        let config = ClientConfig {
            base_url: spec.url.clone(),
            ca_bundle: spec.ca_bundle.clone().filter(|b| !b.is_empty()),
            skip_tls_verify: spec.skip_tls_verify,
            proxy: spec.proxy.clone().filter(|p| !p.is_empty()),
            timeout: self.config.pki_timeout,
        };
        debug!("Building PKI client for {} ({})", issuer.name(), config.base_url);
        Ok(self.pki.build(&config, credentials)?)
    }

    /// Next error delay for `key`
    pub fn next_backoff(&self, key: &str) -> Duration {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        states.entry(key.to_string()).or_default().next_backoff()
    }

    /// Forget the error history of `key`
    pub fn reset_backoff(&self, key: &str) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }
}
