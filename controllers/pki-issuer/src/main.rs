//! PKI Issuer Controller
//!
//! cert-manager external issuer for an asynchronous enrollment PKI:
//! - CertificateRequest: submits CSRs, polls the PKI, stores issued chains,
//!   revokes certificates of deleted requests
//! - Issuer / ClusterIssuer: probes the PKI and reports readiness

mod backoff;
mod config;
mod controller;
mod error;
mod reconciler;
mod server;
mod store;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::reconciler::Context;
use crate::reconciler::dns_check::HickoryNameResolver;
use crate::server::ProbeState;
use crate::store::KubeStore;
use anyhow::Context as _;
use kube::Client;
use pki_client::HttpPkiClientFactory;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "pki_issuer=info,pki_client=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install the rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    info!("Starting PKI Issuer Controller");

    let config = ControllerConfig::from_env();
    info!("Configuration:");
    info!("  Cluster resource namespace: {}", config.cluster_resource_namespace);
    info!(
        "  Namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Health check interval: {:?}", config.health_check_interval);
    info!("  Pending poll interval: {:?}", config.pending_poll_interval);

    let probes = Arc::new(ProbeState::default());
    tokio::spawn(server::start_probe_server(config.probe_port, Arc::clone(&probes)));

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let ctx = Arc::new(Context::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(HttpPkiClientFactory),
        Arc::new(HickoryNameResolver),
        config,
    ));

    probes.set_ready(true);
    controller::run(client, ctx).await;
    probes.set_ready(false);

    Ok(())
}
