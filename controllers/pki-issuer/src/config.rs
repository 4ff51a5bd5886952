//! Controller configuration loaded from environment variables.

use std::time::Duration;
use tracing::warn;

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Default issuer re-probe interval
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 60;
/// Default re-poll interval for requests awaiting the PKI
pub const DEFAULT_PENDING_POLL_INTERVAL_SECS: u64 = 15;
/// Default PKI call timeout
pub const DEFAULT_PKI_TIMEOUT_SECS: u64 = 30;
/// Default DNS lookup timeout
pub const DEFAULT_DNS_CHECK_TIMEOUT_SECS: u64 = 10;
/// Default probe port
pub const DEFAULT_PROBE_PORT: u16 = 8081;

/// Runtime settings of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace holding ClusterIssuer credential Secrets
    pub cluster_resource_namespace: String,
    /// Restricts the CertificateRequest and Issuer watches to one namespace
    pub watch_namespace: Option<String>,
    /// Issuer re-probe interval after a successful probe
    pub health_check_interval: Duration,
    /// Re-poll interval for requests awaiting the PKI
    pub pending_poll_interval: Duration,
    /// Per-call PKI timeout
    pub pki_timeout: Duration,
    /// Timeout of each DNS ownership lookup
    pub dns_check_timeout: Duration,
    /// Port of `/healthz` and `/readyz`
    pub probe_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_resource_namespace: "default".to_string(),
            watch_namespace: None,
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            pending_poll_interval: Duration::from_secs(DEFAULT_PENDING_POLL_INTERVAL_SECS),
            pki_timeout: Duration::from_secs(DEFAULT_PKI_TIMEOUT_SECS),
            dns_check_timeout: Duration::from_secs(DEFAULT_DNS_CHECK_TIMEOUT_SECS),
            probe_port: DEFAULT_PROBE_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        let service_account_namespace = std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE)
            .ok()
            .map(|ns| ns.trim().to_string());
        Self::from_lookup(|key| std::env::var(key).ok(), service_account_namespace)
    }

    /// Load configuration through `lookup`
    pub fn from_lookup<F>(lookup: F, service_account_namespace: Option<String>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str, default: u64| {
            Duration::from_secs(parse_or_default(key, non_empty(key), default))
        };

        Self {
            cluster_resource_namespace: non_empty("CLUSTER_RESOURCE_NAMESPACE")
                .or(service_account_namespace.filter(|ns| !ns.is_empty()))
                .unwrap_or_else(|| "default".to_string()),
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            health_check_interval: secs("HEALTH_CHECK_INTERVAL_SECS", DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            pending_poll_interval: secs("PENDING_POLL_INTERVAL_SECS", DEFAULT_PENDING_POLL_INTERVAL_SECS),
            pki_timeout: secs("PKI_TIMEOUT_SECS", DEFAULT_PKI_TIMEOUT_SECS),
            dns_check_timeout: secs("DNS_CHECK_TIMEOUT_SECS", DEFAULT_DNS_CHECK_TIMEOUT_SECS),
            probe_port: parse_or_default("PROBE_PORT", non_empty("PROBE_PORT"), DEFAULT_PROBE_PORT),
        }
    }
}

fn parse_or_default<T>(key: &str, value: Option<String>, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using default {}", raw, key, default);
            default
        }),
    }
}
