//! DNS ownership gate.
//!
//! When an issuer names a DNS server, every subject name of a CSR (common
//! name and DNS SANs) must resolve on that server before submission.

use crate::error::ControllerError;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info};
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::{FromDer, X509CertificationRequest};

const DNS_PORT: u16 = 53;

/// Resolves names against a given DNS server
#[async_trait::async_trait]
pub trait NameResolver: Send + Sync {
    /// Succeeds when `name` has at least one address on `server`
    async fn resolve(&self, server: SocketAddr, name: &str) -> Result<(), String>;
}

/// [`NameResolver`] backed by hickory, one resolver per lookup server
#[derive(Debug, Clone, Copy, Default)]
pub struct HickoryNameResolver;

#[async_trait::async_trait]
impl NameResolver for HickoryNameResolver {
    async fn resolve(&self, server: SocketAddr, name: &str) -> Result<(), String> {
        let group = NameServerConfigGroup::from_ips_clear(&[server.ip()], server.port(), true);
        let resolver = TokioAsyncResolver::tokio(
            ResolverConfig::from_parts(None, vec![], group),
            ResolverOpts::default(),
        );
        let lookup = resolver.lookup_ip(name).await.map_err(|e| e.to_string())?;
        if lookup.iter().next().is_none() {
            return Err("no address".to_string());
        }
        Ok(())
    }
}

/// Parse `ip` or `ip:port` (port 53 by default)
pub fn parse_server(server: &str) -> Result<SocketAddr, ControllerError> {
    let server = server.trim();
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    server
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ControllerError::InvalidConfig(format!("invalid DNS checker server {server:?}")))
}

/// Common name and DNS SANs of a PEM CSR, without duplicates
pub fn subject_names(csr_pem: &[u8]) -> Result<Vec<String>, ControllerError> {
    let block = pem::parse(csr_pem).map_err(|e| ControllerError::InvalidCsr(e.to_string()))?;
    let (_, csr) = X509CertificationRequest::from_der(block.contents())
        .map_err(|e| ControllerError::InvalidCsr(e.to_string()))?;

    let mut names: Vec<String> = csr
        .certification_request_info
        .subject
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .filter(|cn| !cn.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(extensions) = csr.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        names.push((*dns).to_string());
                    }
                }
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    names.retain(|n| seen.insert(n.clone()));
    Ok(names)
}

/// Resolve every subject name of the CSR on `server`
pub async fn check_subject_names(
    resolver: &dyn NameResolver,
    server: &str,
    csr_pem: &[u8],
    timeout: Duration,
) -> Result<(), ControllerError> {
    let addr = parse_server(server)?;
    for name in subject_names(csr_pem)? {
        info!("Checking DNS name {} on {}", name, addr);
        match tokio::time::timeout(timeout, resolver.resolve(addr, &name)).await {
            Ok(Ok(())) => debug!("{} resolved", name),
            Ok(Err(e)) => {
                return Err(ControllerError::DnsValidation(format!(
                    "could not resolve {name} on {server}: {e}"
                )));
            }
            Err(_) => {
                return Err(ControllerError::DnsValidation(format!(
                    "timed out resolving {name} on {server}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeResolver, generate_csr};

    #[test]
    fn test_parse_server_forms() {
        assert_eq!(parse_server("10.0.0.53").unwrap(), "10.0.0.53:53".parse().unwrap());
        assert_eq!(parse_server("10.0.0.53:5353").unwrap(), "10.0.0.53:5353".parse().unwrap());
        assert_eq!(parse_server("[::1]:53").unwrap(), "[::1]:53".parse().unwrap());
        assert_eq!(parse_server("::1").unwrap(), "[::1]:53".parse().unwrap());
        assert!(matches!(parse_server("dns.local"), Err(ControllerError::InvalidConfig(_))));
    }

    #[test]
    fn test_subject_names_include_cn_and_sans_once() {
        let csr = generate_csr("web.example.com", &["web.example.com", "www.example.com"]);
        assert_eq!(
            subject_names(csr.as_bytes()).unwrap(),
            vec!["web.example.com".to_string(), "www.example.com".to_string()]
        );
    }

    #[test]
    fn test_subject_names_rejects_garbage() {
        assert!(matches!(subject_names(b"nope"), Err(ControllerError::InvalidCsr(_))));
    }

    #[tokio::test]
    async fn test_every_name_must_resolve() {
        let csr = generate_csr("web.example.com", &["www.example.com"]);
        let resolver = FakeResolver::resolving(&["web.example.com", "www.example.com"]);
        check_subject_names(&resolver, "10.0.0.53", csr.as_bytes(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resolver.lookups(), vec!["web.example.com", "www.example.com"]);

        let partial = FakeResolver::resolving(&["web.example.com"]);
        let err = check_subject_names(&partial, "10.0.0.53", csr.as_bytes(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::DnsValidation(ref m) if m.contains("www.example.com")));
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let csr = generate_csr("web.example.com", &[]);
        let resolver = FakeResolver::hanging();
        let err = check_subject_names(&resolver, "10.0.0.53", csr.as_bytes(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::DnsValidation(ref m) if m.starts_with("timed out")));
    }
}
