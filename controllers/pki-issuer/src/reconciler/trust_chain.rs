//! Leaf-to-root ordering of issued certificates.

use pem::{EncodeConfig, LineEnding, Pem};
use thiserror::Error;
use tracing::warn;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Chain construction failures
#[derive(Debug, Error)]
pub enum ChainError {
    /// Not PEM
    #[error("invalid PEM: {0}")]
    Pem(#[from] pem::PemError),
    /// No CERTIFICATE block
    #[error("no certificate found")]
    Empty,
    /// A block is not a valid X.509 certificate
    #[error("invalid certificate: {0}")]
    X509(String),
    /// The certificates do not form one chain
    #[error("certificates do not form a single chain")]
    Disconnected,
}

/// Ordered chain split the way it is stored on a CertificateRequest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustChain {
    /// Leaf followed by intermediates
    pub certificate_pem: String,
    /// Self-signed root, if the chain ends with one
    pub ca_pem: Option<String>,
}

struct Parsed<'a> {
    pem: &'a Pem,
    cert: X509Certificate<'a>,
}

impl Parsed<'_> {
    fn issued_by(&self, other: &Parsed<'_>) -> bool {
        self.cert.issuer().as_raw() == other.cert.subject().as_raw()
    }

    fn is_self_signed(&self) -> bool {
        self.issued_by(self) && self.cert.verify_signature(None).is_ok()
    }
}

fn encode(pem: &Pem) -> String {
    pem::encode_config(pem, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Order the certificates of a PEM bundle leaf first
pub fn build(bundle: &str) -> Result<TrustChain, ChainError> {
    let blocks: Vec<Pem> = pem::parse_many(bundle)?
        .into_iter()
        .filter(|p| p.tag() == "CERTIFICATE")
        .collect();
    if blocks.is_empty() {
        return Err(ChainError::Empty);
    }

    let parsed = blocks
        .iter()
        .map(|pem| {
            X509Certificate::from_der(pem.contents())
                .map(|(_, cert)| Parsed { pem, cert })
                .map_err(|e| ChainError::X509(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // The leaf issues nothing else in the bundle.
    let leaf = (0..parsed.len())
        .find(|&i| {
            !parsed
                .iter()
                .enumerate()
                .any(|(j, other)| i != j && other.issued_by(&parsed[i]))
        })
        .ok_or(ChainError::Disconnected)?;

    let mut order = vec![leaf];
    let mut current = leaf;
    while !parsed[current].is_self_signed() {
        let next = (0..parsed.len())
            .find(|&j| !order.contains(&j) && parsed[current].issued_by(&parsed[j]));
        match next {
            Some(j) => {
                order.push(j);
                current = j;
            }
            None => break,
        }
    }
    if order.len() != parsed.len() {
        return Err(ChainError::Disconnected);
    }

    let last = order[order.len() - 1];
    let (chain, ca) = if order.len() > 1 && parsed[last].is_self_signed() {
        (&order[..order.len() - 1], Some(encode(parsed[last].pem)))
    } else {
        (&order[..], None)
    };

    Ok(TrustChain {
        certificate_pem: chain.iter().map(|&i| encode(parsed[i].pem)).collect(),
        ca_pem: ca,
    })
}

/// First certificate of a PEM bundle
pub fn leaf_pem(bundle: &str) -> Option<String> {
    pem::parse_many(bundle)
        .ok()?
        .into_iter()
        .find(|p| p.tag() == "CERTIFICATE")
        .map(|p| encode(&p))
}

/// [`build`], falling back to the first certificate alone
pub fn build_or_leaf(bundle: &str) -> TrustChain {
    match build(bundle) {
        Ok(chain) => chain,
        Err(e) => {
            warn!("Unable to build the trust chain, storing the leaf only: {}", e);
            TrustChain {
                certificate_pem: leaf_pem(bundle).unwrap_or_else(|| bundle.to_string()),
                ca_pem: None,
            }
        }
    }
}
