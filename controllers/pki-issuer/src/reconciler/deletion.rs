//! Revocation guard.
//!
//! Requests of issuers with `revokeCertificates` carry a finalizer. When such
//! a request is deleted its certificate is revoked on the PKI, then the
//! finalizer is removed so the delete can complete.

use super::{Context, trust_chain};
use crate::error::ControllerError;
use crds::annotations::has_finalizer;
use crds::{AnyIssuer, CertificateRequest};
use kube::ResourceExt;
use pki_client::RevocationReason;
use tracing::{debug, info, warn};

fn request_key(request: &CertificateRequest) -> String {
    format!("{}/{}", request.namespace().unwrap_or_default(), request.name_any())
}

/// Leaf certificate stored on the request, if any
///
/// The status holds the leaf followed by its intermediates; only the leaf is
/// revoked. A bundle that cannot be split is sent as stored.
fn issued_leaf(request: &CertificateRequest, key: &str) -> Option<String> {
    let bundle = match request.status.as_ref().map(|s| s.certificate_pem()) {
        Some(Ok(Some(pem))) => pem,
        Some(Err(e)) => {
            warn!("Certificate of {} cannot be decoded, nothing to revoke: {}", key, e);
            return None;
        }
        Some(Ok(None)) | None => {
            debug!("CertificateRequest {} has no certificate", key);
            return None;
        }
    };
    let bundle = String::from_utf8_lossy(&bundle);
    Some(trust_chain::leaf_pem(&bundle).unwrap_or_else(|| bundle.into_owned()))
}

/// Finishes a deletion that needs no PKI call.
///
/// Returns `true` when the request is done with: it does not carry our
/// finalizer, or it has no certificate to revoke and the finalizer was
/// removed. Such requests never wait on their issuer.
pub async fn release_without_issuer(ctx: &Context, request: &CertificateRequest) -> Result<bool, ControllerError> {
    let key = request_key(request);
    if !has_finalizer(&request.metadata) {
        debug!("CertificateRequest {} is being deleted without our finalizer", key);
        return Ok(true);
    }
    if issued_leaf(request, &key).is_some() {
        return Ok(false);
    }
    info!("CertificateRequest {} has nothing to revoke, removing finalizer", key);
    ctx.store.remove_finalizer(request).await?;
    Ok(true)
}

/// Handles a CertificateRequest that is being deleted
pub async fn handle(ctx: &Context, issuer: &AnyIssuer, request: &CertificateRequest) -> Result<(), ControllerError> {
    let key = request_key(request);
    if !has_finalizer(&request.metadata) {
        debug!("CertificateRequest {} is being deleted without our finalizer", key);
        return Ok(());
    }

    if issuer.spec().revoke_certificates {
        revoke(ctx, issuer, request, &key).await?;
    } else {
        info!("Revocation is disabled on {}, releasing {}", issuer.name(), key);
    }

    info!("Removing finalizer from CertificateRequest {}", key);
    ctx.store.remove_finalizer(request).await
}

async fn revoke(
    ctx: &Context,
    issuer: &AnyIssuer,
    request: &CertificateRequest,
    key: &str,
) -> Result<(), ControllerError> {
    let Some(certificate) = issued_leaf(request, key) else {
        info!("CertificateRequest {} has no certificate, nothing to revoke", key);
        return Ok(());
    };

    let client = ctx.client_for(issuer).await?;
    match client.revoke(&certificate, RevocationReason::Unspecified).await {
        Ok(()) => {
            info!("Revoked the certificate of {}", key);
            Ok(())
        }
        Err(e) if e.is_rejection() => {
            warn!("PKI refused to revoke the certificate of {}, releasing it anyway: {}", key, e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
