//! CertificateRequest lifecycle.
//!
//! A request moves from unsubmitted to awaiting the PKI once approved, then
//! to issued or denied depending on what the PKI answers. The PKI request id
//! annotation is the only marker of a submission; every pass re-reads it, so
//! a pass can be repeated at any time without submitting twice.
//!
//! All status and annotation changes of a pass are written once, at the end,
//! by [`persist_outcome`].

use super::conditions::{
    self, MESSAGE_APPROVED, MESSAGE_PKI_DENIED, MESSAGE_SIGNED, MESSAGE_SUBMITTED, REASON_PKI, Terminal,
};
use super::{Context, attributes, deletion, dns_check, trust_chain};
use crate::error::{ControllerError, ErrorKind};
use chrono::{DateTime, Utc};
use crds::annotations::{has_finalizer, parent_certificate_name};
use crds::{
    AnyIssuer, CONDITION_APPROVED, CONDITION_DENIED, CONDITION_READY, Certificate, CertificateRequest,
    CertificateRequestStatus, ConditionStatus, REASON_ISSUED, REASON_PENDING, RequestLedger,
};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use pki_client::{IssuedCertificate, PkiError, RequestStatus};
use tracing::{debug, error, info, warn};

/// `Issuing` reasons of a parent Certificate that make a submission a renewal
pub const RENEWAL_REASONS: [&str; 3] = ["ManuallyTriggered", "Renewing", "Expired"];

const INGRESS_API_VERSION: &str = "networking.k8s.io/v1";
const INGRESS_KIND: &str = "Ingress";

/// Reconciles one CertificateRequest
pub async fn reconcile(request: &CertificateRequest, ctx: &Context) -> Result<Action, ControllerError> {
    let namespace = request.namespace().unwrap_or_default();
    let name = request.name_any();
    let reference = &request.spec.issuer_ref;

    if !reference.targets_this_group() {
        debug!(
            "Ignoring CertificateRequest {}/{} for issuer group {:?}",
            namespace, name, reference.group
        );
        return Ok(Action::await_change());
    }
    info!("Reconciling CertificateRequest {}/{}", namespace, name);

    if request.metadata.deletion_timestamp.is_some() && deletion::release_without_issuer(ctx, request).await? {
        return Ok(Action::await_change());
    }

    let scope = reference.scope()?;
    let issuer = ctx
        .store
        .get_issuer(scope, &namespace, &reference.name)
        .await?
        .ok_or_else(|| ControllerError::IssuerNotFound(format!("{} {}", scope.kind(), reference.name)))?;

    if !issuer.is_ready() {
        info!(
            "{} {} is not ready, skipping CertificateRequest {}/{}",
            scope.kind(),
            issuer.name(),
            namespace,
            name
        );
        return Ok(Action::requeue(ctx.config.health_check_interval));
    }

    if request.metadata.deletion_timestamp.is_some() {
        deletion::handle(ctx, &issuer, request).await?;
        return Ok(Action::await_change());
    }

    let mut request = request.clone();
    if issuer.spec().revoke_certificates && !has_finalizer(&request.metadata) {
        info!("Adding finalizer to CertificateRequest {}/{}", namespace, name);
        request = ctx.store.add_finalizer(&request).await?;
    }

    if request.status.is_none() {
        request.status = Some(CertificateRequestStatus::default());
    }
    if let Some(terminal) = request.status.as_ref().and_then(conditions::terminal_state) {
        debug!("CertificateRequest {}/{} is final ({:?})", namespace, name, terminal);
        if terminal == Terminal::Issued {
            link_parent(ctx, &request).await?;
        }
        return Ok(Action::await_change());
    }

    let before = request.clone();
    let outcome = advance(ctx, &issuer, &mut request).await;
    persist_outcome(ctx, &before, request, outcome).await
}

fn status_mut(request: &mut CertificateRequest) -> &mut CertificateRequestStatus {
    request.status.get_or_insert_with(Default::default)
}

async fn advance(
    ctx: &Context,
    issuer: &AnyIssuer,
    request: &mut CertificateRequest,
) -> Result<Action, ControllerError> {
    let (denied, approved) = {
        let status = status_mut(request);
        (
            conditions::is_denied_by_approver(status),
            status.has_true(CONDITION_APPROVED),
        )
    };
    if denied {
        info!("CertificateRequest {} was denied by an approval controller", request.name_any());
        conditions::apply_local_denial(status_mut(request), Utc::now());
        return Ok(Action::await_change());
    }

    if let Some(request_id) = RequestLedger::read(&request.metadata).request_id {
        return poll(ctx, issuer, request, &request_id).await;
    }
    if !approved {
        debug!("CertificateRequest {} is waiting for approval", request.name_any());
        return Ok(Action::await_change());
    }
    submit(ctx, issuer, request).await
}

async fn poll(
    ctx: &Context,
    issuer: &AnyIssuer,
    request: &mut CertificateRequest,
    request_id: &str,
) -> Result<Action, ControllerError> {
    let client = ctx.client_for(issuer).await?;
    let pki_request = client.poll_status(request_id).await?;
    info!("PKI request {} is {}", request_id, pki_request.status);

    let now = Utc::now();
    match pki_request.status {
        RequestStatus::Pending | RequestStatus::Approved => Ok(Action::requeue(ctx.config.pending_poll_interval)),
        RequestStatus::Denied | RequestStatus::Canceled => {
            status_mut(request).set_condition(
                CONDITION_DENIED,
                ConditionStatus::True,
                REASON_PKI,
                MESSAGE_PKI_DENIED,
                now,
            );
            Ok(Action::await_change())
        }
        RequestStatus::Completed => {
            let certificate = pki_request.certificate.ok_or_else(|| {
                PkiError::InvalidResponse(format!("request {request_id} completed without a certificate"))
            })?;
            accept(request, &certificate, now);
            Ok(Action::await_change())
        }
    }
}

fn accept(request: &mut CertificateRequest, certificate: &IssuedCertificate, now: DateTime<Utc>) {
    let chain = trust_chain::build_or_leaf(&certificate.pem);
    let status = status_mut(request);
    status.set_condition(
        CONDITION_APPROVED,
        ConditionStatus::True,
        REASON_PKI,
        MESSAGE_APPROVED,
        now,
    );
    status.set_issued(
        chain.certificate_pem.as_bytes(),
        chain.ca_pem.as_deref().map(str::as_bytes),
    );
    status.set_condition(
        CONDITION_READY,
        ConditionStatus::True,
        REASON_ISSUED,
        MESSAGE_SIGNED,
        now,
    );
    RequestLedger::record_certificate_id(&mut request.metadata, &certificate.id);
    info!(
        "CertificateRequest {} issued as PKI certificate {}",
        request.name_any(),
        certificate.id
    );
}

async fn submit(
    ctx: &Context,
    issuer: &AnyIssuer,
    request: &mut CertificateRequest,
) -> Result<Action, ControllerError> {
    let result = send_submission(ctx, issuer, request).await;
    let now = Utc::now();
    match result {
        Ok(request_id) => {
            info!(
                "Submitted CertificateRequest {} as PKI request {}",
                request.name_any(),
                request_id
            );
            RequestLedger::record_request_id(&mut request.metadata, &request_id);
            status_mut(request).set_condition(
                CONDITION_READY,
                ConditionStatus::False,
                REASON_PENDING,
                MESSAGE_SUBMITTED,
                now,
            );
            Ok(Action::requeue(ctx.config.pending_poll_interval))
        }
        Err(e) => {
            if matches!(e.kind(), ErrorKind::MalformedRequest | ErrorKind::PkiRejection) {
                warn!("CertificateRequest {} will not be accepted: {}", request.name_any(), e);
                conditions::apply_invalid_request(status_mut(request), &e, now);
            }
            Err(e)
        }
    }
}

async fn send_submission(
    ctx: &Context,
    issuer: &AnyIssuer,
    request: &CertificateRequest,
) -> Result<String, ControllerError> {
    let spec = issuer.spec();
    let csr = decode_csr(request)?;
    if let Some(checker) = &spec.dns_checker {
        dns_check::check_subject_names(
            ctx.resolver.as_ref(),
            &checker.server,
            csr.as_bytes(),
            ctx.config.dns_check_timeout,
        )
        .await?;
    }

    let namespace = request.namespace().unwrap_or_default();
    let parent = match parent_certificate_name(&request.metadata) {
        Some(parent_name) => Some(
            ctx.store
                .get_certificate(&namespace, parent_name)
                .await?
                .ok_or_else(|| ControllerError::MissingParent(format!("{namespace}/{parent_name}")))?,
        ),
        None => None,
    };

    let client = ctx.client_for(issuer).await?;

    if let Some(certificate_id) = parent.as_ref().and_then(renewal_target) {
        info!("Renewing PKI certificate {}", certificate_id);
        return Ok(client.submit_renew(certificate_id, &csr).await?);
    }

    let ingress_annotations = match parent.as_ref().and_then(owning_ingress) {
        Some(ingress_name) => ctx
            .store
            .get_ingress(&namespace, ingress_name)
            .await?
            .and_then(|ingress| ingress.metadata.annotations),
        None => None,
    };
    let attributes = attributes::resolve(
        spec,
        ingress_annotations.as_ref(),
        parent.as_ref().and_then(|p| p.metadata.annotations.as_ref()),
    );
    Ok(client
        .submit_enroll(&attributes.into_enroll_request(&spec.profile, csr))
        .await?)
}

fn decode_csr(request: &CertificateRequest) -> Result<String, ControllerError> {
    let pem = request
        .spec
        .csr_pem()
        .map_err(|e| ControllerError::InvalidCsr(e.to_string()))?;
    String::from_utf8(pem).map_err(|e| ControllerError::InvalidCsr(e.to_string()))
}

/// Certificate id to renew, when the parent is re-issuing a known certificate
fn renewal_target(parent: &Certificate) -> Option<&str> {
    let reason = parent.status.as_ref()?.issuing_reason()?;
    if !RENEWAL_REASONS.contains(&reason) {
        return None;
    }
    RequestLedger::last_certificate_id(&parent.metadata)
}

fn owning_ingress(parent: &Certificate) -> Option<&str> {
    parent
        .metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.api_version == INGRESS_API_VERSION && owner.kind == INGRESS_KIND)
        .map(|owner| owner.name.as_str())
}

/// Writes the result of a pass.
///
/// A failed pass is reflected on `Ready` first. The request is then written
/// with a single persistence call, and a newly issued certificate id is linked
/// on the parent Certificate. Persistence failures never hide the pass error.
pub async fn persist_outcome(
    ctx: &Context,
    before: &CertificateRequest,
    mut after: CertificateRequest,
    outcome: Result<Action, ControllerError>,
) -> Result<Action, ControllerError> {
    if let Err(e) = &outcome {
        error!("Reconcile of CertificateRequest {} failed: {}", after.name_any(), e);
        conditions::apply_error(status_mut(&mut after), e, Utc::now());
    }

    let mut failures = Vec::new();
    if let Err(e) = ctx.store.persist_certificate_request(before, &after).await {
        error!("Failed to persist CertificateRequest {}: {}", after.name_any(), e);
        failures.push(e);
    }
    if let Err(e) = link_parent(ctx, &after).await {
        error!("Failed to link parent of CertificateRequest {}: {}", after.name_any(), e);
        failures.push(e);
    }

    match outcome {
        Ok(action) => {
            let mut failures = failures.into_iter();
            match failures.next() {
                None => Ok(action),
                Some(first) => Err(first.aggregate(failures.collect())),
            }
        }
        Err(e) => Err(e.aggregate(failures)),
    }
}

async fn link_parent(ctx: &Context, request: &CertificateRequest) -> Result<(), ControllerError> {
    let Some(certificate_id) = RequestLedger::read(&request.metadata).certificate_id else {
        return Ok(());
    };
    let Some(parent_name) = parent_certificate_name(&request.metadata) else {
        return Ok(());
    };
    let namespace = request.namespace().unwrap_or_default();
    let Some(mut parent) = ctx.store.get_certificate(&namespace, parent_name).await? else {
        warn!(
            "Parent Certificate {}/{} not found, certificate {} stays unlinked",
            namespace, parent_name, certificate_id
        );
        return Ok(());
    };
    if RequestLedger::link_last_certificate_id(&mut parent.metadata, &certificate_id) {
        info!(
            "Linking Certificate {}/{} to PKI certificate {}",
            namespace, parent_name, certificate_id
        );
        ctx.store.persist_certificate_annotations(&parent).await?;
    }
    Ok(())
}
