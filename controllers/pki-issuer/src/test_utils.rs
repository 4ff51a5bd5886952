//! Test utilities for unit testing reconcilers
//!
//! In-memory store, fake DNS, generated PKI material and object builders.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::reconciler::Context;
use crate::reconciler::dns_check::NameResolver;
use crate::store::{ResourceStore, finalizers_with};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use crds::{
    AnyIssuer, CONDITION_APPROVED, Certificate, CertificateRequest, CertificateRequestSpec, CertificateSpec,
    ClusterIssuer, ClusterIssuerSpec, ConditionStatus, GROUP, Issuer, IssuerReference, IssuerScope, IssuerSpec,
    IssuerStatus,
};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pki_client::{MockPkiClient, MockPkiClientFactory};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Namespace used for ClusterIssuer credentials in tests
pub const CLUSTER_NAMESPACE: &str = "pki-system";

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        resource_version: Some("1".to_string()),
        ..Default::default()
    }
}

#[derive(Default)]
struct StoreState {
    issuers: HashMap<String, AnyIssuer>,
    secrets: HashMap<String, Secret>,
    certificates: HashMap<String, Certificate>,
    ingresses: HashMap<String, Ingress>,
    requests: HashMap<String, CertificateRequest>,
    request_writes: usize,
    certificate_writes: usize,
    finalizer_adds: usize,
    finalizer_removals: usize,
    issuer_writes: Vec<AnyIssuer>,
    conflict: bool,
    certificate_conflict: bool,
}

/// In-memory [`ResourceStore`] that records every write
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

fn issuer_key(scope: IssuerScope, namespace: &str, name: &str) -> String {
    match scope {
        IssuerScope::Namespaced => format!("Issuer/{namespace}/{name}"),
        IssuerScope::Cluster => format!("ClusterIssuer/{name}"),
    }
}

impl MemoryStore {
    pub fn add_issuer(&self, issuer: AnyIssuer) {
        let key = issuer_key(issuer.scope(), issuer.namespace().unwrap_or_default(), issuer.name());
        self.state.lock().unwrap().issuers.insert(key, issuer);
    }

    pub fn add_secret(&self, secret: Secret) {
        let key = key(secret.metadata.namespace.as_deref().unwrap(), secret.metadata.name.as_deref().unwrap());
        self.state.lock().unwrap().secrets.insert(key, secret);
    }

    pub fn add_certificate(&self, certificate: Certificate) {
        let key = key(
            certificate.metadata.namespace.as_deref().unwrap(),
            certificate.metadata.name.as_deref().unwrap(),
        );
        self.state.lock().unwrap().certificates.insert(key, certificate);
    }

    pub fn add_ingress(&self, ingress: Ingress) {
        let key = key(ingress.metadata.namespace.as_deref().unwrap(), ingress.metadata.name.as_deref().unwrap());
        self.state.lock().unwrap().ingresses.insert(key, ingress);
    }

    /// Make every write fail with a conflict
    pub fn fail_writes_with_conflict(&self, conflict: bool) {
        self.state.lock().unwrap().conflict = conflict;
    }

    /// Make only Certificate writes fail with a conflict
    pub fn fail_certificate_writes_with_conflict(&self, conflict: bool) {
        self.state.lock().unwrap().certificate_conflict = conflict;
    }

    /// Last persisted version of a request
    pub fn request(&self, namespace: &str, name: &str) -> Option<CertificateRequest> {
        self.state.lock().unwrap().requests.get(&key(namespace, name)).cloned()
    }

    pub fn certificate(&self, namespace: &str, name: &str) -> Option<Certificate> {
        self.state.lock().unwrap().certificates.get(&key(namespace, name)).cloned()
    }

    /// Number of `persist_certificate_request` calls
    pub fn request_writes(&self) -> usize {
        self.state.lock().unwrap().request_writes
    }

    pub fn certificate_writes(&self) -> usize {
        self.state.lock().unwrap().certificate_writes
    }

    pub fn finalizer_adds(&self) -> usize {
        self.state.lock().unwrap().finalizer_adds
    }

    pub fn finalizer_removals(&self) -> usize {
        self.state.lock().unwrap().finalizer_removals
    }

    pub fn issuer_writes(&self) -> Vec<AnyIssuer> {
        self.state.lock().unwrap().issuer_writes.clone()
    }

    fn check_conflict(state: &StoreState) -> Result<(), ControllerError> {
        if state.conflict {
            return Err(ControllerError::Conflict("the object has been modified".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn get_issuer(
        &self,
        scope: IssuerScope,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AnyIssuer>, ControllerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .issuers
            .get(&issuer_key(scope, namespace, name))
            .cloned())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, ControllerError> {
        Ok(self.state.lock().unwrap().secrets.get(&key(namespace, name)).cloned())
    }

    async fn get_certificate(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Certificate>, ControllerError> {
        Ok(self.certificate(namespace, name))
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, ControllerError> {
        Ok(self.state.lock().unwrap().ingresses.get(&key(namespace, name)).cloned())
    }

    async fn persist_certificate_request(
        &self,
        _before: &CertificateRequest,
        after: &CertificateRequest,
    ) -> Result<(), ControllerError> {
        let mut state = self.state.lock().unwrap();
        state.request_writes += 1;
        Self::check_conflict(&state)?;
        let key = key(after.metadata.namespace.as_deref().unwrap(), after.metadata.name.as_deref().unwrap());
        state.requests.insert(key, after.clone());
        Ok(())
    }

    async fn add_finalizer(&self, request: &CertificateRequest) -> Result<CertificateRequest, ControllerError> {
        let mut state = self.state.lock().unwrap();
        Self::check_conflict(&state)?;
        state.finalizer_adds += 1;
        let mut updated = request.clone();
        updated.metadata.finalizers = Some(finalizers_with(&request.metadata, true));
        let key = key(request.metadata.namespace.as_deref().unwrap(), request.metadata.name.as_deref().unwrap());
        state.requests.insert(key, updated.clone());
        Ok(updated)
    }

    async fn remove_finalizer(&self, request: &CertificateRequest) -> Result<(), ControllerError> {
        let mut state = self.state.lock().unwrap();
        Self::check_conflict(&state)?;
        state.finalizer_removals += 1;
        let mut updated = request.clone();
        updated.metadata.finalizers = Some(finalizers_with(&request.metadata, false));
        let key = key(request.metadata.namespace.as_deref().unwrap(), request.metadata.name.as_deref().unwrap());
        state.requests.insert(key, updated);
        Ok(())
    }

    async fn persist_certificate_annotations(&self, certificate: &Certificate) -> Result<(), ControllerError> {
        let mut state = self.state.lock().unwrap();
        Self::check_conflict(&state)?;
        if state.certificate_conflict {
            return Err(ControllerError::Conflict("certificate modified".to_string()));
        }
        state.certificate_writes += 1;
        let key = key(
            certificate.metadata.namespace.as_deref().unwrap(),
            certificate.metadata.name.as_deref().unwrap(),
        );
        state.certificates.insert(key, certificate.clone());
        Ok(())
    }

    async fn persist_issuer_status(&self, issuer: &AnyIssuer) -> Result<(), ControllerError> {
        let mut state = self.state.lock().unwrap();
        Self::check_conflict(&state)?;
        state.issuer_writes.push(issuer.clone());
        let key = issuer_key(issuer.scope(), issuer.namespace().unwrap_or_default(), issuer.name());
        state.issuers.insert(key, issuer.clone());
        Ok(())
    }
}

/// [`NameResolver`] answering from a fixed list of names
#[derive(Default)]
pub struct FakeResolver {
    names: Vec<String>,
    hang: bool,
    lookups: Mutex<Vec<String>>,
}

impl FakeResolver {
    /// Resolves exactly `names`
    pub fn resolving(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| (*n).to_string()).collect(),
            ..Default::default()
        }
    }

    /// Never answers
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    /// Names looked up so far
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NameResolver for FakeResolver {
    async fn resolve(&self, _server: SocketAddr, name: &str) -> Result<(), String> {
        self.lookups.lock().unwrap().push(name.to_string());
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.names.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err("NXDOMAIN".to_string())
        }
    }
}

/// Context wired to in-memory collaborators
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub factory: MockPkiClientFactory,
    pub pki: MockPkiClient,
    pub resolver: Arc<FakeResolver>,
    pub ctx: Context,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_resolver(FakeResolver::default())
    }

    pub fn with_resolver(resolver: FakeResolver) -> Self {
        let store = Arc::new(MemoryStore::default());
        let pki = MockPkiClient::new("https://pki.test");
        let factory = MockPkiClientFactory::new(pki.clone());
        let resolver = Arc::new(resolver);
        let config = ControllerConfig {
            cluster_resource_namespace: CLUSTER_NAMESPACE.to_string(),
            ..Default::default()
        };
        let ctx = Context::new(
            Arc::clone(&store) as Arc<dyn ResourceStore>,
            Arc::new(factory.clone()),
            Arc::clone(&resolver) as Arc<dyn NameResolver>,
            config,
        );
        Self {
            store,
            factory,
            pki,
            resolver,
            ctx,
        }
    }
}

fn issuer_spec() -> IssuerSpec {
    IssuerSpec {
        url: "https://pki.test".to_string(),
        profile: "k8s".to_string(),
        auth_secret_name: "pki-credentials".to_string(),
        ..Default::default()
    }
}

fn issuer_status(ready: bool) -> Option<IssuerStatus> {
    ready.then(|| {
        let mut status = IssuerStatus::default();
        status.set_ready_condition(ConditionStatus::True, "Success", "Health check succeeded", chrono::Utc::now());
        status
    })
}

/// Namespaced issuer, optionally already `Ready=True`
pub fn issuer(name: &str, namespace: &str, ready: bool) -> AnyIssuer {
    AnyIssuer::Namespaced(Issuer {
        metadata: meta(Some(namespace), name),
        spec: issuer_spec(),
        status: issuer_status(ready),
    })
}

/// Cluster issuer, optionally already `Ready=True`
pub fn cluster_issuer(name: &str, ready: bool) -> AnyIssuer {
    AnyIssuer::Cluster(ClusterIssuer {
        metadata: meta(None, name),
        spec: ClusterIssuerSpec(issuer_spec()),
        status: issuer_status(ready),
    })
}

/// Mutable spec of an issuer built by [`issuer`] or [`cluster_issuer`]
pub fn spec_mut(issuer: &mut AnyIssuer) -> &mut IssuerSpec {
    match issuer {
        AnyIssuer::Namespaced(i) => &mut i.spec,
        AnyIssuer::Cluster(i) => &mut i.spec.0,
    }
}

fn secret(namespace: &str, name: &str, type_: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: meta(Some(namespace), name),
        type_: Some(type_.to_string()),
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// `Opaque` Secret with username and password
pub fn opaque_secret(namespace: &str, name: &str, username: &str, password: &str) -> Secret {
    secret(namespace, name, "Opaque", &[("username", username), ("password", password)])
}

/// `kubernetes.io/tls` Secret
pub fn tls_secret(namespace: &str, name: &str) -> Secret {
    secret(
        namespace,
        name,
        "kubernetes.io/tls",
        &[("tls.crt", "CERTIFICATE"), ("tls.key", "KEY")],
    )
}

/// CertificateRequest for the `pki` Issuer in the same namespace
pub fn certificate_request(namespace: &str, name: &str, csr_pem: &str) -> CertificateRequest {
    CertificateRequest {
        metadata: meta(Some(namespace), name),
        spec: CertificateRequestSpec {
            request: STANDARD.encode(csr_pem),
            issuer_ref: IssuerReference {
                name: "pki".to_string(),
                kind: Some("Issuer".to_string()),
                group: Some(GROUP.to_string()),
            },
            ..Default::default()
        },
        status: None,
    }
}

/// Marks a request approved the way cert-manager's approver does
pub fn approve(request: &mut CertificateRequest) {
    request.status.get_or_insert_with(Default::default).set_condition(
        CONDITION_APPROVED,
        ConditionStatus::True,
        "cert-manager.io",
        "Certificate request has been approved by cert-manager.io",
        chrono::Utc::now(),
    );
}

/// Sets an annotation
pub fn annotate(meta: &mut ObjectMeta, key: &str, value: &str) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}

/// cert-manager Certificate using the `pki` Issuer
pub fn certificate(namespace: &str, name: &str) -> Certificate {
    Certificate {
        metadata: meta(Some(namespace), name),
        spec: CertificateSpec {
            secret_name: format!("{name}-tls"),
            issuer_ref: IssuerReference {
                name: "pki".to_string(),
                kind: Some("Issuer".to_string()),
                group: Some(GROUP.to_string()),
            },
            ..Default::default()
        },
        status: None,
    }
}

/// Ingress with the given annotations
pub fn ingress(namespace: &str, name: &str, annotations: &[(&str, &str)]) -> Ingress {
    let mut ingress = Ingress {
        metadata: meta(Some(namespace), name),
        ..Default::default()
    };
    for (k, v) in annotations {
        annotate(&mut ingress.metadata, k, v);
    }
    ingress
}

/// PEM CSR with the given common name and DNS SANs
pub fn generate_csr(common_name: &str, dns_names: &[&str]) -> String {
    let mut params =
        CertificateParams::new(dns_names.iter().map(|n| (*n).to_string()).collect::<Vec<_>>()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    let key = KeyPair::generate().unwrap();
    params.serialize_request(&key).unwrap().pem().unwrap()
}

static PKI_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

/// Throwaway CA hierarchy; every instance has its own root name
pub struct TestPki {
    root: rcgen::Certificate,
    root_key: KeyPair,
    root_pem: String,
    intermediate: Option<(rcgen::Certificate, KeyPair, String)>,
}

impl TestPki {
    /// Root CA only
    pub fn new() -> Self {
        let n = PKI_COUNTER.fetch_add(1, Ordering::SeqCst);
        let root_key = KeyPair::generate().unwrap();
        let root = ca_params(&format!("Test Root {n}")).self_signed(&root_key).unwrap();
        let root_pem = root.pem();
        Self {
            root,
            root_key,
            root_pem,
            intermediate: None,
        }
    }

    /// Root CA plus one intermediate that signs the leaves
    pub fn with_intermediate() -> Self {
        let mut pki = Self::new();
        let n = PKI_COUNTER.fetch_add(1, Ordering::SeqCst);
        let key = KeyPair::generate().unwrap();
        let intermediate = ca_params(&format!("Test Intermediate {n}"))
            .signed_by(&key, &pki.root, &pki.root_key)
            .unwrap();
        let pem = intermediate.pem();
        pki.intermediate = Some((intermediate, key, pem));
        pki
    }

    pub fn root_pem(&self) -> &str {
        &self.root_pem
    }

    pub fn intermediate_pem(&self) -> Option<&str> {
        self.intermediate.as_ref().map(|(_, _, pem)| pem.as_str())
    }

    /// Leaf certificate PEM for `name`
    pub fn issue_leaf(&self, name: &str) -> String {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, name);
        let key = KeyPair::generate().unwrap();
        let (issuer, issuer_key) = match &self.intermediate {
            Some((cert, key, _)) => (cert, key),
            None => (&self.root, &self.root_key),
        };
        params.signed_by(&key, issuer, issuer_key).unwrap().pem()
    }
}
