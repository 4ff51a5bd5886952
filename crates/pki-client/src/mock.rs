//! Mock PkiClient for unit testing
//!
//! In-memory implementation of [`PkiClientTrait`] that records every call and
//! serves scripted request states, so reconcilers can be tested without a PKI.

use crate::credentials::{ClientConfig, Credentials};
use crate::error::PkiError;
use crate::models::*;
use crate::pki_trait::{PkiClientFactory, PkiClientTrait};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Operations of the PKI client capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `check_health`
    CheckHealth,
    /// `submit_enroll`
    SubmitEnroll,
    /// `submit_renew`
    SubmitRenew,
    /// `poll_status`
    PollStatus,
    /// `revoke`
    Revoke,
}

/// A recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// Health probe
    CheckHealth,
    /// Enrollment
    SubmitEnroll(EnrollRequest),
    /// Renewal
    SubmitRenew {
        /// Certificate being renewed
        certificate_id: String,
        /// CSR
        csr: String,
    },
    /// Poll
    PollStatus(String),
    /// Revocation
    Revoke {
        /// Certificate PEM
        certificate_pem: String,
        /// Reason
        reason: RevocationReason,
    },
}

impl MockCall {
    /// Operation of this call
    pub fn operation(&self) -> Operation {
        match self {
            MockCall::CheckHealth => Operation::CheckHealth,
            MockCall::SubmitEnroll(_) => Operation::SubmitEnroll,
            MockCall::SubmitRenew { .. } => Operation::SubmitRenew,
            MockCall::PollStatus(_) => Operation::PollStatus,
            MockCall::Revoke { .. } => Operation::Revoke,
        }
    }
}

/// Mock PkiClient for testing
///
/// Submissions create `Pending` requests with ids `req-1`, `req-2`, ...
/// Tests move them along with [`MockPkiClient::set_request`].
#[derive(Clone)]
pub struct MockPkiClient {
    base_url: String,
    requests: Arc<Mutex<HashMap<String, PkiRequest>>>,
    failures: Arc<Mutex<HashMap<Operation, fn() -> PkiError>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    next_id: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockPkiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPkiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MockPkiClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            requests: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Add or replace a request (for test setup)
    pub fn set_request(&self, request: PkiRequest) {
        self.requests
            .lock()
            .unwrap()
            .insert(request.id.clone(), request);
    }

    /// Make every call of `operation` fail with the error built by `error`
    pub fn fail(&self, operation: Operation, error: fn() -> PkiError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    /// Stop failing `operation`
    pub fn clear_failure(&self, operation: Operation) {
        self.failures.lock().unwrap().remove(&operation);
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls of `operation`
    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Number of recorded calls of any operation
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: MockCall) -> Result<(), PkiError> {
        let operation = call.operation();
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().get(&operation) {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    fn create_pending(&self, workflow: Workflow) -> String {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = format!("req-{}", *next);
            *next += 1;
            id
        };
        self.set_request(PkiRequest {
            id: id.clone(),
            workflow: Some(workflow),
            status: RequestStatus::Pending,
            certificate: None,
        });
        id
    }
}

#[async_trait::async_trait]
impl PkiClientTrait for MockPkiClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_health(&self) -> Result<(), PkiError> {
        self.record(MockCall::CheckHealth)
    }

    async fn submit_enroll(&self, request: &EnrollRequest) -> Result<String, PkiError> {
        self.record(MockCall::SubmitEnroll(request.clone()))?;
        Ok(self.create_pending(Workflow::Enroll))
    }

    async fn submit_renew(&self, certificate_id: &str, csr: &str) -> Result<String, PkiError> {
        self.record(MockCall::SubmitRenew {
            certificate_id: certificate_id.to_string(),
            csr: csr.to_string(),
        })?;
        Ok(self.create_pending(Workflow::Renew))
    }

    async fn poll_status(&self, request_id: &str) -> Result<PkiRequest, PkiError> {
        self.record(MockCall::PollStatus(request_id.to_string()))?;
        self.requests
            .lock()
            .unwrap()
            .get(request_id)
            .cloned()
            .ok_or_else(|| PkiError::NotFound(format!("request {request_id}")))
    }

    async fn revoke(&self, certificate_pem: &str, reason: RevocationReason) -> Result<(), PkiError> {
        self.record(MockCall::Revoke {
            certificate_pem: certificate_pem.to_string(),
            reason,
        })
    }
}

/// Factory handing out one shared [`MockPkiClient`]
#[derive(Clone, Debug)]
pub struct MockPkiClientFactory {
    client: MockPkiClient,
    built: Arc<Mutex<Vec<(ClientConfig, Credentials)>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockPkiClientFactory {
    /// Factory serving `client`
    pub fn new(client: MockPkiClient) -> Self {
        Self {
            client,
            built: Arc::new(Mutex::new(Vec::new())),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// The shared client
    pub fn client(&self) -> &MockPkiClient {
        &self.client
    }

    /// Make `build` fail with an `InvalidConfig` error
    pub fn fail_build(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    /// Configs and credentials passed to `build`
    pub fn built(&self) -> Vec<(ClientConfig, Credentials)> {
        self.built.lock().unwrap().clone()
    }
}

impl PkiClientFactory for MockPkiClientFactory {
    fn build(
        &self,
        config: &ClientConfig,
        credentials: Credentials,
    ) -> Result<Arc<dyn PkiClientTrait>, PkiError> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(PkiError::InvalidConfig(message));
        }
        self.built
            .lock()
            .unwrap()
            .push((config.clone(), credentials));
        Ok(Arc::new(self.client.clone()))
    }
}
