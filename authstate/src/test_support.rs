//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authstate_core::{
    AuthorizationState, StoreError, TokenEndpoint, TokenExchangeError, TokenRequest,
    TokenResponse,
};
use authstate_store::{CredentialStore, InMemoryCredentialStore, StoreResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Route tracing output through the test harness. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fixed instant used as "now" by the tests.
pub(crate) fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

type Outcome = Result<TokenResponse, TokenExchangeError>;

/// Token endpoint answering from a queue, counting every call.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTokenEndpoint {
    outcomes: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<(String, TokenRequest)>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedTokenEndpoint {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn respond(self, outcome: Outcome) -> Self {
        self.outcomes.lock().push_back(outcome);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<(String, TokenRequest)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TokenEndpoint for ScriptedTokenEndpoint {
    async fn request_token(
        &self,
        token_endpoint: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .push((token_endpoint.to_string(), request.clone()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.outcomes.lock().pop_front();
        next.unwrap_or_else(|| Err(TokenExchangeError::network("no scripted response")))
    }
}

type Interference = Box<dyn Fn(&mut AuthorizationState) + Send + Sync>;

/// In-memory store that lets another writer win the race exactly once: the
/// first `replace` commits `interfere` underneath the caller before
/// delegating, so the caller sees a version conflict.
pub(crate) struct InterferingStore {
    inner: InMemoryCredentialStore,
    interfere: Interference,
    interfered: AtomicUsize,
}

impl InterferingStore {
    pub(crate) fn new<F>(interfere: F) -> Self
    where
        F: Fn(&mut AuthorizationState) + Send + Sync + 'static,
    {
        Self::wrapping(InMemoryCredentialStore::new(), interfere)
    }

    pub(crate) fn wrapping<F>(inner: InMemoryCredentialStore, interfere: F) -> Self
    where
        F: Fn(&mut AuthorizationState) + Send + Sync + 'static,
    {
        Self {
            inner,
            interfere: Box::new(interfere),
            interfered: AtomicUsize::new(0),
        }
    }

    pub(crate) fn interference_count(&self) -> usize {
        self.interfered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for InterferingStore {
    async fn get(&self) -> StoreResult<AuthorizationState> {
        self.inner.get().await
    }

    async fn replace(
        &self,
        state: AuthorizationState,
        expected_version: u64,
    ) -> StoreResult<AuthorizationState> {
        let first = self
            .interfered
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            let mut other = self.inner.get().await?;
            (self.interfere)(&mut other);
            let version = other.version;
            self.inner.replace(other, version).await?;
        }
        self.inner.replace(state, expected_version).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.inner.clear().await
    }
}

/// Store whose every operation fails with an I/O error.
#[derive(Debug, Default)]
pub(crate) struct BrokenStore;

fn broken() -> StoreError {
    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "disk unavailable").into()
}

#[async_trait]
impl CredentialStore for BrokenStore {
    async fn get(&self) -> StoreResult<AuthorizationState> {
        Err(broken())
    }

    async fn replace(&self, _: AuthorizationState, _: u64) -> StoreResult<AuthorizationState> {
        Err(broken())
    }

    async fn clear(&self) -> StoreResult<()> {
        Err(broken())
    }
}

/// In-memory store that can be read but not written.
pub(crate) struct ReadOnlyStore {
    inner: InMemoryCredentialStore,
}

impl ReadOnlyStore {
    pub(crate) fn wrapping(inner: InMemoryCredentialStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CredentialStore for ReadOnlyStore {
    async fn get(&self) -> StoreResult<AuthorizationState> {
        self.inner.get().await
    }

    async fn replace(&self, _: AuthorizationState, _: u64) -> StoreResult<AuthorizationState> {
        Err(broken())
    }

    async fn clear(&self) -> StoreResult<()> {
        Err(broken())
    }
}

/// Shared handle to a scripted endpoint, for passing to constructors.
pub(crate) fn shared(endpoint: ScriptedTokenEndpoint) -> Arc<ScriptedTokenEndpoint> {
    Arc::new(endpoint)
}
