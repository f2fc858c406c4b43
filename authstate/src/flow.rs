//! Authorization-code flow with PKCE.
//!
//! The controller persists the nonce and verifier before anything is shown
//! to the user, so a redirect can be completed by a fresh controller after a
//! process restart.
//!
//! Once the code exchange has started, every write is conditional on the
//! flow's nonce still being the pending one. A newer request issued during
//! the exchange keeps its pending flow, and a redirect delivered twice is
//! exchanged once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use authstate_core::{
    AccessToken, AuthConfig, AuthError, AuthStatus, AuthorizationError, DiscoveryProvider,
    LaunchDescriptor, PkcePair, RedirectResult, Result, ServiceEndpoints, TokenEndpoint,
    TokenExchangeError, TokenRequest,
};
use authstate_store::CredentialStore;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::commit::{commit_with, CommitOutcome};
use crate::coordinator::TokenLifecycleCoordinator;
use crate::status::StatusBroadcaster;

/// Where the controller is in its flow.
#[derive(Debug, Clone, Default)]
pub enum FlowState {
    /// Nothing started.
    #[default]
    Idle,
    /// The request was issued; waiting for the user agent.
    AwaitingRedirect,
    /// The code is being exchanged for tokens.
    ExchangingCode,
    /// The flow produced tokens.
    Authorized,
    /// The flow ended with an error.
    Failed(AuthError),
}

impl FlowState {
    /// Whether the flow has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorized | Self::Failed(_))
    }
}

/// Drives one authorization attempt at a time.
pub struct AuthorizationFlowController {
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    discovery: Option<Arc<dyn DiscoveryProvider>>,
    coordinator: TokenLifecycleCoordinator,
    status: StatusBroadcaster,
    state: Mutex<FlowState>,
    completing: Mutex<HashSet<String>>,
    exchange_timeout: Duration,
}

impl std::fmt::Debug for AuthorizationFlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationFlowController")
            .field("state", &*self.state.lock())
            .field("discovery", &self.discovery.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthorizationFlowController {
    /// Create a controller. Committing tokens goes through `coordinator` so
    /// both share one view of the record.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        coordinator: TokenLifecycleCoordinator,
        status: StatusBroadcaster,
    ) -> Self {
        let exchange_timeout = coordinator.settings().refresh_timeout;
        Self {
            store,
            endpoint,
            discovery: None,
            coordinator,
            status,
            state: Mutex::new(FlowState::Idle),
            completing: Mutex::new(HashSet::new()),
            exchange_timeout,
        }
    }

    /// Resolve endpoints through `discovery` when the config has none.
    #[must_use]
    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryProvider>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// The current flow state.
    pub fn state(&self) -> FlowState {
        self.state.lock().clone()
    }

    /// Start an authorization request.
    ///
    /// Generates a fresh state nonce and PKCE pair, persists them with the
    /// client identity in one write, and returns what the user agent needs.
    /// Any earlier pending flow is superseded.
    pub async fn begin_authorization(&self, config: &AuthConfig) -> Result<LaunchDescriptor> {
        self.status.publish(AuthStatus::Authenticating);

        let endpoints = match self.resolve_endpoints(config).await {
            Ok(endpoints) => endpoints,
            Err(err) => return Err(self.fail_without_write(err)),
        };

        let pkce = PkcePair::generate();
        let nonce = authstate_core::generate_nonce();
        let descriptor =
            match LaunchDescriptor::build(config, &endpoints.authorization_endpoint, &nonce, &pkce)
            {
                Ok(descriptor) => descriptor,
                Err(err) => return Err(self.fail_without_write(err)),
            };

        let committed = commit_with(self.store.as_ref(), |state| {
            state.set_identity(config, Some(&endpoints));
            state.begin_pending(nonce.clone(), pkce.code_verifier.clone());
            true
        })
        .await;
        if let Err(err) = committed {
            return Err(self.fail_without_write(err.into()));
        }

        self.set_state(FlowState::AwaitingRedirect);
        info!(
            client_id = %config.client_id,
            endpoint = %endpoints.authorization_endpoint,
            "Authorization request issued"
        );
        Ok(descriptor)
    }

    /// Finish the flow with what arrived on the redirect URI.
    ///
    /// Validates the echoed state against the persisted nonce, exchanges the
    /// code with the persisted verifier, and commits the tokens. On any
    /// failure the pending flow is cleared and the error is recorded.
    ///
    /// A redirect that arrives with no flow pending, or for a flow that is
    /// already being completed, is rejected without touching the record or
    /// the published status. So is a flow replaced by a newer
    /// [`begin_authorization`](Self::begin_authorization) while its code was
    /// being exchanged; that exchange's tokens are dropped.
    pub async fn complete_authorization(&self, redirect: RedirectResult) -> Result<AccessToken> {
        let record = match self.store.get().await {
            Ok(record) => record,
            Err(err) => return Err(self.fail_without_write(err.into())),
        };

        if let Some(code) = redirect.error.as_deref() {
            let err =
                AuthorizationError::from_redirect_error(code, redirect.error_description.as_deref());
            info!(error = %err, "Authorization redirect reported an error");
            return Err(self.fail(err.into()).await);
        }

        let (Some(nonce), Some(verifier)) = (record.pending_nonce, record.pending_verifier) else {
            warn!("Redirect received with no authorization in progress");
            return Err(
                AuthorizationError::InvalidRequest("no authorization request is pending".into())
                    .into(),
            );
        };

        if redirect.state.as_deref() != Some(nonce.as_str()) {
            warn!("Rejecting redirect with mismatched state");
            return Err(self.fail(AuthorizationError::StateMismatch.into()).await);
        }

        let Some(_claim) = CompletionClaim::acquire(&self.completing, &nonce) else {
            debug!("Redirect for a flow that is already being completed");
            return Err(AuthorizationError::Superseded.into());
        };

        let Some(code) = redirect.code.filter(|code| !code.is_empty()) else {
            let err = AuthorizationError::InvalidRequest("redirect carried no code".into());
            return Err(self.fail_pending(&nonce, err.into()).await);
        };

        self.set_state(FlowState::ExchangingCode);
        debug!("Exchanging authorization code");

        let request = TokenRequest::AuthorizationCode {
            code,
            code_verifier: verifier,
            redirect_uri: record.redirect_uri,
            client_id: record.client_id,
        };
        let timeout = self.exchange_timeout;
        let response = tokio::time::timeout(
            timeout,
            self.endpoint.request_token(&record.token_endpoint, &request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TokenExchangeError::network(format!(
                "token endpoint did not answer within {timeout:?}"
            )))
        });

        let tokens = match response {
            Ok(tokens) => tokens,
            Err(err) => return Err(self.fail_pending(&nonce, err.into()).await),
        };

        match self.coordinator.commit_after_authorization(&nonce, &tokens).await {
            Ok(token) => {
                self.set_state(FlowState::Authorized);
                Ok(token)
            }
            Err(err @ AuthError::Authorization(AuthorizationError::Superseded)) => {
                info!("Authorization superseded during the code exchange; tokens dropped");
                Err(self.settle_superseded(err))
            }
            Err(err) => Err(self.fail_pending(&nonce, err).await),
        }
    }

    /// End the pending flow with `error`, for example when the user agent
    /// could not be opened or the user closed it.
    pub async fn abort_authorization(&self, error: AuthorizationError) -> AuthError {
        info!(error = %error, "Authorization aborted");
        self.fail(error.into()).await
    }

    /// Forget the in-memory flow state. The persisted record is untouched.
    pub fn reset(&self) {
        self.set_state(FlowState::Idle);
    }

    async fn resolve_endpoints(&self, config: &AuthConfig) -> Result<ServiceEndpoints> {
        if let Some(endpoints) = config.static_endpoints() {
            return Ok(endpoints);
        }
        let (Some(issuer), Some(discovery)) = (config.issuer.as_deref(), &self.discovery) else {
            return Err(AuthError::configuration(
                "no endpoints configured and no discovery available",
            ));
        };
        debug!(issuer, "Resolving endpoints by discovery");
        Ok(discovery.discover(issuer).await?)
    }

    /// Clear the pending flow, record `err`, and publish it.
    async fn fail(&self, err: AuthError) -> AuthError {
        let diagnostic = err.to_string();
        let recorded = commit_with(self.store.as_ref(), |state| {
            state.clear_pending();
            state.last_authorization_error = Some(diagnostic.clone());
            true
        })
        .await;
        if let Err(store_err) = recorded {
            warn!(error = %store_err, "Could not record authorization failure");
        }
        self.fail_without_write(err)
    }

    /// Like [`fail`](Self::fail), but only while `nonce` is still the pending
    /// flow. Otherwise a newer flow owns the record and the status, and `err`
    /// is returned untouched.
    async fn fail_pending(&self, nonce: &str, err: AuthError) -> AuthError {
        let diagnostic = err.to_string();
        let recorded = commit_with(self.store.as_ref(), |state| {
            if state.pending_nonce.as_deref() != Some(nonce) {
                return false;
            }
            state.clear_pending();
            state.last_authorization_error = Some(diagnostic.clone());
            true
        })
        .await;
        match recorded {
            Ok(CommitOutcome::Unchanged(_)) => {
                debug!(error = %err, "Failed flow was already superseded");
                return self.settle_superseded(err);
            }
            Ok(CommitOutcome::Committed(_)) => {}
            Err(store_err) => warn!(error = %store_err, "Could not record authorization failure"),
        }
        self.fail_without_write(err)
    }

    /// End a superseded exchange without publishing. A newer flow started
    /// here keeps its state.
    fn settle_superseded(&self, err: AuthError) -> AuthError {
        let mut state = self.state.lock();
        if matches!(*state, FlowState::ExchangingCode) {
            *state = FlowState::Failed(err.clone());
        }
        err
    }

    fn fail_without_write(&self, err: AuthError) -> AuthError {
        self.set_state(FlowState::Failed(err.clone()));
        self.status
            .publish(AuthStatus::error(err.kind(), err.to_string()));
        err
    }

    fn set_state(&self, next: FlowState) {
        *self.state.lock() = next;
    }
}

/// Marks a nonce as being completed by this controller until dropped.
struct CompletionClaim<'a> {
    completing: &'a Mutex<HashSet<String>>,
    nonce: String,
}

impl<'a> CompletionClaim<'a> {
    fn acquire(completing: &'a Mutex<HashSet<String>>, nonce: &str) -> Option<Self> {
        completing.lock().insert(nonce.to_string()).then(|| Self {
            completing,
            nonce: nonce.to_string(),
        })
    }
}

impl Drop for CompletionClaim<'_> {
    fn drop(&mut self) {
        self.completing.lock().remove(&self.nonce);
    }
}
