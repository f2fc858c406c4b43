//! The application-facing session.
//!
//! [`AuthSession`] wires one store, one coordinator and one flow controller
//! for a single client identity. Build it once per identity and share it.

use std::sync::Arc;

use authstate_core::{
    AccessToken, AuthConfig, AuthError, AuthStatus, AuthorizationError, AuthorizationState, Clock,
    DiscoveryProvider, LaunchDescriptor, RedirectResult, Result, SystemClock, TokenEndpoint,
    UserAgentLauncher,
};
use authstate_store::{CredentialStore, InMemoryCredentialStore};
use futures::Stream;
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

use crate::coordinator::{RefreshSettings, TokenLifecycleCoordinator};
use crate::flow::{AuthorizationFlowController, FlowState};
use crate::status::StatusBroadcaster;

/// Authorization state manager for one client identity.
pub struct AuthSession {
    config: AuthConfig,
    store: Arc<dyn CredentialStore>,
    coordinator: TokenLifecycleCoordinator,
    flow: AuthorizationFlowController,
    launcher: Option<Arc<dyn UserAgentLauncher>>,
    status: StatusBroadcaster,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("client_id", &self.config.client_id)
            .field("coordinator", &self.coordinator)
            .field("flow", &self.flow)
            .field("launcher", &self.launcher.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    /// Start building a session for `config`.
    pub fn builder(config: AuthConfig) -> AuthSessionBuilder {
        AuthSessionBuilder::new(config)
    }

    /// The session's configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The token coordinator.
    pub fn coordinator(&self) -> &TokenLifecycleCoordinator {
        &self.coordinator
    }

    /// The flow controller.
    pub fn flow(&self) -> &AuthorizationFlowController {
        &self.flow
    }

    /// Load the persisted record and publish the matching status.
    ///
    /// Call once at startup. A stored token is reported as authorized even if
    /// it is stale; the next [`access_token`](Self::access_token) refreshes it.
    pub async fn restore(&self) -> Result<AuthStatus> {
        let state = self.store.get().await?;
        let status = match state.access_token() {
            Some(token) => AuthStatus::Authorized {
                access_token: token.token,
                expires_at: token.expires_at,
            },
            None => AuthStatus::Unauthenticated,
        };
        info!(
            version = state.version,
            authorized = status.is_authorized(),
            pending = state.has_pending_flow(),
            "Restored authorization state"
        );
        self.status.publish(status.clone());
        Ok(status)
    }

    /// Run the whole flow through the configured user agent.
    ///
    /// # Errors
    ///
    /// [`AuthError::Configuration`] when no launcher was configured, otherwise
    /// whatever the flow failed with.
    pub async fn login(&self) -> Result<AccessToken> {
        let Some(launcher) = self.launcher.clone() else {
            return Err(AuthError::configuration("no user agent launcher configured"));
        };

        let descriptor = self.begin_login().await?;
        debug!(url = %descriptor.authorization_url, "Launching user agent");
        match launcher.launch(&descriptor).await {
            Ok(redirect) => self.complete_login(redirect).await,
            Err(err) => Err(self.flow.abort_authorization(err).await),
        }
    }

    /// Start a flow whose user agent the caller drives.
    pub async fn begin_login(&self) -> Result<LaunchDescriptor> {
        self.flow.begin_authorization(&self.config).await
    }

    /// Finish a flow started with [`begin_login`](Self::begin_login).
    pub async fn complete_login(&self, redirect: RedirectResult) -> Result<AccessToken> {
        self.flow.complete_authorization(redirect).await
    }

    /// Finish a flow from the full redirect URL the user agent landed on.
    pub async fn complete_login_from_url(&self, url: &Url) -> Result<AccessToken> {
        self.complete_login(RedirectResult::from_redirect_url(url))
            .await
    }

    /// Give up on the pending flow.
    pub async fn cancel_login(&self) -> AuthError {
        self.flow
            .abort_authorization(AuthorizationError::UserCancelled)
            .await
    }

    /// A token valid for at least the freshness margin, refreshing if needed.
    pub async fn access_token(&self) -> Result<AccessToken> {
        self.coordinator.get_valid_access_token().await
    }

    /// Refresh now, regardless of freshness.
    pub async fn refresh(&self) -> Result<AccessToken> {
        self.coordinator.refresh().await
    }

    /// Drop every stored credential and any pending flow.
    pub async fn sign_out(&self) -> Result<()> {
        self.store.clear().await?;
        self.flow.reset();
        info!(client_id = %self.config.client_id, "Signed out");
        self.status.publish(AuthStatus::Unauthenticated);
        Ok(())
    }

    /// A copy of the persisted record.
    pub async fn snapshot(&self) -> Result<AuthorizationState> {
        Ok(self.store.get().await?)
    }

    /// The latest published status.
    pub fn status(&self) -> AuthStatus {
        self.status.current()
    }

    /// Receive every future status.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    /// Every future status as a stream.
    pub fn status_stream(&self) -> impl Stream<Item = AuthStatus> + Send + 'static {
        self.status.stream()
    }

    /// Where the flow controller is.
    pub fn flow_state(&self) -> FlowState {
        self.flow.state()
    }
}

/// Builder for [`AuthSession`].
pub struct AuthSessionBuilder {
    config: AuthConfig,
    store: Option<Arc<dyn CredentialStore>>,
    endpoint: Option<Arc<dyn TokenEndpoint>>,
    discovery: Option<Arc<dyn DiscoveryProvider>>,
    launcher: Option<Arc<dyn UserAgentLauncher>>,
    clock: Option<Arc<dyn Clock>>,
    status_capacity: Option<usize>,
}

impl AuthSessionBuilder {
    /// Create a builder for `config`.
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            store: None,
            endpoint: None,
            discovery: None,
            launcher: None,
            clock: None,
            status_capacity: None,
        }
    }

    /// Persist through `store`. Defaults to an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Talk to the token endpoint through `endpoint`.
    #[must_use]
    pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Resolve the issuer through `discovery`.
    #[must_use]
    pub fn discovery(mut self, discovery: Arc<dyn DiscoveryProvider>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Open the user agent through `launcher`, enabling [`AuthSession::login`].
    #[must_use]
    pub fn launcher(mut self, launcher: Arc<dyn UserAgentLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Use `clock` for freshness decisions.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Buffer this many statuses per slow subscriber.
    #[must_use]
    pub fn status_capacity(mut self, capacity: usize) -> Self {
        self.status_capacity = Some(capacity);
        self
    }

    /// Validate the configuration and assemble the session.
    pub fn build(self) -> Result<AuthSession> {
        self.config.validate()?;

        let endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None => default_token_endpoint(&self.config)?,
        };
        let discovery = self
            .discovery
            .or_else(|| default_discovery(&self.config));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCredentialStore::new()) as Arc<dyn CredentialStore>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let status = match self.status_capacity {
            Some(capacity) => StatusBroadcaster::with_capacity(capacity),
            None => StatusBroadcaster::new(),
        };

        let coordinator = TokenLifecycleCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&endpoint),
            clock,
            status.clone(),
            RefreshSettings::from_config(&self.config),
        );
        let mut flow = AuthorizationFlowController::new(
            Arc::clone(&store),
            endpoint,
            coordinator.clone(),
            status.clone(),
        );
        if let Some(discovery) = discovery {
            flow = flow.with_discovery(discovery);
        }

        debug!(client_id = %self.config.client_id, "Built auth session");
        Ok(AuthSession {
            config: self.config,
            store,
            coordinator,
            flow,
            launcher: self.launcher,
            status,
        })
    }
}

#[cfg(feature = "http")]
fn default_token_endpoint(config: &AuthConfig) -> Result<Arc<dyn TokenEndpoint>> {
    Ok(Arc::new(
        authstate_http::HttpTokenEndpoint::new().with_timeout(config.exchange_timeout()),
    ))
}

#[cfg(not(feature = "http"))]
fn default_token_endpoint(_config: &AuthConfig) -> Result<Arc<dyn TokenEndpoint>> {
    Err(AuthError::configuration(
        "no token endpoint given and the `http` feature is disabled",
    ))
}

#[cfg(feature = "http")]
fn default_discovery(config: &AuthConfig) -> Option<Arc<dyn DiscoveryProvider>> {
    config
        .issuer
        .as_ref()
        .map(|_| Arc::new(authstate_http::HttpDiscovery::new()) as Arc<dyn DiscoveryProvider>)
}

#[cfg(not(feature = "http"))]
fn default_discovery(_config: &AuthConfig) -> Option<Arc<dyn DiscoveryProvider>> {
    None
}
