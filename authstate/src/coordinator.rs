//! Token freshness and refresh.
//!
//! [`TokenLifecycleCoordinator`] hands out access tokens, refreshing them when
//! they fall inside the freshness margin. At most one refresh runs per
//! coordinator; concurrent callers join it and all observe the same outcome.
//!
//! The refresh itself runs on its own task. A caller that stops waiting (for
//! example after `refresh_timeout`) does not cancel it; the exchange runs on
//! until `exchange_timeout` and a late success is still committed for the
//! next caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use authstate_core::{
    AccessToken, AuthConfig, AuthError, AuthStatus, AuthorizationError, Clock, Freshness, Result,
    TokenEndpoint, TokenExchangeError, TokenRequest, TokenResponse,
};
use authstate_store::CredentialStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::commit::{commit_with, CommitOutcome};
use crate::status::StatusBroadcaster;

/// Timing knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Client ID sent with refresh grants when the record has none.
    pub client_id: String,
    /// Tokens expiring within this window are refreshed.
    pub freshness_margin: chrono::Duration,
    /// How long a caller waits for a refresh.
    pub refresh_timeout: Duration,
    /// Upper bound on the network exchange of one refresh, whether or not
    /// anyone is still waiting for it.
    pub exchange_timeout: Duration,
    /// Lifetime assumed when the token endpoint omits `expires_in`.
    pub default_token_lifetime: chrono::Duration,
}

impl RefreshSettings {
    /// Take the settings from a client configuration.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            freshness_margin: config.freshness_margin(),
            refresh_timeout: config.refresh_timeout(),
            exchange_timeout: config.exchange_timeout(),
            default_token_lifetime: config.default_token_lifetime(),
        }
    }
}

type RefreshOutcome = Result<AccessToken>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    /// Skip the network if another commit already made the token fresh.
    IfStale,
    /// Always ask the token endpoint.
    Force,
}

struct InFlight {
    attempt: u64,
    outcome: SharedRefresh,
}

/// Keeps tokens fresh and deduplicates refreshes. Clones share state.
#[derive(Clone)]
pub struct TokenLifecycleCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    clock: Arc<dyn Clock>,
    status: StatusBroadcaster,
    settings: RefreshSettings,
    in_flight: Mutex<Option<InFlight>>,
    attempts: AtomicU64,
}

impl std::fmt::Debug for TokenLifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleCoordinator")
            .field("settings", &self.inner.settings)
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

impl TokenLifecycleCoordinator {
    /// Create a coordinator over `store`, refreshing through `endpoint`.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
        clock: Arc<dyn Clock>,
        status: StatusBroadcaster,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                endpoint,
                clock,
                status,
                settings,
                in_flight: Mutex::new(None),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// The active settings.
    pub fn settings(&self) -> &RefreshSettings {
        &self.inner.settings
    }

    /// Whether a refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Return an access token that is valid for at least the freshness margin.
    ///
    /// A fresh stored token is returned without any network traffic. A stale
    /// one triggers a refresh, shared with any refresh already running.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] when there is nothing to refresh with,
    /// [`AuthError::Timeout`] when the refresh outlives `refresh_timeout`, and
    /// the token endpoint's error when the refresh fails.
    pub async fn get_valid_access_token(&self) -> Result<AccessToken> {
        let state = self.inner.store.get().await?;
        let now = self.inner.clock.now();

        if state.freshness(now, self.inner.settings.freshness_margin) == Freshness::Fresh {
            if let Some(token) = state.access_token() {
                return Ok(token);
            }
        }
        if state.refresh_token.is_none() {
            debug!("No usable access token and no refresh token");
            self.inner.status.publish(AuthStatus::Unauthenticated);
            return Err(AuthError::Unauthenticated);
        }

        self.refresh_with(RefreshMode::IfStale).await
    }

    /// Refresh unconditionally, joining a refresh that is already running.
    pub async fn refresh(&self) -> Result<AccessToken> {
        self.refresh_with(RefreshMode::Force).await
    }

    /// Commit the result of the authorization-code exchange for the flow
    /// identified by `nonce`.
    ///
    /// The tokens and the clearing of the pending flow land in one write.
    /// Nothing is published on failure; the flow controller reports it.
    ///
    /// # Errors
    ///
    /// [`AuthorizationError::Superseded`] when `nonce` is no longer the
    /// pending flow, because a newer request replaced it or it was already
    /// completed. The tokens are dropped in that case.
    pub async fn commit_after_authorization(
        &self,
        nonce: &str,
        response: &TokenResponse,
    ) -> Result<AccessToken> {
        let lifetime = self.inner.settings.default_token_lifetime;
        let expires_at = response.expires_at(self.inner.clock.now(), lifetime)?;

        let outcome = commit_with(self.inner.store.as_ref(), |state| {
            if state.pending_nonce.as_deref() != Some(nonce) {
                return false;
            }
            state.clear_pending();
            state.apply_token_response(response, expires_at);
            state.last_authorization_error = None;
            true
        })
        .await?;
        let CommitOutcome::Committed(committed) = outcome else {
            debug!("Authorization superseded before its tokens were committed");
            return Err(AuthorizationError::Superseded.into());
        };

        let token = committed
            .access_token()
            .ok_or_else(|| AuthError::Internal("committed record has no access token".into()))?;
        info!(
            version = committed.version,
            expires_at = %token.expires_at,
            "Authorization committed"
        );
        self.inner.status.publish(authorized(&token));
        Ok(token)
    }

    async fn refresh_with(&self, mode: RefreshMode) -> Result<AccessToken> {
        let outcome = self.join_or_start(mode);
        let timeout = self.inner.settings.refresh_timeout;
        match tokio::time::timeout(timeout, outcome).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Gave up waiting for refresh");
                Err(AuthError::Timeout(timeout))
            }
        }
    }

    fn join_or_start(&self, mode: RefreshMode) -> SharedRefresh {
        let mut slot = self.inner.in_flight.lock();
        if let Some(in_flight) = slot.as_ref() {
            debug!(attempt = in_flight.attempt, "Joining in-flight refresh");
            return in_flight.outcome.clone();
        }

        let attempt = self.inner.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _release = SlotGuard {
                inner: Arc::clone(&inner),
                attempt,
            };
            inner.run_refresh(attempt, mode).await
        });

        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(AuthError::Internal(format!("refresh task failed: {e}"))))
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            attempt,
            outcome: outcome.clone(),
        });
        outcome
    }
}

/// Empties the in-flight slot when the refresh task ends, however it ends.
struct SlotGuard {
    inner: Arc<Inner>,
    attempt: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.inner.in_flight.lock();
        if slot.as_ref().map(|f| f.attempt) == Some(self.attempt) {
            *slot = None;
        }
    }
}

impl Inner {
    async fn run_refresh(&self, attempt: u64, mode: RefreshMode) -> RefreshOutcome {
        let state = match self.store.get().await {
            Ok(state) => state,
            Err(e) => return Err(self.fail(e.into())),
        };

        if mode == RefreshMode::IfStale
            && state.freshness(self.clock.now(), self.settings.freshness_margin) == Freshness::Fresh
        {
            if let Some(token) = state.access_token() {
                debug!(attempt, "Token already refreshed by another writer");
                return Ok(token);
            }
        }

        let Some(refresh_token) = state.refresh_token.clone() else {
            info!(attempt, "No refresh token stored; authorization required");
            self.status.publish(AuthStatus::Unauthenticated);
            return Err(AuthError::Unauthenticated);
        };
        if state.token_endpoint.is_empty() {
            return Err(self.fail(AuthError::configuration(
                "no token endpoint recorded for this client",
            )));
        }

        self.status.publish(AuthStatus::Refreshing);
        debug!(attempt, "Refreshing access token");

        let client_id = if state.client_id.is_empty() {
            self.settings.client_id.clone()
        } else {
            state.client_id.clone()
        };
        let request = TokenRequest::RefreshToken {
            refresh_token: refresh_token.clone(),
            client_id,
        };

        let timeout = self.settings.exchange_timeout;
        let response = tokio::time::timeout(
            timeout,
            self.endpoint.request_token(&state.token_endpoint, &request),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TokenExchangeError::network(format!(
                "token endpoint did not answer within {timeout:?}"
            )))
        });

        match response {
            Ok(tokens) => self.commit_refresh(attempt, &refresh_token, &tokens).await,
            Err(err) if err.invalidates_session() => self.revoke(attempt, &refresh_token, err).await,
            Err(err) => {
                warn!(attempt, error = %err, "Refresh failed; keeping stored credentials");
                Err(self.fail(err.into()))
            }
        }
    }

    async fn commit_refresh(
        &self,
        attempt: u64,
        used: &str,
        tokens: &TokenResponse,
    ) -> RefreshOutcome {
        let lifetime = self.settings.default_token_lifetime;
        let expires_at = match tokens.expires_at(self.clock.now(), lifetime) {
            Ok(expires_at) => expires_at,
            Err(err) => {
                warn!(attempt, error = %err, "Unusable refresh response; keeping stored credentials");
                return Err(self.fail(err.into()));
            }
        };

        let outcome = commit_with(self.store.as_ref(), |state| {
            if state.refresh_token.as_deref() != Some(used) {
                return false;
            }
            state.apply_token_response(tokens, expires_at);
            true
        })
        .await;

        match outcome {
            Ok(CommitOutcome::Committed(state)) => {
                let token = state.access_token().ok_or_else(|| {
                    AuthError::Internal("committed record has no access token".into())
                })?;
                info!(
                    attempt,
                    version = state.version,
                    expires_at = %token.expires_at,
                    "Access token refreshed"
                );
                self.status.publish(authorized(&token));
                Ok(token)
            }
            Ok(CommitOutcome::Unchanged(state)) => {
                debug!(attempt, "Refresh result superseded by a newer commit; dropped");
                match state.access_token() {
                    Some(token) => {
                        self.status.publish(authorized(&token));
                        Ok(token)
                    }
                    None => {
                        self.status.publish(AuthStatus::Unauthenticated);
                        Err(AuthError::Unauthenticated)
                    }
                }
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn revoke(&self, attempt: u64, used: &str, err: TokenExchangeError) -> RefreshOutcome {
        warn!(attempt, error = %err, "Refresh token rejected; clearing credentials");
        let diagnostic = err.to_string();

        let cleared = commit_with(self.store.as_ref(), |state| {
            if state.refresh_token.as_deref() != Some(used) {
                return false;
            }
            state.clear_tokens();
            state.last_token_error = Some(diagnostic.clone());
            true
        })
        .await;

        match cleared {
            Ok(CommitOutcome::Unchanged(state)) if state.refresh_token.is_some() => {
                // A newer authorization replaced the rejected token.
                debug!(attempt, "Rejected refresh token already replaced");
            }
            Ok(_) => self.status.publish(AuthStatus::Unauthenticated),
            Err(e) => {
                warn!(attempt, error = %e, "Could not clear rejected credentials");
                return Err(self.fail(e.into()));
            }
        }
        Err(AuthError::TokenExchange(err))
    }

    fn fail(&self, err: AuthError) -> AuthError {
        self.status.publish(AuthStatus::error(err.kind(), err.to_string()));
        err
    }
}

fn authorized(token: &AccessToken) -> AuthStatus {
    AuthStatus::Authorized {
        access_token: token.token.clone(),
        expires_at: token.expires_at,
    }
}
