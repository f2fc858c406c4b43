//! The persisted authorization state.
//!
//! [`AuthorizationState`] is the one record kept per client identity. It is
//! always written as a whole snapshot; the store bumps `version` on every
//! successful write.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, ServiceEndpoints};
use crate::token::TokenResponse;

/// How an access token relates to the freshness margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No access token stored.
    Missing,
    /// Usable without a refresh.
    Fresh,
    /// Expired or inside the margin.
    Stale,
}

/// A usable access token and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer token.
    pub token: String,
    /// Absolute expiry.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// The token value.
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The single persisted record for one client identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationState {
    /// Write counter, bumped by the store on every commit.
    #[serde(default)]
    pub version: u64,
    /// OAuth client ID.
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI.
    #[serde(default)]
    pub redirect_uri: String,
    /// Authorization endpoint.
    #[serde(default)]
    pub authorization_endpoint: String,
    /// Token endpoint.
    #[serde(default)]
    pub token_endpoint: String,
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// State nonce of the outstanding flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_nonce: Option<String>,
    /// PKCE verifier of the outstanding flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_verifier: Option<String>,
    /// Current access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Current refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Last OIDC identity token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Absolute expiry of `access_token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_expiry: Option<DateTime<Utc>>,
    /// Last authorization failure, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_authorization_error: Option<String>,
    /// Last token-endpoint failure, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_token_error: Option<String>,
}

impl AuthorizationState {
    /// An empty record carrying the identity from `config`.
    pub fn for_config(config: &AuthConfig) -> Self {
        let mut state = Self::default();
        state.set_identity(config, config.static_endpoints().as_ref());
        state
    }

    /// Overwrite the identity fields.
    pub fn set_identity(&mut self, config: &AuthConfig, endpoints: Option<&ServiceEndpoints>) {
        self.client_id = config.client_id.clone();
        self.redirect_uri = config.redirect_uri.clone();
        self.scopes = config.scopes.clone();
        if let Some(endpoints) = endpoints {
            self.authorization_endpoint = endpoints.authorization_endpoint.clone();
            self.token_endpoint = endpoints.token_endpoint.clone();
        }
    }

    /// Whether an access token is stored.
    pub fn is_authorized(&self) -> bool {
        self.access_token.is_some()
    }

    /// Whether an authorization flow is outstanding.
    pub fn has_pending_flow(&self) -> bool {
        self.pending_nonce.is_some()
    }

    /// Classify the access token. Fresh iff `now < expiry - margin`.
    pub fn freshness(&self, now: DateTime<Utc>, margin: Duration) -> Freshness {
        let fresh_until = |expiry: DateTime<Utc>| expiry.checked_sub_signed(margin);
        match (&self.access_token, self.access_token_expiry) {
            (Some(_), Some(expiry)) if fresh_until(expiry).is_some_and(|limit| now < limit) => {
                Freshness::Fresh
            }
            (Some(_), _) => Freshness::Stale,
            (None, _) => Freshness::Missing,
        }
    }

    /// The stored access token with its expiry.
    pub fn access_token(&self) -> Option<AccessToken> {
        match (&self.access_token, self.access_token_expiry) {
            (Some(token), Some(expires_at)) => Some(AccessToken {
                token: token.clone(),
                expires_at,
            }),
            _ => None,
        }
    }

    /// Record the nonce and verifier of a new flow.
    pub fn begin_pending(&mut self, nonce: impl Into<String>, verifier: impl Into<String>) {
        self.pending_nonce = Some(nonce.into());
        self.pending_verifier = Some(verifier.into());
        self.last_authorization_error = None;
    }

    /// Drop the pending-flow fields.
    pub fn clear_pending(&mut self) {
        self.pending_nonce = None;
        self.pending_verifier = None;
    }

    /// Apply a token response whose access token expires at `expires_at`
    /// (see [`TokenResponse::expires_at`]).
    ///
    /// The refresh and ID tokens are replaced only when the response carries
    /// new ones.
    pub fn apply_token_response(&mut self, response: &TokenResponse, expires_at: DateTime<Utc>) {
        self.access_token = Some(response.access_token.clone());
        self.access_token_expiry = Some(expires_at);
        if let Some(refresh) = &response.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
        if let Some(id_token) = &response.id_token {
            self.id_token = Some(id_token.clone());
        }
        self.last_token_error = None;
    }

    /// Drop every credential field.
    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.id_token = None;
        self.access_token_expiry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn authorized(expiry: DateTime<Utc>) -> AuthorizationState {
        AuthorizationState {
            access_token: Some("a1".into()),
            refresh_token: Some("r1".into()),
            access_token_expiry: Some(expiry),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(-1, Freshness::Stale)]
    #[case(0, Freshness::Stale)]
    #[case(1, Freshness::Fresh)]
    fn test_freshness_boundary(#[case] offset_secs: i64, #[case] expected: Freshness) {
        let now = Utc::now();
        let margin = Duration::seconds(60);
        let state = authorized(now + margin + Duration::seconds(offset_secs));
        assert_eq!(state.freshness(now, margin), expected);
    }

    #[test]
    fn test_freshness_missing() {
        let state = AuthorizationState::default();
        assert_eq!(state.freshness(Utc::now(), Duration::zero()), Freshness::Missing);
    }

    #[test]
    fn test_token_without_expiry_is_stale() {
        let mut state = authorized(Utc::now());
        state.access_token_expiry = None;
        assert_eq!(state.freshness(Utc::now(), Duration::zero()), Freshness::Stale);
        assert!(state.access_token().is_none());
    }

    #[test]
    fn test_refresh_token_kept_when_not_rotated() {
        let now = Utc::now();
        let mut state = authorized(now);
        let response = TokenResponse::bearer("a2", 600);
        let expires_at = response.expires_at(now, Duration::hours(1)).unwrap();
        state.apply_token_response(&response, expires_at);

        assert_eq!(state.access_token.as_deref(), Some("a2"));
        assert_eq!(state.refresh_token.as_deref(), Some("r1"));
        assert_eq!(state.access_token_expiry, Some(now + Duration::seconds(600)));
    }

    #[test]
    fn test_refresh_token_rotated() {
        let now = Utc::now();
        let mut state = authorized(now);
        let response = TokenResponse::bearer("a2", 600)
            .with_refresh_token("r2")
            .with_id_token("id2");
        state.apply_token_response(&response, now + Duration::seconds(600));

        assert_eq!(state.refresh_token.as_deref(), Some("r2"));
        assert_eq!(state.id_token.as_deref(), Some("id2"));
    }

    #[test]
    fn test_freshness_with_huge_margin_is_stale() {
        let now = Utc::now();
        let state = authorized(now + Duration::hours(1));
        assert_eq!(state.freshness(now, Duration::MAX), Freshness::Stale);
    }

    #[test]
    fn test_persisted_layout() {
        let mut state = authorized(Utc::now());
        state.version = 7;
        state.client_id = "client".into();
        state.scopes = vec!["openid".into()];
        state.begin_pending("n1", "v1");

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["version"], 7);
        assert_eq!(json["clientId"], "client");
        assert_eq!(json["pendingNonce"], "n1");
        assert_eq!(json["pendingVerifier"], "v1");
        assert_eq!(json["accessToken"], "a1");
        assert!(json.get("idToken").is_none());

        let parsed: AuthorizationState = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn test_clear_pending_and_tokens() {
        let mut state = authorized(Utc::now());
        state.begin_pending("n1", "v1");
        state.clear_pending();
        state.clear_tokens();

        assert!(!state.has_pending_flow());
        assert!(state.pending_verifier.is_none());
        assert!(!state.is_authorized());
        assert!(state.refresh_token.is_none());
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = authorized(Utc::now()).access_token().unwrap();
        assert!(!format!("{token:?}").contains("a1"));
        assert_eq!(token.as_str(), "a1");
    }
}
