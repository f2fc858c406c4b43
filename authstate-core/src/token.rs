//! Token endpoint wire types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TokenExchangeError;

/// Token response from OAuth token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer access token.
    pub access_token: String,
    /// Rotated refresh token, if the server issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OIDC identity token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Usually `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Granted scopes, space separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Create a bearer response with a lifetime.
    pub fn bearer(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            token_type: Some("Bearer".to_string()),
            expires_in: Some(expires_in),
            scope: None,
        }
    }

    /// Set the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Set the ID token.
    #[must_use]
    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    /// Absolute expiry of the access token when received at `now`.
    ///
    /// A missing `expires_in` falls back to `default_lifetime`.
    ///
    /// # Errors
    ///
    /// [`TokenExchangeError::MalformedResponse`] when the expiry does not fit
    /// in a timestamp.
    pub fn expires_at(
        &self,
        now: DateTime<Utc>,
        default_lifetime: Duration,
    ) -> Result<DateTime<Utc>, TokenExchangeError> {
        let out_of_range = || {
            TokenExchangeError::malformed(format!("expires_in out of range: {:?}", self.expires_in))
        };
        let lifetime = match self.expires_in {
            Some(secs) => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(out_of_range)?,
            None => default_lifetime,
        };
        now.checked_add_signed(lifetime).ok_or_else(out_of_range)
    }
}

/// OAuth error body (`{error, error_description}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenErrorBody {
    /// OAuth error code.
    pub error: String,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenErrorBody {
    /// Create an error body with only a code.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: None,
        }
    }
}

/// A request to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    /// Exchange an authorization code (with its PKCE verifier).
    AuthorizationCode {
        /// Code from the redirect.
        code: String,
        /// PKCE verifier issued with the request.
        code_verifier: String,
        /// Redirect URI used in the request.
        redirect_uri: String,
        /// Client identifier.
        client_id: String,
    },
    /// Obtain a new access token from a refresh token.
    RefreshToken {
        /// Current refresh token.
        refresh_token: String,
        /// Client identifier.
        client_id: String,
    },
}

impl TokenRequest {
    /// The `grant_type` value for this request.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form-encoded body parameters.
    pub fn form_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("grant_type", self.grant_type())];
        match self {
            Self::AuthorizationCode {
                code,
                code_verifier,
                redirect_uri,
                client_id,
            } => {
                params.push(("code", code.as_str()));
                params.push(("redirect_uri", redirect_uri.as_str()));
                params.push(("client_id", client_id.as_str()));
                params.push(("code_verifier", code_verifier.as_str()));
            }
            Self::RefreshToken {
                refresh_token,
                client_id,
            } => {
                params.push(("refresh_token", refresh_token.as_str()));
                params.push(("client_id", client_id.as_str()));
            }
        }
        params
    }
}
