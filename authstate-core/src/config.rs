//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::AuthError;

const DEFAULT_FRESHNESS_MARGIN_SECS: u64 = 60;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 120;

/// Upper bound for every duration setting: one year.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Authorization and token endpoints of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
}

/// Configuration for one client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth client ID.
    pub client_id: String,
    /// Redirect URI registered for the client.
    pub redirect_uri: String,
    /// OIDC issuer, used for discovery when endpoints are not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Explicit authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// Explicit token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Tokens expiring within this many seconds count as stale.
    #[serde(default = "default_freshness_margin")]
    pub freshness_margin_secs: u64,
    /// How long a caller waits for a refresh, in seconds.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Upper bound on one token-endpoint exchange, in seconds. A refresh
    /// keeps running in the background after its callers stop waiting, up
    /// to this bound.
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_secs: u64,
    /// Lifetime assumed when a token response omits `expires_in`.
    #[serde(default = "default_token_lifetime")]
    pub default_token_lifetime_secs: u64,
    /// Extra query parameters for the authorization URL.
    #[serde(default)]
    pub extra_authorization_params: Vec<(String, String)>,
}

fn default_freshness_margin() -> u64 {
    DEFAULT_FRESHNESS_MARGIN_SECS
}

fn default_refresh_timeout() -> u64 {
    DEFAULT_REFRESH_TIMEOUT_SECS
}

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

fn default_exchange_timeout() -> u64 {
    DEFAULT_EXCHANGE_TIMEOUT_SECS
}

fn chrono_seconds(secs: u64) -> chrono::Duration {
    // Bounded well inside chrono's range.
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

impl AuthConfig {
    /// Create a new configuration.
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            issuer: None,
            authorization_endpoint: None,
            token_endpoint: None,
            scopes: Vec::new(),
            freshness_margin_secs: DEFAULT_FRESHNESS_MARGIN_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            exchange_timeout_secs: DEFAULT_EXCHANGE_TIMEOUT_SECS,
            default_token_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            extra_authorization_params: Vec::new(),
        }
    }

    /// Load configuration from `AUTHSTATE_*` environment variables.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AuthError::configuration(format!("{key} not set")))
        };
        let seconds = |key: &str, default: u64| -> Result<u64, AuthError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| AuthError::configuration(format!("{key} is not a number: {raw}"))),
                None => Ok(default),
            }
        };

        let mut config = Self::new(
            required("AUTHSTATE_CLIENT_ID")?,
            required("AUTHSTATE_REDIRECT_URI")?,
        );
        config.issuer = lookup("AUTHSTATE_ISSUER");
        config.authorization_endpoint = lookup("AUTHSTATE_AUTHORIZATION_ENDPOINT");
        config.token_endpoint = lookup("AUTHSTATE_TOKEN_ENDPOINT");
        if let Some(scopes) = lookup("AUTHSTATE_SCOPES") {
            config.scopes = scopes.split_whitespace().map(str::to_string).collect();
        }
        config.freshness_margin_secs =
            seconds("AUTHSTATE_FRESHNESS_MARGIN_SECS", DEFAULT_FRESHNESS_MARGIN_SECS)?;
        config.refresh_timeout_secs =
            seconds("AUTHSTATE_REFRESH_TIMEOUT_SECS", DEFAULT_REFRESH_TIMEOUT_SECS)?;
        config.exchange_timeout_secs =
            seconds("AUTHSTATE_EXCHANGE_TIMEOUT_SECS", DEFAULT_EXCHANGE_TIMEOUT_SECS)?;
        config.default_token_lifetime_secs =
            seconds("AUTHSTATE_DEFAULT_TOKEN_LIFETIME_SECS", DEFAULT_TOKEN_LIFETIME_SECS)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the issuer used for discovery.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set explicit endpoints (skips discovery).
    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        self.authorization_endpoint = Some(authorization_endpoint.into());
        self.token_endpoint = Some(token_endpoint.into());
        self
    }

    /// Set the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the freshness margin.
    ///
    /// Durations are kept in whole seconds; any sub-second part is dropped.
    #[must_use]
    pub fn with_freshness_margin(mut self, margin: Duration) -> Self {
        self.freshness_margin_secs = margin.as_secs();
        self
    }

    /// Set how long callers wait for a refresh.
    ///
    /// Kept in whole seconds. Anything below one second becomes one second,
    /// since a zero wait would fail every refresh.
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the bound on one token-endpoint exchange.
    ///
    /// Kept in whole seconds, at least one.
    #[must_use]
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the lifetime assumed for tokens without `expires_in`.
    ///
    /// Kept in whole seconds; any sub-second part is dropped.
    #[must_use]
    pub fn with_default_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_token_lifetime_secs = lifetime.as_secs();
        self
    }

    /// Add an extra authorization query parameter.
    #[must_use]
    pub fn with_authorization_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extra_authorization_params
            .push((key.into(), value.into()));
        self
    }

    /// Freshness margin as a chrono duration.
    pub fn freshness_margin(&self) -> chrono::Duration {
        chrono_seconds(self.freshness_margin_secs)
    }

    /// How long callers wait for a refresh.
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs.min(MAX_DURATION_SECS))
    }

    /// Bound on one token-endpoint exchange, never shorter than the refresh
    /// timeout.
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs.min(MAX_DURATION_SECS))
            .max(self.refresh_timeout())
    }

    /// Lifetime assumed for tokens without `expires_in`.
    pub fn default_token_lifetime(&self) -> chrono::Duration {
        chrono_seconds(self.default_token_lifetime_secs)
    }

    /// Explicitly configured endpoints, if both are present.
    pub fn static_endpoints(&self) -> Option<ServiceEndpoints> {
        match (&self.authorization_endpoint, &self.token_endpoint) {
            (Some(auth), Some(token)) => Some(ServiceEndpoints {
                authorization_endpoint: auth.clone(),
                token_endpoint: token.clone(),
            }),
            _ => None,
        }
    }

    /// Scopes joined for the `scope` parameter.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::configuration("client_id is empty"));
        }
        Url::parse(&self.redirect_uri).map_err(|e| {
            AuthError::configuration(format!("invalid redirect_uri {}: {e}", self.redirect_uri))
        })?;
        if let Some(endpoints) = self.static_endpoints() {
            for url in [&endpoints.authorization_endpoint, &endpoints.token_endpoint] {
                Url::parse(url)
                    .map_err(|e| AuthError::configuration(format!("invalid endpoint {url}: {e}")))?;
            }
        } else if self.issuer.is_none() {
            return Err(AuthError::configuration(
                "either both endpoints or an issuer must be configured",
            ));
        }
        for (name, secs) in [
            ("freshness_margin_secs", self.freshness_margin_secs),
            ("refresh_timeout_secs", self.refresh_timeout_secs),
            ("exchange_timeout_secs", self.exchange_timeout_secs),
            ("default_token_lifetime_secs", self.default_token_lifetime_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(AuthError::configuration(format!(
                    "{name} is {secs}, above the maximum of {MAX_DURATION_SECS}"
                )));
            }
        }
        if self.refresh_timeout_secs == 0 || self.exchange_timeout_secs == 0 {
            return Err(AuthError::configuration("timeouts must be at least one second"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = AuthConfig::from_lookup(lookup(&[
            ("AUTHSTATE_CLIENT_ID", "client"),
            ("AUTHSTATE_REDIRECT_URI", "com.example:/cb"),
            ("AUTHSTATE_ISSUER", "https://accounts.example.com"),
            ("AUTHSTATE_SCOPES", "openid  email profile"),
            ("AUTHSTATE_FRESHNESS_MARGIN_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(config.client_id, "client");
        assert_eq!(config.scopes, vec!["openid", "email", "profile"]);
        assert_eq!(config.freshness_margin(), chrono::Duration::seconds(120));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(30));
        assert!(config.static_endpoints().is_none());
    }

    #[test]
    fn test_from_lookup_missing_client() {
        let err = AuthConfig::from_lookup(lookup(&[("AUTHSTATE_REDIRECT_URI", "app:/cb")]))
            .unwrap_err();
        assert!(err.to_string().contains("AUTHSTATE_CLIENT_ID"));
    }

    #[test]
    fn test_from_lookup_bad_number() {
        let err = AuthConfig::from_lookup(lookup(&[
            ("AUTHSTATE_CLIENT_ID", "client"),
            ("AUTHSTATE_REDIRECT_URI", "app:/cb"),
            ("AUTHSTATE_ISSUER", "https://issuer.example"),
            ("AUTHSTATE_REFRESH_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_validate() {
        let base = AuthConfig::new("client", "app:/cb");
        assert!(base.validate().is_err());

        let with_endpoints = base
            .clone()
            .with_endpoints("https://a.example/auth", "https://a.example/token");
        assert!(with_endpoints.validate().is_ok());

        let with_issuer = base.clone().with_issuer("https://a.example");
        assert!(with_issuer.validate().is_ok());

        let bad_redirect = AuthConfig::new("client", "not a uri").with_issuer("https://a.example");
        assert!(bad_redirect.validate().is_err());

        let empty_client = AuthConfig::new(" ", "app:/cb").with_issuer("https://a.example");
        assert!(empty_client.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        let huge = (MAX_DURATION_SECS + 1).to_string();
        for key in [
            "AUTHSTATE_FRESHNESS_MARGIN_SECS",
            "AUTHSTATE_REFRESH_TIMEOUT_SECS",
            "AUTHSTATE_EXCHANGE_TIMEOUT_SECS",
            "AUTHSTATE_DEFAULT_TOKEN_LIFETIME_SECS",
        ] {
            let err = AuthConfig::from_lookup(lookup(&[
                ("AUTHSTATE_CLIENT_ID", "client"),
                ("AUTHSTATE_REDIRECT_URI", "app:/cb"),
                ("AUTHSTATE_ISSUER", "https://issuer.example"),
                (key, huge.as_str()),
            ]))
            .unwrap_err();
            assert!(matches!(err, AuthError::Configuration(_)), "{key}");
        }

        let zero_timeout = AuthConfig {
            refresh_timeout_secs: 0,
            ..AuthConfig::new("client", "app:/cb").with_issuer("https://a.example")
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_unvalidated_durations_are_clamped() {
        let config = AuthConfig {
            freshness_margin_secs: u64::MAX,
            default_token_lifetime_secs: u64::MAX,
            ..AuthConfig::new("client", "app:/cb")
        };
        let year = chrono::Duration::seconds(MAX_DURATION_SECS as i64);
        assert_eq!(config.freshness_margin(), year);
        assert_eq!(config.default_token_lifetime(), year);
    }

    #[test]
    fn test_builders_keep_whole_seconds() {
        let config = AuthConfig::new("client", "app:/cb")
            .with_freshness_margin(Duration::from_millis(1500))
            .with_refresh_timeout(Duration::from_millis(200))
            .with_exchange_timeout(Duration::from_millis(200));

        assert_eq!(config.freshness_margin(), chrono::Duration::seconds(1));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(1));
        assert_eq!(config.exchange_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_exchange_timeout_never_below_refresh_timeout() {
        let config = AuthConfig::new("client", "app:/cb")
            .with_refresh_timeout(Duration::from_secs(60))
            .with_exchange_timeout(Duration::from_secs(10));
        assert_eq!(config.exchange_timeout(), Duration::from_secs(60));
        assert_eq!(
            AuthConfig::new("client", "app:/cb").exchange_timeout(),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: AuthConfig = serde_json::from_str(
            r#"{"client_id":"c","redirect_uri":"app:/cb","issuer":"https://i.example"}"#,
        )
        .unwrap();
        assert_eq!(config.freshness_margin_secs, 60);
        assert_eq!(config.default_token_lifetime_secs, 3600);
        assert!(config.scopes.is_empty());
    }
}
