//! Authorization request and redirect types.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::pkce::{PkcePair, CODE_CHALLENGE_METHOD};

/// Everything a user agent needs to start an authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    /// Fully built authorization URL, query included.
    pub authorization_url: Url,
    /// The query parameters that were appended.
    pub params: Vec<(String, String)>,
    /// The state nonce issued for this request.
    pub state: String,
    /// Redirect URI the agent should watch for.
    pub redirect_uri: String,
}

impl LaunchDescriptor {
    /// Build the descriptor for an authorization-code request with PKCE.
    pub fn build(
        config: &AuthConfig,
        authorization_endpoint: &str,
        nonce: &str,
        pkce: &PkcePair,
    ) -> Result<Self, AuthError> {
        let mut authorization_url = Url::parse(authorization_endpoint).map_err(|e| {
            AuthError::configuration(format!(
                "invalid authorization endpoint {authorization_endpoint}: {e}"
            ))
        })?;

        let mut params = vec![
            ("client_id".to_string(), config.client_id.clone()),
            ("redirect_uri".to_string(), config.redirect_uri.clone()),
            ("response_type".to_string(), "code".to_string()),
            ("scope".to_string(), config.scope_string()),
            ("state".to_string(), nonce.to_string()),
            ("code_challenge".to_string(), pkce.code_challenge.clone()),
            (
                "code_challenge_method".to_string(),
                CODE_CHALLENGE_METHOD.to_string(),
            ),
        ];
        params.extend(config.extra_authorization_params.iter().cloned());

        authorization_url
            .query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        Ok(Self {
            authorization_url,
            params,
            state: nonce.to_string(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// Look up one query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// What the user agent delivered back on the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectResult {
    /// Authorization code on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Echoed state nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// OAuth error code on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error description on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl RedirectResult {
    /// A successful redirect.
    pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Default::default()
        }
    }

    /// A failed redirect.
    pub fn failure(
        error: impl Into<String>,
        error_description: Option<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            error_description,
            state,
            ..Default::default()
        }
    }

    /// Parse the query of a redirect URL.
    pub fn from_redirect_url(url: &Url) -> Self {
        let mut result = Self::default();
        for (key, value) in url.query_pairs() {
            let value = value.into_owned();
            match key.as_ref() {
                "code" => result.code = Some(value),
                "state" => result.state = Some(value),
                "error" => result.error = Some(value),
                "error_description" => result.error_description = Some(value),
                _ => {}
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> AuthConfig {
        AuthConfig::new("client-1", "com.example.app:/oauth2redirect")
            .with_endpoints("https://idp.example/authorize", "https://idp.example/token")
            .with_scopes(["openid", "email"])
            .with_authorization_param("prompt", "consent")
    }

    #[test]
    fn test_descriptor_carries_all_parameters() {
        let pkce = PkcePair::from_verifier("verifier");
        let descriptor =
            LaunchDescriptor::build(&config(), "https://idp.example/authorize", "n1", &pkce)
                .unwrap();

        assert_eq!(descriptor.state, "n1");
        assert_eq!(descriptor.param("client_id"), Some("client-1"));
        assert_eq!(descriptor.param("response_type"), Some("code"));
        assert_eq!(descriptor.param("scope"), Some("openid email"));
        assert_eq!(descriptor.param("state"), Some("n1"));
        assert_eq!(descriptor.param("code_challenge_method"), Some("S256"));
        assert_eq!(
            descriptor.param("code_challenge"),
            Some(pkce.code_challenge.as_str())
        );
        assert_eq!(descriptor.param("prompt"), Some("consent"));

        let query: Vec<(String, String)> = descriptor
            .authorization_url
            .query_pairs()
            .into_owned()
            .collect();
        assert_eq!(query, descriptor.params);
        assert_eq!(descriptor.authorization_url.path(), "/authorize");
    }

    #[test]
    fn test_descriptor_rejects_bad_endpoint() {
        let pkce = PkcePair::generate();
        assert!(LaunchDescriptor::build(&config(), "::not a url", "n1", &pkce).is_err());
    }

    #[test]
    fn test_parse_success_redirect() {
        let url = Url::parse("com.example.app:/oauth2redirect?code=c1&state=n1").unwrap();
        assert_eq!(RedirectResult::from_redirect_url(&url), RedirectResult::success("c1", "n1"));
    }

    #[test]
    fn test_parse_error_redirect() {
        let url = Url::parse(
            "com.example.app:/oauth2redirect?error=access_denied&error_description=User%20said%20no&state=n1",
        )
        .unwrap();
        let result = RedirectResult::from_redirect_url(&url);
        assert_eq!(result.error.as_deref(), Some("access_denied"));
        assert_eq!(result.error_description.as_deref(), Some("User said no"));
        assert_eq!(result.state.as_deref(), Some("n1"));
        assert!(result.code.is_none());
    }
}
