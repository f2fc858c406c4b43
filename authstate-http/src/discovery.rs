//! OIDC discovery.

use std::time::Duration;

use async_trait::async_trait;
use authstate_core::{AuthorizationError, DiscoveryProvider, ServiceEndpoints};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// The subset of the discovery document authstate uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier.
    pub issuer: String,
    /// Authorization endpoint.
    pub authorization_endpoint: String,
    /// Token endpoint.
    pub token_endpoint: String,
    /// Userinfo endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// Revocation endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    /// Supported PKCE methods.
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl From<ProviderMetadata> for ServiceEndpoints {
    fn from(metadata: ProviderMetadata) -> Self {
        Self {
            authorization_endpoint: metadata.authorization_endpoint,
            token_endpoint: metadata.token_endpoint,
        }
    }
}

/// Fetches `{issuer}/.well-known/openid-configuration`.
#[derive(Debug, Clone)]
pub struct HttpDiscovery {
    client: Client,
    timeout: Duration,
}

impl Default for HttpDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDiscovery {
    /// Create a discovery client.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Use an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(15),
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch and validate the full discovery document.
    pub async fn fetch_metadata(&self, issuer: &str) -> Result<ProviderMetadata, AuthorizationError> {
        let url = discovery_url(issuer)?;
        debug!(%url, "Fetching discovery document");

        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AuthorizationError::Discovery(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorizationError::Discovery(format!("{url}: HTTP {status}")));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| AuthorizationError::Discovery(format!("{url}: {e}")))?;

        if metadata.issuer.trim_end_matches('/') != issuer.trim_end_matches('/') {
            return Err(AuthorizationError::Discovery(format!(
                "issuer mismatch: expected {issuer}, document says {}",
                metadata.issuer
            )));
        }
        if !metadata.code_challenge_methods_supported.is_empty()
            && !metadata
                .code_challenge_methods_supported
                .iter()
                .any(|m| m == "S256")
        {
            return Err(AuthorizationError::Discovery(
                "provider does not support S256 PKCE".into(),
            ));
        }
        Ok(metadata)
    }
}

fn discovery_url(issuer: &str) -> Result<Url, AuthorizationError> {
    let base = format!("{}/", issuer.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|base| base.join(WELL_KNOWN_PATH))
        .map_err(|e| AuthorizationError::Discovery(format!("invalid issuer {issuer}: {e}")))
}

#[async_trait]
impl DiscoveryProvider for HttpDiscovery {
    async fn discover(&self, issuer: &str) -> Result<ServiceEndpoints, AuthorizationError> {
        self.fetch_metadata(issuer).await.map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_discovery_url_keeps_issuer_path() {
        let url = discovery_url("https://login.example.com/tenant/v2.0").unwrap();
        assert_eq!(
            url.as_str(),
            "https://login.example.com/tenant/v2.0/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn test_discover_endpoints() {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/authorize"),
                "token_endpoint": format!("{issuer}/token"),
                "code_challenge_methods_supported": ["plain", "S256"]
            })))
            .mount(&server)
            .await;

        let endpoints = HttpDiscovery::new().discover(&issuer).await.unwrap();
        assert_eq!(endpoints.authorization_endpoint, format!("{issuer}/authorize"));
        assert_eq!(endpoints.token_endpoint, format!("{issuer}/token"));
    }

    #[tokio::test]
    async fn test_discovery_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = HttpDiscovery::new().discover(&server.uri()).await.unwrap_err();
        assert!(matches!(err, AuthorizationError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_discovery_issuer_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://evil.example",
                "authorization_endpoint": "https://evil.example/authorize",
                "token_endpoint": "https://evil.example/token"
            })))
            .mount(&server)
            .await;

        let err = HttpDiscovery::new().discover(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("issuer mismatch"));
    }
}
