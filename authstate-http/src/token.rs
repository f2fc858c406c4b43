//! HTTP token endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use authstate_core::{
    TokenEndpoint, TokenErrorBody, TokenExchangeError, TokenRequest, TokenResponse,
};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Token endpoint client speaking form-encoded OAuth 2.0.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Default for HttpTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTokenEndpoint {
    /// Create a client with default retry and timeout.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Use an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send_once(
        &self,
        token_endpoint: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError> {
        let response = self
            .client
            .post(token_endpoint)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .form(&request.form_params())
            .send()
            .await
            .map_err(|e| TokenExchangeError::network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenExchangeError::network(e.to_string()))?;

        if status.is_success() {
            return parse_token_response(&body);
        }

        let error = classify_error_response(status, &body);
        warn!(
            status = status.as_u16(),
            grant_type = request.grant_type(),
            error = %error,
            "Token endpoint returned an error"
        );
        Err(error)
    }
}

fn parse_token_response(body: &str) -> Result<TokenResponse, TokenExchangeError> {
    let tokens: TokenResponse = serde_json::from_str(body)
        .map_err(|e| TokenExchangeError::malformed(format!("{e}")))?;
    if tokens.access_token.is_empty() {
        return Err(TokenExchangeError::malformed("empty access_token"));
    }
    if let Some(token_type) = &tokens.token_type {
        if !token_type.eq_ignore_ascii_case("bearer") {
            return Err(TokenExchangeError::malformed(format!(
                "unsupported token_type {token_type}"
            )));
        }
    }
    Ok(tokens)
}

fn classify_error_response(status: StatusCode, body: &str) -> TokenExchangeError {
    if let Ok(error_body) = serde_json::from_str::<TokenErrorBody>(body) {
        return TokenExchangeError::from_error_body(&error_body);
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        TokenExchangeError::network(format!("HTTP {status}"))
    } else {
        TokenExchangeError::malformed(format!("HTTP {status}: {body}"))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn request_token(
        &self,
        token_endpoint: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError> {
        debug!(
            grant_type = request.grant_type(),
            endpoint = token_endpoint,
            "Sending token request"
        );
        self.retry
            .run(|| self.send_once(token_endpoint, request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn refresh_request() -> TokenRequest {
        TokenRequest::RefreshToken {
            refresh_token: "r1".into(),
            client_id: "client".into(),
        }
    }

    fn endpoint() -> HttpTokenEndpoint {
        HttpTokenEndpoint::new().with_retry(
            RetryPolicy::new()
                .max_retries(1)
                .initial_delay(Duration::from_millis(1))
                .jitter(0.0),
        )
    }

    #[tokio::test]
    async fn test_code_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=c1"))
            .and(body_string_contains("code_verifier=v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a1",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "r1",
                "id_token": "id1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = TokenRequest::AuthorizationCode {
            code: "c1".into(),
            code_verifier: "v1".into(),
            redirect_uri: "app:/cb".into(),
            client_id: "client".into(),
        };
        let tokens = endpoint()
            .request_token(&format!("{}/token", server.uri()), &request)
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "a1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_invalid_grant_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = endpoint()
            .request_token(&format!("{}/token", server.uri()), &refresh_request())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TokenExchangeError::InvalidGrant("Token has been expired or revoked.".into())
        );
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = endpoint()
            .request_token(&format!("{}/token", server.uri()), &refresh_request())
            .await
            .unwrap_err();

        assert!(matches!(err, TokenExchangeError::NetworkError(_)));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let err = HttpTokenEndpoint::new()
            .with_retry(RetryPolicy::none())
            .request_token(&format!("{}/token", server.uri()), &refresh_request())
            .await
            .unwrap_err();

        assert!(matches!(err, TokenExchangeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let result = HttpTokenEndpoint::new()
            .with_retry(RetryPolicy::none())
            .with_timeout(Duration::from_secs(2))
            .request_token("http://127.0.0.1:9/token", &refresh_request())
            .await;

        let err = tokio_test::assert_err!(result);
        assert!(err.is_retryable());
    }

    #[rstest]
    #[case(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#, "invalid_grant")]
    #[case(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_client"}"#, "invalid_client")]
    #[case(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":"temporarily_unavailable"}"#, "network")]
    #[case(StatusCode::BAD_REQUEST, r#"{"error":"invalid_scope","error_description":"bad scope"}"#, "rejected")]
    #[case(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>", "network")]
    #[case(StatusCode::TOO_MANY_REQUESTS, "", "network")]
    #[case(StatusCode::NOT_FOUND, "not here", "malformed")]
    fn test_classify_error_response(
        #[case] status: StatusCode,
        #[case] body: &str,
        #[case] expected: &str,
    ) {
        let err = classify_error_response(status, body);
        let actual = match err {
            TokenExchangeError::InvalidGrant(_) => "invalid_grant",
            TokenExchangeError::InvalidClient(_) => "invalid_client",
            TokenExchangeError::NetworkError(_) => "network",
            TokenExchangeError::MalformedResponse(_) => "malformed",
            TokenExchangeError::Rejected { .. } => "rejected",
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_rejects_non_bearer_token_type() {
        let err = parse_token_response(r#"{"access_token":"a","token_type":"mac"}"#).unwrap_err();
        assert!(matches!(err, TokenExchangeError::MalformedResponse(_)));
    }
}
