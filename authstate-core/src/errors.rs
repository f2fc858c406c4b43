//! Error types for authstate.
//!
//! Three families cover the three places a session can go wrong: the
//! authorization redirect ([`AuthorizationError`]), the token endpoint
//! ([`TokenExchangeError`]) and the credential store ([`StoreError`]).
//! [`AuthError`] wraps them for the public API.
//!
//! Every error is `Clone`: one refresh outcome is delivered to every caller
//! that was waiting on it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::status::ErrorKind;
use crate::token::TokenErrorBody;

/// The main error type for authstate operations.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    /// The authorization redirect failed or was rejected.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// The token endpoint rejected a request or could not be reached.
    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),

    /// The credential store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No usable credentials; the authorization flow must be run.
    #[error("Not authenticated: authorization required")]
    Unauthenticated,

    /// Gave up waiting for a token refresh.
    #[error("Timed out after {0:?} waiting for token refresh")]
    Timeout(Duration),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AuthError.
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Coarse classification for status observers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization(AuthorizationError::Discovery(_)) => ErrorKind::Discovery,
            Self::Authorization(AuthorizationError::NetworkError(_)) => ErrorKind::Transient,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::TokenExchange(err) => err.kind(),
            Self::Store(_) => ErrorKind::Storage,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the caller has to run the authorization flow again.
    pub fn requires_reauthorization(&self) -> bool {
        match self {
            Self::Unauthenticated => true,
            Self::TokenExchange(err) => err.invalidates_session(),
            _ => false,
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TokenExchange(err) => err.is_retryable(),
            Self::Authorization(AuthorizationError::NetworkError(_)) => true,
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Failure of one authorization attempt. Always terminal for that attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The user dismissed the user agent or denied consent.
    #[error("Authorization cancelled by the user")]
    UserCancelled,

    /// The authorization server rejected the request.
    #[error("Invalid authorization request: {0}")]
    InvalidRequest(String),

    /// The authorization server reported an internal failure.
    #[error("Authorization server error: {0}")]
    ServerError(String),

    /// The redirect's `state` did not match the nonce issued for this flow.
    #[error("Redirect state does not match the pending authorization request")]
    StateMismatch,

    /// A newer request replaced this one, or it was already completed.
    #[error("Authorization request is no longer pending")]
    Superseded,

    /// The user agent or authorization server could not be reached.
    #[error("Network error during authorization: {0}")]
    NetworkError(String),

    /// Endpoint discovery for the issuer failed.
    #[error("Discovery failed: {0}")]
    Discovery(String),
}

impl AuthorizationError {
    /// Map an `error` / `error_description` pair from a redirect.
    pub fn from_redirect_error(code: &str, description: Option<&str>) -> Self {
        let detail = match description {
            Some(desc) if !desc.is_empty() => format!("{code}: {desc}"),
            _ => code.to_string(),
        };
        match code {
            "access_denied" => Self::UserCancelled,
            "invalid_request"
            | "unauthorized_client"
            | "unsupported_response_type"
            | "invalid_scope" => Self::InvalidRequest(detail),
            _ => Self::ServerError(detail),
        }
    }
}

/// Failure talking to the token endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenExchangeError {
    /// The code or refresh token is no longer valid.
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    /// Client authentication failed.
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// Transport failure, timeout, or server-side outage.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The endpoint answered with something that is not a token response.
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// Any other OAuth error code returned by the endpoint.
    #[error("Token endpoint rejected the request: {error}")]
    Rejected {
        /// OAuth error code.
        error: String,
        /// Human readable description, if provided.
        description: Option<String>,
    },
}

impl TokenExchangeError {
    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Create a malformed-response error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Classify an OAuth error body returned by the token endpoint.
    pub fn from_error_body(body: &TokenErrorBody) -> Self {
        let detail = body
            .error_description
            .clone()
            .unwrap_or_else(|| body.error.clone());
        match body.error.as_str() {
            "invalid_grant" => Self::InvalidGrant(detail),
            "invalid_client" | "unauthorized_client" => Self::InvalidClient(detail),
            "temporarily_unavailable" | "server_error" => Self::NetworkError(detail),
            _ => Self::Rejected {
                error: body.error.clone(),
                description: body.error_description.clone(),
            },
        }
    }

    /// Check if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::MalformedResponse(_))
    }

    /// Check if the stored credentials must be discarded.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::InvalidGrant(_) | Self::InvalidClient(_))
    }

    /// Coarse classification for status observers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidGrant(_) => ErrorKind::InvalidGrant,
            Self::InvalidClient(_) => ErrorKind::InvalidClient,
            Self::NetworkError(_) | Self::MalformedResponse(_) => ErrorKind::Transient,
            Self::Rejected { .. } => ErrorKind::Authorization,
        }
    }
}

/// Failure of the credential store.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The stored bytes are not a valid record.
    #[error("Corrupt credential record: {0}")]
    CorruptRecord(String),

    /// The record changed since it was read.
    #[error("Concurrent modification: expected version {expected}, found {actual}")]
    ConcurrentModification {
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The backing medium failed.
    #[error("I/O failure: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl StoreError {
    /// Check if this is an optimistic-write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("access_denied", AuthorizationError::UserCancelled)]
    #[case("invalid_scope", AuthorizationError::InvalidRequest("invalid_scope".into()))]
    #[case("unauthorized_client", AuthorizationError::InvalidRequest("unauthorized_client".into()))]
    #[case("temporarily_unavailable", AuthorizationError::ServerError("temporarily_unavailable".into()))]
    fn test_redirect_error_mapping(#[case] code: &str, #[case] expected: AuthorizationError) {
        assert_eq!(AuthorizationError::from_redirect_error(code, None), expected);
    }

    #[test]
    fn test_redirect_error_keeps_description() {
        let err = AuthorizationError::from_redirect_error("server_error", Some("boom"));
        assert_eq!(err, AuthorizationError::ServerError("server_error: boom".into()));
    }

    #[rstest]
    #[case("invalid_grant", true, false)]
    #[case("invalid_client", true, false)]
    #[case("server_error", false, true)]
    #[case("invalid_scope", false, false)]
    fn test_token_error_classification(
        #[case] code: &str,
        #[case] invalidates: bool,
        #[case] retryable: bool,
    ) {
        let err = TokenExchangeError::from_error_body(&TokenErrorBody::new(code));
        assert_eq!(err.invalidates_session(), invalidates);
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn test_auth_error_kind() {
        let err = AuthError::from(TokenExchangeError::InvalidGrant("revoked".into()));
        assert_eq!(err.kind(), ErrorKind::InvalidGrant);
        assert!(err.requires_reauthorization());
        assert!(!err.is_retryable());

        let err = AuthError::from(TokenExchangeError::network("connection reset"));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_retryable());

        let err = AuthError::from(AuthorizationError::Discovery("404".into()));
        assert_eq!(err.kind(), ErrorKind::Discovery);
    }

    #[test]
    fn test_store_error_from_io() {
        let err: StoreError = std::io::Error::other("disk full").into();
        assert!(!err.is_conflict());
        assert!(err.to_string().contains("disk full"));

        let err = StoreError::ConcurrentModification { expected: 1, actual: 2 };
        assert!(err.is_conflict());
    }
}
