//! Collaborator traits.
//!
//! The session never talks to the network or a browser directly. It goes
//! through these traits so hosts can plug in their own transport, and tests
//! can script responses.

use async_trait::async_trait;

use crate::authorization::{LaunchDescriptor, RedirectResult};
use crate::config::ServiceEndpoints;
use crate::errors::{AuthorizationError, TokenExchangeError};
use crate::token::{TokenRequest, TokenResponse};

/// An OAuth token endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Send one grant request to `token_endpoint`.
    async fn request_token(
        &self,
        token_endpoint: &str,
        request: &TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError>;
}

/// Resolves an issuer to its endpoints.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Fetch the endpoints for `issuer`.
    async fn discover(&self, issuer: &str) -> Result<ServiceEndpoints, AuthorizationError>;
}

/// Opens an external user agent and waits for the redirect.
#[async_trait]
pub trait UserAgentLauncher: Send + Sync {
    /// Present the authorization request and return what came back.
    async fn launch(
        &self,
        descriptor: &LaunchDescriptor,
    ) -> Result<RedirectResult, AuthorizationError>;
}
