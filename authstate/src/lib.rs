//! # authstate - Client-side OAuth 2.0 / OIDC authorization state
//!
//! authstate keeps one authorization record per client identity and manages
//! its whole lifecycle: the PKCE authorization-code flow, persistence of the
//! resulting tokens, and refreshing them before they expire.
//!
//! ## Quick Start
//!
//! ```ignore
//! use authstate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> authstate::Result<()> {
//!     let config = AuthConfig::from_env()?;
//!     let session = AuthSession::builder(config)
//!         .store(Arc::new(FileCredentialStore::for_client(data_dir, "my-client")))
//!         .launcher(Arc::new(MyBrowserLauncher))
//!         .build()?;
//!
//!     session.restore().await?;
//!     if session.access_token().await.is_err() {
//!         session.login().await?;
//!     }
//!
//!     let token = session.access_token().await?;
//!     println!("Bearer {}", token.as_str());
//!     Ok(())
//! }
//! ```
//!
//! ## Key Features
//!
//! - **PKCE authorization-code flow** with a persisted state nonce, so a
//!   redirect can be completed after a process restart
//! - **Fresh tokens on demand** with a configurable freshness margin
//! - **Deduplicated refresh**: concurrent callers share one network request
//! - **Optimistic persistence**: every write is version-checked, none is lost
//! - **Status stream** for presentation code
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|--------|
//! | `http` | reqwest token endpoint and OIDC discovery | ✅ |
//!
//! ## Architecture
//!
//! - [`authstate_core`] - State record, errors, statuses and collaborator traits
//! - [`authstate_store`] - Credential stores (in-memory, file)
//! - `authstate_http` - Token endpoint and discovery over HTTP (optional)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod commit;
pub mod coordinator;
pub mod flow;
pub mod session;
pub mod status;

#[cfg(test)]
mod test_support;

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Core types and error handling.
pub use authstate_core as core;

/// Credential stores.
pub use authstate_store as store;

/// HTTP collaborators.
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use authstate_http as http;

// ============================================================================
// Flat Re-exports
// ============================================================================

pub use authstate_core::{
    AccessToken, AuthConfig, AuthError, AuthStatus, AuthorizationError, AuthorizationState,
    Clock, DiscoveryProvider, ErrorKind, Freshness, LaunchDescriptor, RedirectResult, Result,
    ServiceEndpoints, StoreError, SystemClock, TokenEndpoint, TokenExchangeError, TokenResponse,
    UserAgentLauncher,
};
pub use authstate_store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore};
pub use coordinator::{RefreshSettings, TokenLifecycleCoordinator};
pub use flow::{AuthorizationFlowController, FlowState};
pub use session::{AuthSession, AuthSessionBuilder};
pub use status::StatusBroadcaster;

#[cfg(feature = "http")]
pub use authstate_http::{HttpDiscovery, HttpTokenEndpoint, RetryPolicy};

/// Everything an application usually needs.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        AccessToken, AuthConfig, AuthError, AuthSession, AuthStatus, AuthorizationError,
        CredentialStore, FileCredentialStore, InMemoryCredentialStore, LaunchDescriptor,
        RedirectResult, UserAgentLauncher,
    };

    #[cfg(feature = "http")]
    pub use crate::{HttpDiscovery, HttpTokenEndpoint};
}
