//! # authstate-core
//!
//! Core types, persisted authorization state, and error handling for the authstate workspace.
//!
//! This crate provides the foundational pieces shared by every other authstate crate:
//!
//! - **State**: [`AuthorizationState`], the single persisted record per client identity
//! - **Errors**: the authorization, token-exchange and storage error taxonomy
//! - **Status**: the values published to status observers
//! - **Tokens**: token-endpoint request and response wire types
//! - **PKCE**: verifier/challenge and state-nonce generation
//! - **Authorization**: launch descriptors and redirect results
//! - **Collaborators**: the token endpoint, discovery, and user-agent traits
//! - **Config**: client configuration with environment loading
//! - **Clock**: wall-clock abstraction used for freshness decisions
//!
//! ## Example
//!
//! ```rust
//! use authstate_core::{AuthConfig, AuthorizationState, Freshness};
//! use chrono::{Duration, Utc};
//!
//! let config = AuthConfig::new("my-client", "com.example.app:/oauth2redirect")
//!     .with_endpoints(
//!         "https://accounts.example.com/authorize",
//!         "https://accounts.example.com/token",
//!     )
//!     .with_scopes(["openid", "email"]);
//! config.validate().expect("valid config");
//!
//! let state = AuthorizationState::for_config(&config);
//! assert_eq!(state.freshness(Utc::now(), Duration::seconds(60)), Freshness::Missing);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod authorization;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod pkce;
pub mod state;
pub mod status;
pub mod token;

pub use authorization::{LaunchDescriptor, RedirectResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, ServiceEndpoints};
pub use endpoint::{DiscoveryProvider, TokenEndpoint, UserAgentLauncher};
pub use errors::{
    AuthError, AuthorizationError, Result, StoreError, TokenExchangeError,
};
pub use pkce::{generate_nonce, PkcePair};
pub use state::{AccessToken, AuthorizationState, Freshness};
pub use status::{AuthStatus, ErrorKind};
pub use token::{TokenErrorBody, TokenRequest, TokenResponse};
