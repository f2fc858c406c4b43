//! # authstate-http
//!
//! reqwest-backed implementations of the authstate collaborator traits.
//!
//! - [`HttpTokenEndpoint`]: form-encoded grant requests with retry of
//!   transient failures
//! - [`HttpDiscovery`]: OIDC discovery via `/.well-known/openid-configuration`
//! - [`RetryPolicy`]: exponential backoff with jitter
//!
//! ## Example
//!
//! ```ignore
//! use authstate_http::{HttpTokenEndpoint, RetryPolicy};
//! use std::time::Duration;
//!
//! let endpoint = HttpTokenEndpoint::new()
//!     .with_retry(RetryPolicy::new().max_retries(2))
//!     .with_timeout(Duration::from_secs(10));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod discovery;
pub mod retry;
pub mod token;

pub use discovery::{HttpDiscovery, ProviderMetadata};
pub use retry::RetryPolicy;
pub use token::HttpTokenEndpoint;
