//! # authstate-store
//!
//! Versioned storage of the authorization-state record.
//!
//! Every store holds one [`AuthorizationState`] and exposes three operations:
//!
//! - [`CredentialStore::get`]: the latest record, or the empty record if none
//!   is stored or the stored bytes cannot be decoded
//! - [`CredentialStore::replace`]: an optimistic compare-and-swap on the
//!   record's `version`
//! - [`CredentialStore::clear`]: sign-out
//!
//! ## Implementations
//!
//! - [`InMemoryCredentialStore`]: process-local, for tests and short-lived sessions
//! - [`FileCredentialStore`]: one JSON file per client identity, atomically replaced
//!
//! ## Example
//!
//! ```ignore
//! use authstate_store::{CredentialStore, InMemoryCredentialStore};
//!
//! let store = InMemoryCredentialStore::new();
//! let current = store.get().await?;
//! let mut next = current.clone();
//! next.access_token = Some("token".into());
//! let committed = store.replace(next, current.version).await?;
//! assert_eq!(committed.version, current.version + 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod file;
pub mod memory;
pub mod store;

pub use authstate_core::{AuthorizationState, StoreError};
pub use file::FileCredentialStore;
pub use memory::InMemoryCredentialStore;
pub use store::{CredentialStore, StoreResult};
