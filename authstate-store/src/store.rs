//! The credential store contract.

use async_trait::async_trait;
use authstate_core::{AuthorizationState, StoreError};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage of one authorization-state record.
///
/// Reads never observe a partially written record. Writes are linearized by
/// the `version` compare in [`replace`](CredentialStore::replace).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Latest committed record.
    ///
    /// Returns the default empty record (version 0) when nothing is stored or
    /// the stored bytes are corrupt. Only I/O failures are errors.
    async fn get(&self) -> StoreResult<AuthorizationState>;

    /// Persist `state` if the stored version still equals `expected_version`.
    ///
    /// The committed record carries `version = expected_version + 1` and is
    /// returned. On mismatch nothing is written and
    /// [`StoreError::ConcurrentModification`] is returned.
    async fn replace(
        &self,
        state: AuthorizationState,
        expected_version: u64,
    ) -> StoreResult<AuthorizationState>;

    /// Erase every field of the record.
    ///
    /// The version keeps counting up, so writers that read before the clear
    /// will conflict.
    async fn clear(&self) -> StoreResult<()>;
}
