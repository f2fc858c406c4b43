//! In-memory credential store.

use std::sync::Arc;

use async_trait::async_trait;
use authstate_core::{AuthorizationState, StoreError};
use parking_lot::RwLock;
use tracing::debug;

use crate::codec;
use crate::store::{CredentialStore, StoreResult};

/// Process-local store. Keeps the serialized record so reads behave exactly
/// like a durable store would. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    record: Arc<RwLock<Option<Vec<u8>>>>,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding raw bytes, valid or not.
    pub fn with_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            record: Arc::new(RwLock::new(Some(bytes.into()))),
        }
    }

    /// The raw stored bytes.
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.record.read().clone()
    }

    fn stored_version(record: &Option<Vec<u8>>) -> u64 {
        record
            .as_deref()
            .map(codec::decode_or_default)
            .map(|state| state.version)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self) -> StoreResult<AuthorizationState> {
        let record = self.record.read();
        Ok(record
            .as_deref()
            .map(codec::decode_or_default)
            .unwrap_or_default())
    }

    async fn replace(
        &self,
        mut state: AuthorizationState,
        expected_version: u64,
    ) -> StoreResult<AuthorizationState> {
        let mut record = self.record.write();
        let actual = Self::stored_version(&record);
        if actual != expected_version {
            return Err(StoreError::ConcurrentModification {
                expected: expected_version,
                actual,
            });
        }

        state.version = expected_version + 1;
        *record = Some(codec::encode(&state)?);
        debug!(version = state.version, "Committed credential record");
        Ok(state)
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut record = self.record.write();
        let cleared = AuthorizationState {
            version: Self::stored_version(&record) + 1,
            ..Default::default()
        };
        *record = Some(codec::encode(&cleared)?);
        debug!(version = cleared.version, "Cleared credential record");
        Ok(())
    }
}
