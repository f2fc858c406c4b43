//! Record serialization.

use authstate_core::{AuthorizationState, StoreError};
use tracing::warn;

/// Serialize a record.
pub fn encode(state: &AuthorizationState) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(state).map_err(|e| StoreError::from(std::io::Error::other(e)))
}

/// Deserialize a record.
pub fn decode(bytes: &[u8]) -> Result<AuthorizationState, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptRecord(e.to_string()))
}

/// Deserialize a record, treating corruption as "logged out".
pub fn decode_or_default(bytes: &[u8]) -> AuthorizationState {
    match decode(bytes) {
        Ok(state) => state,
        Err(err) => {
            warn!(error = %err, "Discarding unreadable credential record");
            AuthorizationState::default()
        }
    }
}
