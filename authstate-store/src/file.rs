//! File-based credential store.
//!
//! The record lives in one JSON file. Writes go to a sibling temp file that
//! is renamed over the record, so readers see either the old or the new
//! snapshot and never a torn one. Writers inside the process serialize on a
//! mutex and re-check the version under it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use authstate_core::{AuthorizationState, StoreError};
use tokio::sync::Mutex;
use tracing::debug;

use crate::codec;
use crate::store::{CredentialStore, StoreResult};

/// One JSON file per client identity.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Store the record at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store the record for `client_id` inside `directory`.
    pub fn for_client(directory: impl AsRef<Path>, client_id: &str) -> Self {
        Self::new(directory.as_ref().join(record_file_name(client_id)))
    }

    /// Path of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_raw(&self) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_state(&self) -> StoreResult<AuthorizationState> {
        Ok(self
            .read_raw()
            .await?
            .as_deref()
            .map(codec::decode_or_default)
            .unwrap_or_default())
    }

    async fn write_atomic(&self, state: &AuthorizationState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = codec::encode(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, bytes).await?;
        restrict_permissions(&temp).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn record_file_name(client_id: &str) -> String {
    let safe: String = client_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.authstate.json")
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self) -> StoreResult<AuthorizationState> {
        self.read_state().await
    }

    async fn replace(
        &self,
        mut state: AuthorizationState,
        expected_version: u64,
    ) -> StoreResult<AuthorizationState> {
        let _guard = self.write_lock.lock().await;
        let actual = self.read_state().await?.version;
        if actual != expected_version {
            return Err(StoreError::ConcurrentModification {
                expected: expected_version,
                actual,
            });
        }

        state.version = expected_version + 1;
        self.write_atomic(&state).await?;
        debug!(
            version = state.version,
            path = %self.path.display(),
            "Committed credential record"
        );
        Ok(state)
    }

    async fn clear(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let cleared = AuthorizationState {
            version: self.read_state().await?.version + 1,
            ..Default::default()
        };
        self.write_atomic(&cleared).await?;
        debug!(version = cleared.version, "Cleared credential record");
        Ok(())
    }
}
