//! Optimistic read-modify-write against a [`CredentialStore`].

use authstate_core::{AuthorizationState, StoreError};
use authstate_store::CredentialStore;
use tracing::debug;

/// Result of [`commit_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommitOutcome {
    /// The mutation was written; holds the committed record.
    Committed(AuthorizationState),
    /// The mutation declined to write; holds the record it saw.
    Unchanged(AuthorizationState),
}

/// Read the latest record, apply `mutate`, and write it back if the version
/// is unchanged. Conflicts re-run the whole cycle against the newer record.
///
/// `mutate` returns `false` to skip the write.
pub(crate) async fn commit_with<F>(
    store: &dyn CredentialStore,
    mut mutate: F,
) -> Result<CommitOutcome, StoreError>
where
    F: FnMut(&mut AuthorizationState) -> bool + Send,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let current = store.get().await?;
        let mut next = current.clone();
        if !mutate(&mut next) {
            return Ok(CommitOutcome::Unchanged(current));
        }

        match store.replace(next, current.version).await {
            Ok(committed) => return Ok(CommitOutcome::Committed(committed)),
            Err(err) if err.is_conflict() => {
                debug!(attempt, error = %err, "Credential record changed underneath; retrying");
                tokio::task::yield_now().await;
            }
            Err(err) => return Err(err),
        }
    }
}
