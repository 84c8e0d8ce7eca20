//! Per-item transfer: fetch → stage → upload → commit → clean up.
//!
//! Ordering is what keeps the ledger honest:
//! - nothing is committed until the store acknowledged the upload;
//! - the ledger entry is durable before the staged copy is removed, so a
//!   crash in between leaves an orphaned file, never a lost commit;
//! - a failed upload keeps the staged copy for inspection.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use futures_util::FutureExt;

use super::error::TransferError;
use super::outcome::TransferOutcome;
use super::panic_message;
use crate::ledger::{self, Ledger};
use crate::retry::{self, RetryAction, RetryConfig};
use crate::source::RemoteItem;
use crate::store::BlobStore;

pub(crate) struct TransferPipeline<'a> {
    store: &'a dyn BlobStore,
    staging_dir: &'a Path,
    retry: &'a RetryConfig,
}

impl<'a> TransferPipeline<'a> {
    pub(crate) fn new(
        store: &'a dyn BlobStore,
        staging_dir: &'a Path,
        retry: &'a RetryConfig,
    ) -> Self {
        Self {
            store,
            staging_dir,
            retry,
        }
    }

    /// Transfer one item. Every failure, including a panic, is converted into
    /// an outcome for this item.
    pub(crate) async fn transfer(
        &self,
        item: &dyn RemoteItem,
        ledger: &mut Ledger,
    ) -> TransferOutcome {
        let id = item.id().to_string();
        match AssertUnwindSafe(self.run(item, ledger)).catch_unwind().await {
            Ok(Ok(())) => TransferOutcome::Succeeded { id },
            Ok(Err(e)) => {
                tracing::error!(id = %id, error = %e, "Transfer failed");
                e.into_outcome(id)
            }
            Err(panic) => {
                let cause = format!("transfer panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(id = %id, "{}", cause);
                TransferOutcome::ProcessingError { id, cause }
            }
        }
    }

    async fn run(&self, item: &dyn RemoteItem, ledger: &mut Ledger) -> Result<(), TransferError> {
        let id = item.id();
        let staged = staging_path(self.staging_dir, id)?;

        tracing::info!(id = %id, size_bytes = ?item.size_hint(), "New photo found, downloading");
        let bytes = retry::retry_with_backoff(
            self.retry,
            &format!("Download of {id}"),
            |e: &crate::source::SourceError| RetryAction::from_retryable(e.is_retryable()),
            || item.fetch_original(),
        )
        .await
        .map_err(TransferError::Fetch)?;

        tokio::fs::write(&staged, &bytes)
            .await
            .map_err(|source| TransferError::Stage {
                path: staged.clone(),
                source,
            })?;
        tracing::debug!(id = %id, bytes = bytes.len(), path = %staged.display(), "Staged");

        tracing::info!(id = %id, store = %self.store.describe(), "Uploading");
        retry::retry_with_backoff(
            self.retry,
            &format!("Upload of {id}"),
            |e: &crate::store::StoreError| RetryAction::from_retryable(e.is_retryable()),
            || self.store.put(id, bytes.clone()),
        )
        .await
        .map_err(|e| {
            tracing::warn!(
                id = %id,
                path = %staged.display(),
                "Upload failed; keeping staged copy for inspection"
            );
            TransferError::Upload(e)
        })?;

        ledger.commit(id).await?;

        if let Err(e) = tokio::fs::remove_file(&staged).await {
            tracing::warn!(
                id = %id,
                path = %staged.display(),
                error = %e,
                "Synced, but could not remove staged copy"
            );
        }
        tracing::info!(id = %id, "Synced");
        Ok(())
    }
}

/// Staging location for `id`. The id must be a single, ordinary file name
/// that the ledger can record; anything else is rejected before it is fetched
/// so the store never holds an object the ledger cannot account for.
pub(crate) fn staging_path(staging_dir: &Path, id: &str) -> Result<PathBuf, TransferError> {
    let safe = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
        && ledger::validate_id(id).is_ok();
    if !safe {
        return Err(TransferError::UnsafeId(id.to_string()));
    }
    Ok(staging_dir.join(id))
}
