use std::path::PathBuf;

use thiserror::Error;

use super::outcome::TransferOutcome;
use crate::ledger::LedgerError;
use crate::source::SourceError;
use crate::store::StoreError;

/// Failure inside the transfer pipeline. Never escapes the pipeline: it is
/// converted into a [`TransferOutcome`] for the item.
#[derive(Debug, Error)]
pub(crate) enum TransferError {
    #[error("id {0:?} is not a safe file name")]
    UnsafeId(String),

    #[error("download failed: {0}")]
    Fetch(#[source] SourceError),

    #[error("failed to stage {path}: {source}")]
    Stage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("upload failed: {0}")]
    Upload(#[source] StoreError),

    #[error("ledger commit failed: {0}")]
    Commit(#[from] LedgerError),
}

impl TransferError {
    pub(crate) fn into_outcome(self, id: String) -> TransferOutcome {
        match self {
            TransferError::Upload(e) => TransferOutcome::UploadFailed {
                id,
                cause: e.to_string(),
            },
            other => TransferOutcome::ProcessingError {
                id,
                cause: other.to_string(),
            },
        }
    }
}
