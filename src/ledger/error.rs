//! Error types for the synchronization ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or appending to the ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Failed to read or create the ledger file.
    #[error("Failed to open ledger at {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another process already holds the ledger lock.
    #[error("Another instance is already writing to this ledger (lock: {0})")]
    Locked(PathBuf),

    /// The durable append did not complete.
    #[error("Failed to append to ledger at {path}: {source}")]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The id cannot be represented as a single ledger line.
    #[error("Invalid ledger id {0:?}")]
    InvalidId(String),

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}
