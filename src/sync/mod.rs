//! Batch scan: one pass over the configured album.
//!
//! Resolves the album, diffs its listing against the ledger and pushes every
//! new item through the [`TransferPipeline`] one at a time. Per-item failures
//! are collected into the [`CycleSummary`]; only environmental faults (the
//! staging directory cannot be created) escape as errors.

mod error;
mod outcome;
mod transfer;

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::ledger::Ledger;
use crate::retry::RetryConfig;
use crate::source::{Album, PhotoSource, RemoteItem, SourceError};
use crate::store::BlobStore;

pub use self::outcome::{CycleSummary, FailureKind, TransferOutcome};
use self::transfer::TransferPipeline;

/// Settings for a [`BatchScan`].
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub album: String,
    pub staging_dir: PathBuf,
    pub retry: RetryConfig,
}

pub struct BatchScan {
    source: Arc<dyn PhotoSource>,
    store: Arc<dyn BlobStore>,
    ledger: Ledger,
    config: ScanConfig,
}

/// Result of enumerating an album, before any transfer.
struct Listing {
    listed: usize,
    already_synced: usize,
    new_items: Vec<Box<dyn RemoteItem>>,
}

impl BatchScan {
    pub fn new(
        source: Arc<dyn PhotoSource>,
        store: Arc<dyn BlobStore>,
        ledger: Ledger,
        config: ScanConfig,
    ) -> Self {
        Self {
            source,
            store,
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }

    pub fn store_description(&self) -> String {
        self.store.describe()
    }

    /// Run one scan.
    ///
    /// `shutdown` is checked between items: once cancelled, the item in flight
    /// finishes and no further transfers start.
    pub async fn run_once(&mut self, shutdown: &CancellationToken) -> anyhow::Result<CycleSummary> {
        let album_name = self.config.album.clone();
        let mut summary = CycleSummary::new(&album_name);

        let album = match self.source.resolve_album(&album_name).await {
            Ok(album) => album,
            Err(e) => {
                tracing::error!(album = %album_name, error = %e, "Could not access album");
                summary.record(TransferOutcome::SourceUnavailable {
                    cause: e.to_string(),
                });
                return Ok(summary);
            }
        };

        tokio::fs::create_dir_all(&self.config.staging_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create staging directory {}",
                    self.config.staging_dir.display()
                )
            })?;

        let listing = match collect_new_items(album.as_ref(), &self.ledger).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::error!(album = %album_name, error = %e, "Album listing failed");
                summary.record(TransferOutcome::SourceUnavailable {
                    cause: format!("listing failed: {e}"),
                });
                return Ok(summary);
            }
        };
        summary.listed = listing.listed;
        summary.already_synced = listing.already_synced;
        summary.new_items = listing.new_items.len();

        tracing::info!(
            album = %album.name(),
            listed = listing.listed,
            already_synced = listing.already_synced,
            new = listing.new_items.len(),
            "Scanned album"
        );

        let pipeline = TransferPipeline::new(
            self.store.as_ref(),
            &self.config.staging_dir,
            &self.config.retry,
        );
        for (index, item) in listing.new_items.iter().enumerate() {
            if shutdown.is_cancelled() {
                tracing::warn!(
                    remaining = listing.new_items.len() - index,
                    "Shutdown requested, leaving remaining items for the next run"
                );
                summary.interrupted = true;
                break;
            }
            let outcome = pipeline.transfer(item.as_ref(), &mut self.ledger).await;
            summary.record(outcome);
        }

        tracing::info!("{}", summary.status_line());
        Ok(summary)
    }
}

/// Enumerate `album` and keep the items the ledger does not know yet.
///
/// Duplicate ids collapse to one entry: the last descriptor wins, at the
/// position of the first. Any enumeration error discards the whole listing.
async fn collect_new_items(album: &dyn Album, ledger: &Ledger) -> Result<Listing, SourceError> {
    let mut listing = Listing {
        listed: 0,
        already_synced: 0,
        new_items: Vec::new(),
    };
    let mut positions: HashMap<String, usize> = HashMap::new();

    let mut items = album.items();
    while let Some(item) = items.next().await {
        let item = item?;
        listing.listed += 1;
        if ledger.contains(item.id()) {
            listing.already_synced += 1;
            continue;
        }
        match positions.get(item.id()) {
            Some(&pos) => {
                tracing::debug!(id = %item.id(), "Duplicate id in listing, keeping the later one");
                listing.new_items[pos] = item;
            }
            None => {
                positions.insert(item.id().to_string(), listing.new_items.len());
                listing.new_items.push(item);
            }
        }
    }
    Ok(listing)
}

/// Delete staged files whose id is already committed.
///
/// These are left behind when the process dies between the ledger commit and
/// the staging cleanup. Returns the number of files removed.
pub async fn prune_orphans(staging_dir: &Path, ledger: &Ledger) -> std::io::Result<usize> {
    let mut removed = 0;
    for name in staged_files(staging_dir).await? {
        if !ledger.contains(&name) {
            continue;
        }
        tokio::fs::remove_file(staging_dir.join(&name)).await?;
        tracing::info!(id = %name, "Removed staged copy of an already synced item");
        removed += 1;
    }
    Ok(removed)
}

/// Names of regular files in the staging directory, sorted. A missing
/// directory has no staged files.
pub async fn staged_files(staging_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
