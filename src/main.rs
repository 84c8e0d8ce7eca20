//! icloud-s3-sync: mirror an iCloud shared album into an object-storage bucket.
//!
//! Every few minutes the album is listed, photos not yet recorded in the
//! append-only ledger are downloaded to a staging directory, uploaded, and only
//! then committed. Operators are told about new photos and failures through a
//! chat notifier.

#![warn(clippy::all)]

mod cli;
mod config;
mod ledger;
mod notify;
mod retry;
mod scheduler;
mod shutdown;
mod source;
mod store;
mod sync;
mod systemd;
#[cfg(test)]
mod testing;
mod types;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Command, StatusArgs, SyncArgs};
use config::{Config, NotifierConfig, SourceConfig, StoreConfig};
use ledger::Ledger;
use notify::{LogNotifier, Notifier, TelegramNotifier};
use scheduler::Scheduler;
use source::{LocalDirSource, PhotoSource, SharedStreamSource};
use store::{BlobStore, LocalDirStore, S3Store};
use sync::{BatchScan, ScanConfig};
use systemd::SystemdNotifier;

/// Run the status command.
async fn run_status(args: StatusArgs) -> anyhow::Result<()> {
    let ledger_path = config::expand_tilde(&args.paths.ledger);
    let staging_dir = config::expand_tilde(&args.paths.staging_dir);

    let ids = ledger::read_ids(&ledger_path).await?;
    println!("Ledger: {}", ledger_path.display());
    println!("  Synced photos: {}", ids.len());
    println!();

    let staged = sync::staged_files(&staging_dir)
        .await
        .with_context(|| format!("Failed to read {}", staging_dir.display()))?;
    println!("Staging directory: {}", staging_dir.display());
    if staged.is_empty() {
        println!("  (empty)");
    }
    for name in &staged {
        let note = if ids.contains(name) {
            "already synced, will be removed on next start"
        } else {
            "upload pending"
        };
        println!("  {name} ({note})");
    }

    Ok(())
}

/// Run the sync command.
async fn run_sync(args: SyncArgs) -> anyhow::Result<()> {
    let config = Config::from_args(args)?;
    tracing::debug!(?config, "Configuration loaded");

    let shutdown = shutdown::install_signal_handler()?;

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let source: Arc<dyn PhotoSource> = match config.source {
        SourceConfig::SharedAlbum { token } => {
            Arc::new(SharedStreamSource::new(client, &token)?)
        }
        SourceConfig::LocalDir(root) => Arc::new(LocalDirSource::new(root)),
    };
    let store: Arc<dyn BlobStore> = match config.store {
        StoreConfig::S3(creds) => Arc::new(S3Store::new(creds, config.http_timeout)?),
        StoreConfig::LocalDir(root) => Arc::new(LocalDirStore::new(root)),
    };
    let notifier: Arc<dyn Notifier> = match config.notifier {
        NotifierConfig::Telegram { bot_token, chat_id } => {
            Arc::new(TelegramNotifier::new(bot_token, chat_id)?)
        }
        NotifierConfig::Log => Arc::new(LogNotifier),
    };

    let ledger = Ledger::open(&config.ledger_path).await?;
    tracing::info!(
        path = %ledger.path().display(),
        entries = ledger.len(),
        "Ledger loaded"
    );
    match sync::prune_orphans(&config.staging_dir, &ledger).await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Cleaned up staged copies of synced photos"),
        Err(e) => tracing::warn!(error = %e, "Could not clean up staging directory"),
    }

    let scan = BatchScan::new(
        source,
        store,
        ledger,
        ScanConfig {
            album: config.album,
            staging_dir: config.staging_dir,
            retry: config.retry,
        },
    );
    Scheduler::new(
        scan,
        notifier,
        SystemdNotifier::new(config.notify_systemd),
        config.interval,
    )
    .run(shutdown)
    .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Sync(args) => run_sync(args).await,
        Command::Status(args) => run_status(args).await,
    }
}
