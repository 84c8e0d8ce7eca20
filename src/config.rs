use std::path::PathBuf;
use std::time::Duration;

use crate::cli::SyncArgs;
use crate::retry::RetryConfig;
use crate::store::S3Credentials;

const DEFAULT_CREDENTIALS: &str = "credentials.json";

/// Backoff never grows beyond this, whatever `--retry-delay` is.
const MAX_RETRY_DELAY_SECS: u64 = 60;

/// Where photos come from.
#[derive(Clone)]
pub enum SourceConfig {
    SharedAlbum { token: String },
    LocalDir(PathBuf),
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceConfig::SharedAlbum { .. } => f
                .debug_struct("SharedAlbum")
                .field("token", &"<redacted>")
                .finish(),
            SourceConfig::LocalDir(path) => f.debug_tuple("LocalDir").field(path).finish(),
        }
    }
}

/// Where photos go.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    S3(S3Credentials),
    LocalDir(PathBuf),
}

#[derive(Clone)]
pub enum NotifierConfig {
    Telegram { bot_token: String, chat_id: String },
    Log,
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierConfig::Telegram { chat_id, .. } => f
                .debug_struct("Telegram")
                .field("bot_token", &"<redacted>")
                .field("chat_id", chat_id)
                .finish(),
            NotifierConfig::Log => f.write_str("Log"),
        }
    }
}

/// Validated settings for `sync`. Built once and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    pub album: String,
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub notifier: NotifierConfig,
    pub ledger_path: PathBuf,
    pub staging_dir: PathBuf,
    /// `None` runs a single cycle.
    pub interval: Option<Duration>,
    pub retry: RetryConfig,
    pub http_timeout: Duration,
    pub notify_systemd: bool,
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    pub fn from_args(args: SyncArgs) -> anyhow::Result<Self> {
        let album = args.album.trim().to_string();
        if album.is_empty() {
            anyhow::bail!("--album must not be empty");
        }
        if args.interval == 0 {
            anyhow::bail!("--interval must be greater than 0");
        }
        if args.http_timeout == 0 {
            anyhow::bail!("--http-timeout must be greater than 0");
        }

        let source = match (args.shared_album_token, args.source_dir) {
            (Some(token), None) if !token.trim().is_empty() => SourceConfig::SharedAlbum {
                token: token.trim().to_string(),
            },
            (None, Some(dir)) => SourceConfig::LocalDir(expand_tilde(&dir)),
            _ => anyhow::bail!(
                "Exactly one of --shared-album-token or --source-dir must be given"
            ),
        };

        let store = match args.bucket_dir {
            Some(dir) => StoreConfig::LocalDir(expand_tilde(&dir)),
            None => {
                let path =
                    expand_tilde(args.credentials.as_deref().unwrap_or(DEFAULT_CREDENTIALS));
                let creds = S3Credentials::load(&path)?;
                tracing::info!(
                    provider = %creds.provider,
                    bucket = %creds.bucket,
                    "Loaded bucket credentials"
                );
                StoreConfig::S3(creds)
            }
        };

        let notifier = match (args.telegram_bot_token, args.telegram_chat_id) {
            (Some(bot_token), Some(chat_id)) => NotifierConfig::Telegram { bot_token, chat_id },
            (None, None) => NotifierConfig::Log,
            _ => anyhow::bail!(
                "--telegram-bot-token and --telegram-chat-id must be given together"
            ),
        };

        Ok(Self {
            album,
            source,
            store,
            notifier,
            ledger_path: expand_tilde(&args.paths.ledger),
            staging_dir: expand_tilde(&args.paths.staging_dir),
            interval: (!args.once).then(|| Duration::from_secs(args.interval)),
            retry: RetryConfig {
                max_retries: args.max_retries,
                base_delay_secs: args.retry_delay,
                max_delay_secs: MAX_RETRY_DELAY_SECS.max(args.retry_delay),
            },
            http_timeout: Duration::from_secs(args.http_timeout),
            notify_systemd: args.notify_systemd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn sync_args(extra: &[&str]) -> SyncArgs {
        let mut argv = vec!["icloud-s3-sync", "sync", "--album", "Nikon"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Sync(args) => args,
            Command::Status(_) => panic!("expected sync"),
        }
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/Pictures");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("Pictures"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(
            expand_tilde("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        assert_eq!(
            expand_tilde("relative/path"),
            PathBuf::from("relative/path")
        );
    }

    #[test]
    fn test_local_source_and_bucket() {
        let cfg = Config::from_args(sync_args(&[
            "--source-dir",
            "/photos",
            "--bucket-dir",
            "/bucket",
        ]))
        .unwrap();
        assert!(matches!(cfg.source, SourceConfig::LocalDir(ref p) if p == &PathBuf::from("/photos")));
        assert!(matches!(cfg.store, StoreConfig::LocalDir(_)));
        assert!(matches!(cfg.notifier, NotifierConfig::Log));
        assert_eq!(cfg.interval, Some(Duration::from_secs(300)));
        assert_eq!(cfg.retry, RetryConfig::default());
        assert_eq!(cfg.ledger_path, PathBuf::from("processed_files.log"));
        assert_eq!(cfg.staging_dir, PathBuf::from("downloaded_photos"));
    }

    #[test]
    fn test_once_has_no_interval() {
        let cfg = Config::from_args(sync_args(&[
            "--source-dir",
            "/photos",
            "--bucket-dir",
            "/bucket",
            "--once",
        ]))
        .unwrap();
        assert_eq!(cfg.interval, None);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = Config::from_args(sync_args(&[
            "--source-dir",
            "/photos",
            "--bucket-dir",
            "/bucket",
            "--interval",
            "0",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("--interval"));
    }

    #[test]
    fn test_telegram_settings_must_be_paired() {
        let err = Config::from_args(sync_args(&[
            "--source-dir",
            "/photos",
            "--bucket-dir",
            "/bucket",
            "--telegram-bot-token",
            "123:abc",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn test_credentials_file_loaded_and_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let creds = dir.path().join("credentials.json");
        std::fs::write(
            &creds,
            r#"{"provider":"R2","endpoint_url":"https://acct.r2.cloudflarestorage.com",
                "access_key":"AKID","secret_key":"very-secret","bucket":"photos"}"#,
        )
        .unwrap();

        let cfg = Config::from_args(sync_args(&[
            "--shared-album-token",
            "B0abcdef",
            "--credentials",
            creds.to_str().unwrap(),
            "--telegram-bot-token",
            "123:abc",
            "--telegram-chat-id",
            "42",
        ]))
        .unwrap();

        match &cfg.store {
            StoreConfig::S3(c) => {
                assert_eq!(c.bucket, "photos");
                assert_eq!(c.region, "us-east-1");
            }
            other => panic!("unexpected store: {other:?}"),
        }
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("B0abcdef"));
        assert!(!debug.contains("123:abc"));
    }

    #[test]
    fn test_missing_credentials_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = Config::from_args(sync_args(&[
            "--source-dir",
            "/photos",
            "--credentials",
            missing.to_str().unwrap(),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Credentials file"));
    }
}
