use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "icloud-s3-sync",
    version,
    about = "Mirror an iCloud shared album into an object-storage bucket"
)]
pub struct Cli {
    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Continuously copy new photos from the album to the bucket
    Sync(SyncArgs),
    /// Show ledger and staging directory state
    Status(StatusArgs),
}

/// Local state shared by every command.
#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    /// Append-only log of synchronized photo ids
    #[arg(long, default_value = "processed_files.log")]
    pub ledger: String,

    /// Scratch directory for photos between download and upload
    #[arg(long, default_value = "downloaded_photos")]
    pub staging_dir: String,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["shared_album_token", "source_dir"])
))]
pub struct SyncArgs {
    /// Name of the album to mirror
    #[arg(short = 'a', long, env = "ICLOUD_ALBUM")]
    pub album: String,

    /// Token of a public iCloud shared album (the part after `#` in its link)
    #[arg(long, env = "ICLOUD_SHARED_ALBUM_TOKEN", hide_env_values = true)]
    pub shared_album_token: Option<String>,

    /// Read albums from subdirectories of this directory instead of iCloud
    #[arg(long)]
    pub source_dir: Option<String>,

    /// S3 credentials file (default: credentials.json)
    #[arg(long, conflicts_with = "bucket_dir")]
    pub credentials: Option<String>,

    /// Store objects in this directory instead of an S3 bucket
    #[arg(long)]
    pub bucket_dir: Option<String>,

    /// Seconds to wait between checks
    #[arg(long, default_value_t = 300)]
    pub interval: u64,

    /// Run a single check and exit
    #[arg(long)]
    pub once: bool,

    /// Telegram bot token for operator notifications
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    /// Telegram chat that receives notifications
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: Option<String>,

    /// Max retries per download or upload (0 = no retries)
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Initial retry delay in seconds
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Timeout in seconds for photo source and bucket requests
    #[arg(long, default_value_t = 120)]
    pub http_timeout: u64,

    /// Send sd_notify messages to systemd
    #[arg(long)]
    pub notify_systemd: bool,

    #[command(flatten)]
    pub paths: PathArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub paths: PathArgs,
}
