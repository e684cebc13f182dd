//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use uplink_engine::batch::UploadStrategy;
use uplink_engine::job::Privacy;

/// Batch media uploader.
#[derive(Debug, Parser)]
#[command(name = "uplink", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Also write logs to daily-rotated files in this directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload one or more media files as a single batch.
    Upload(UploadArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Media files to upload, in batch order.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Title; single file only (defaults to the file stem).
    #[arg(long)]
    pub title: Option<String>,

    /// Description applied to every file.
    #[arg(long)]
    pub description: Option<String>,

    /// Comma-separated tags applied to every file.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Playlist every upload is added to.
    #[arg(long)]
    pub playlist: Option<String>,

    /// Thumbnail image; single file only.
    #[arg(long, value_name = "IMAGE")]
    pub thumbnail: Option<PathBuf>,

    /// Privacy applied to every file.
    #[arg(long, value_enum, default_value_t = Privacy::default())]
    pub privacy: Privacy,

    /// Category identifier applied to every file.
    #[arg(long)]
    pub category: Option<String>,

    /// JSON manifest with per-file metadata overrides.
    #[arg(long, value_name = "JSON")]
    pub manifest: Option<PathBuf>,

    /// Upload strategy for this batch.
    #[arg(long, value_enum, default_value_t = UploadStrategy::Transport)]
    pub strategy: UploadStrategy,

    /// Base URL of the upload API.
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// File holding the bearer token (falls back to $UPLINK_TOKEN).
    #[arg(long, value_name = "PATH")]
    pub token_file: Option<PathBuf>,
}
