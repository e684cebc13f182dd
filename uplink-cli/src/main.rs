mod cli;
mod display;
mod error;
mod manifest;

use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use uplink_engine::UploadError;
use uplink_engine::automation::{AutomationDriver, AutomationSession};
use uplink_engine::credentials::{CredentialStore, StaticTokenStore};
use uplink_engine::transport::HttpTransport;
use uplink_engine::{UploadService, UploadSpec, UploadStrategy, UplinkConfig};

use crate::cli::{Cli, Command, UploadArgs};
use crate::display::render_events;
use crate::error::{AppError, Result};
use crate::manifest::{Manifest, ManifestEntry};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let log_guard = match init_logging(&args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("Application error: {e}");
            eprintln!("Error: {e}");
            1
        }
    };

    // Flush file logs before exiting with a nonzero code.
    drop(log_guard);
    if code != 0 {
        process::exit(code);
    }
}

async fn run(args: Cli) -> Result<i32> {
    match args.command {
        Command::Upload(upload) => run_upload(upload).await,
    }
}

async fn run_upload(args: UploadArgs) -> Result<i32> {
    // The engine's automation path needs a WebDriver binding supplied by the
    // embedding application; this binary only wires up the transport path.
    if args.strategy == UploadStrategy::Automation {
        return Err(AppError::InvalidInput(
            "the automation strategy needs a browser driver; this build only ships the transport path"
                .to_owned(),
        ));
    }
    if args.files.len() > 1 && args.title.is_some() {
        return Err(AppError::InvalidInput(
            "--title applies to a single file; use --manifest for per-file titles".to_owned(),
        ));
    }
    if args.files.len() > 1 && args.thumbnail.is_some() {
        return Err(AppError::InvalidInput(
            "--thumbnail applies to a single file; use --manifest for per-file thumbnails"
                .to_owned(),
        ));
    }

    let manifest = match &args.manifest {
        Some(path) => Manifest::load(path)?,
        None => Manifest::default(),
    };
    let token = read_token(&args)?;

    let mut config = UplinkConfig::new();
    if let Some(base_url) = &args.base_url {
        config.transport.base_url = base_url.trim_end_matches('/').to_owned();
    }

    let credentials: Arc<dyn CredentialStore> = Arc::new(StaticTokenStore::new(token));
    let transport = Arc::new(HttpTransport::new(
        config.transport.clone(),
        credentials.clone(),
    ));
    let service = UploadService::spawn(config, transport, Arc::new(NoDriver), credentials);

    // Subscribe before the first enqueue so no event is missed.
    let events = service.subscribe();
    for file in &args.files {
        let spec = build_spec(file, &args, manifest.entry_for(file));
        let job = service.enqueue(spec).await?;
        info!(job_id = %job.id, title = %job.title, "Queued");
    }
    service.start_batch(args.strategy).await?;

    let stopper = service.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current job");
            stopper.request_stop().await.ok();
        }
    });

    let outcome = render_events(events).await;
    service.shutdown().await.ok();

    info!(
        completed = outcome.completed,
        failed = outcome.failed,
        stopped = outcome.stopped,
        "Batch finished"
    );
    Ok(outcome.exit_code())
}

/// Merge manifest overrides and command-line flags into one upload spec.
/// Manifest entries win; the title falls back to the file stem.
fn build_spec(file: &Path, args: &UploadArgs, entry: Option<&ManifestEntry>) -> UploadSpec {
    let entry = entry.cloned().unwrap_or_default();

    let title = entry
        .title
        .or_else(|| args.title.clone())
        .unwrap_or_else(|| file_stem(file));
    let mut spec = UploadSpec::new(file, title);

    if let Some(description) = entry.description.or_else(|| args.description.clone()) {
        spec = spec.with_description(description);
    }
    let tags = if entry.tags.is_empty() {
        args.tags.clone()
    } else {
        entry.tags
    };
    if !tags.is_empty() {
        spec = spec.with_tags(tags);
    }
    if let Some(playlist) = entry.playlist.or_else(|| args.playlist.clone()) {
        spec = spec.with_playlist(playlist);
    }
    if let Some(thumbnail) = entry.thumbnail.or_else(|| args.thumbnail.clone()) {
        spec = spec.with_thumbnail(thumbnail);
    }
    spec = spec.with_privacy(entry.privacy.unwrap_or(args.privacy));
    if let Some(category) = entry.category.or_else(|| args.category.clone()) {
        spec = spec.with_category(category);
    }
    spec
}

fn file_stem(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string())
}

fn read_token(args: &UploadArgs) -> Result<String> {
    if let Some(path) = &args.token_file {
        let token = std::fs::read_to_string(path)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "token file {} is empty",
                path.display()
            )));
        }
        return Ok(token.to_owned());
    }
    match std::env::var("UPLINK_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_owned()),
        _ => Err(AppError::InvalidInput(
            "no credentials: pass --token-file or set UPLINK_TOKEN".to_owned(),
        )),
    }
}

/// Stand-in driver. The automation strategy is rejected before the service
/// could ever reach it.
struct NoDriver;

#[async_trait::async_trait]
impl AutomationDriver for NoDriver {
    async fn start_session(
        &self,
        _profile_dir: &Path,
        _headless: bool,
    ) -> uplink_engine::Result<Box<dyn AutomationSession>> {
        Err(UploadError::session_unavailable(
            0,
            "this build has no browser driver",
        ))
    }
}

fn init_logging(args: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = if args.quiet {
        EnvFilter::new("error")
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false));

    if let Some(dir) = &args.log_dir {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, "uplink.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .init();
        return Ok(Some(guard));
    }

    registry.init();
    Ok(None)
}
