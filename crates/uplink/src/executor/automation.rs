//! Browser-automation executor.
//!
//! Drives a studio upload page end to end: acquire a session on the
//! persistent profile, fill the form field by field, publish, and read the
//! assigned media id off the permalink. Every page step is preceded by a
//! cancellation checkpoint so a stop request lands between actions rather
//! than mid-gesture.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use crate::automation::{AutomationDriver, AutomationSession};
use crate::batch::UploadStrategy;
use crate::config::AutomationConfig;
use crate::error::{Result, UploadError};
use crate::executor::interact::{click_with_fallback, human_delay, wait_for_presence};
use crate::executor::{ExecContext, UploadExecutor};
use crate::job::UploadJob;

/// Uploads one job by driving a browser session through the upload page.
pub struct AutomationExecutor {
    driver: Arc<dyn AutomationDriver>,
    config: AutomationConfig,
}

impl AutomationExecutor {
    pub fn new(driver: Arc<dyn AutomationDriver>, config: AutomationConfig) -> Self {
        Self { driver, config }
    }

    /// Start a browser session, wiping the profile directory between failed
    /// attempts. A failed start routinely leaves lock files behind that
    /// doom every later attempt on the same profile.
    async fn acquire_session(&self, ctx: &ExecContext) -> Result<Box<dyn AutomationSession>> {
        let attempts = self.config.session_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            if ctx.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            if attempt > 1 {
                match tokio::fs::remove_dir_all(&self.config.profile_dir).await {
                    Ok(()) => info!(
                        profile = %self.config.profile_dir.display(),
                        "Cleared browser profile before retrying"
                    ),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        warn!(error = %err, "Could not clear the browser profile")
                    }
                }
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(UploadError::Cancelled),
                    _ = sleep(self.config.session_retry_delay) => {}
                }
            }

            match self
                .driver
                .start_session(&self.config.profile_dir, self.config.headless)
                .await
            {
                Ok(session) => return Ok(session),
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "Browser session failed to start");
                    last_reason = err.to_string();
                }
            }
        }

        Err(UploadError::session_unavailable(attempts, last_reason))
    }

    async fn publish(
        &self,
        session: &mut dyn AutomationSession,
        job: &UploadJob,
        ctx: &ExecContext,
    ) -> Result<String> {
        let selectors = &self.config.selectors;

        ctx.checkpoint()?;
        session.goto(&self.config.upload_url).await?;
        ctx.progress.report(5);

        // Typing the path into the file input starts the in-page upload.
        ctx.checkpoint()?;
        ctx.events
            .log(format!("Selecting media file for \"{}\"", job.title));
        let source = absolute_path_string(&job.source_path)?;
        let mut media = wait_for_presence(session, &selectors.media_input, &self.config, &ctx.cancel).await?;
        media.send_keys(&source).await?;
        human_delay(&self.config).await;
        ctx.progress.report(15);

        ctx.checkpoint()?;
        let mut title =
            wait_for_presence(session, &selectors.title_field, &self.config, &ctx.cancel).await?;
        title.clear().await?;
        title.send_keys(&job.title).await?;
        human_delay(&self.config).await;
        ctx.progress.report(30);

        if !job.description.is_empty() {
            ctx.checkpoint()?;
            let mut description = wait_for_presence(
                session,
                &selectors.description_field,
                &self.config,
                &ctx.cancel,
            )
            .await?;
            description.clear().await?;
            description.send_keys(&job.description).await?;
            human_delay(&self.config).await;
        }
        ctx.progress.report(40);

        ctx.checkpoint()?;
        let privacy = selectors.privacy_option(&job.privacy.to_string());
        click_with_fallback(session, &privacy, &self.config, &ctx.cancel, &ctx.events).await?;
        ctx.progress.report(55);

        // A missing thumbnail file must not sink the upload itself.
        if let Some(thumbnail) = &job.thumbnail_path {
            ctx.checkpoint()?;
            if tokio::fs::metadata(thumbnail).await.is_ok() {
                let path = absolute_path_string(thumbnail)?;
                let mut input = wait_for_presence(
                    session,
                    &selectors.thumbnail_input,
                    &self.config,
                    &ctx.cancel,
                )
                .await?;
                input.send_keys(&path).await?;
                human_delay(&self.config).await;
            } else {
                warn!(
                    job_id = %job.id,
                    path = %thumbnail.display(),
                    "Thumbnail file missing; publishing without it"
                );
                ctx.events.log(format!(
                    "Thumbnail file missing, skipping: {}",
                    thumbnail.display()
                ));
            }
        }
        ctx.progress.report(65);

        if !job.tags.is_empty() {
            ctx.checkpoint()?;
            let mut tags =
                wait_for_presence(session, &selectors.tags_field, &self.config, &ctx.cancel)
                    .await?;
            tags.clear().await?;
            tags.send_keys(&job.tags.join(",")).await?;
            human_delay(&self.config).await;
        }
        ctx.progress.report(75);

        ctx.checkpoint()?;
        ctx.events.log("Confirming publish".to_owned());
        click_with_fallback(
            session,
            &selectors.confirm_button,
            &self.config,
            &ctx.cancel,
            &ctx.events,
        )
        .await?;
        ctx.progress.report(85);

        // The permalink appearing is the publish acknowledgement; it gets
        // the longer publish window rather than the form-field timeout.
        ctx.checkpoint()?;
        let publish_window = AutomationConfig {
            presence_timeout: self.config.publish_timeout,
            ..self.config.clone()
        };
        let mut link =
            wait_for_presence(session, &selectors.media_link, &publish_window, &ctx.cancel)
                .await?;
        let remote_id = match link.attr("href").await? {
            Some(href) if !href.trim().is_empty() => remote_id_from_href(href.trim()),
            _ => {
                let text = link.text().await?;
                let text = text.trim();
                (!text.is_empty()).then(|| remote_id_from_href(text)).flatten()
            }
        }
        .ok_or_else(|| {
            UploadError::protocol("publish confirmed but no media id could be read")
        })?;

        ctx.progress.report(100);
        info!(job_id = %job.id, remote_id = %remote_id, "Publish confirmed");
        ctx.events
            .log(format!("Upload complete: \"{}\" -> {remote_id}", job.title));
        Ok(remote_id)
    }
}

#[async_trait]
impl UploadExecutor for AutomationExecutor {
    fn strategy(&self) -> UploadStrategy {
        UploadStrategy::Automation
    }

    async fn execute(&self, job: &UploadJob, ctx: &ExecContext) -> Result<String> {
        // Same pre-flight as the transport path: no browser work without a
        // readable source file.
        let meta = tokio::fs::metadata(&job.source_path)
            .await
            .map_err(|_| UploadError::source_missing(job.source_path.display().to_string()))?;
        if !meta.is_file() {
            return Err(UploadError::source_missing(
                job.source_path.display().to_string(),
            ));
        }

        ctx.checkpoint()?;
        let mut session = self.acquire_session(ctx).await?;
        info!(job_id = %job.id, "Browser session started");

        let result = self.publish(session.as_mut(), job, ctx).await;

        // The session closes on every exit path; a wedged browser would
        // otherwise hold the profile hostage for the rest of the batch.
        if let Err(err) = session.close().await {
            warn!(error = %err, "Browser session did not close cleanly");
        }

        result
    }
}

/// Pull the media id out of a permalink.
///
/// Handles both query-parameter permalinks (`…/watch?v=ID`) and short-path
/// permalinks (`…/ID`), absolute or relative.
fn remote_id_from_href(href: &str) -> Option<String> {
    let url = Url::parse(href)
        .or_else(|_| Url::parse("https://placeholder.invalid").and_then(|base| base.join(href)))
        .ok()?;

    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        if !v.is_empty() {
            return Some(v.into_owned());
        }
    }

    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_owned)
}

/// File inputs reject relative paths, so hand them an absolute one.
fn absolute_path_string(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| UploadError::io(&e))?
            .join(path)
    };
    Ok(absolute.display().to_string())
}
