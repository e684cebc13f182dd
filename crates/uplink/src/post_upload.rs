//! Post-upload side effects: thumbnail, then playlist membership.
//!
//! Both steps are best-effort decorations of an upload that already
//! succeeded. They log and report their failures but never turn a
//! completed job into a failed one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::ExecContext;
use crate::job::UploadJob;
use crate::retry::{BackoffPolicy, retry_with_backoff};
use crate::transport::UploadTransport;

/// Name-to-id playlist index, fetched once per batch.
///
/// Every job in a batch shares one cache, so the paginated listing is
/// pulled once no matter how many jobs target playlists.
#[derive(Default)]
pub struct PlaylistCache {
    entries: Mutex<Option<HashMap<String, String>>>,
}

impl PlaylistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a playlist name to its id. The first call walks the full
    /// paginated listing; later calls answer from memory.
    ///
    /// Names match exactly. `Ok(None)` means the listing holds no playlist
    /// with this name.
    async fn resolve(
        &self,
        transport: &dyn UploadTransport,
        backoff: &BackoffPolicy,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Option<String>> {
        if let Some(entries) = &*self.entries.lock() {
            return Ok(entries.get(name).cloned());
        }

        let mut entries = HashMap::new();
        let mut page_token: Option<String> = None;
        loop {
            let request_token = page_token.clone();
            let page = retry_with_backoff(backoff, cancel, |_| {
                let request_token = request_token.clone();
                async move { transport.list_playlists(request_token).await }
            })
            .await?;

            for entry in page.items {
                entries.insert(entry.name, entry.id);
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(playlists = entries.len(), "Playlist listing cached");
        let resolved = entries.get(name).cloned();
        *self.entries.lock() = Some(entries);
        Ok(resolved)
    }
}

/// Runs the side-effect steps after a successful primary upload.
pub struct PostUploadPipeline {
    transport: Arc<dyn UploadTransport>,
    backoff: BackoffPolicy,
}

impl PostUploadPipeline {
    pub fn new(transport: Arc<dyn UploadTransport>, backoff: BackoffPolicy) -> Self {
        Self { transport, backoff }
    }

    /// Apply the thumbnail and playlist steps, in that order.
    pub async fn run(
        &self,
        job: &UploadJob,
        remote_id: &str,
        cache: &PlaylistCache,
        ctx: &ExecContext,
    ) {
        self.apply_thumbnail(job, remote_id, ctx).await;
        self.apply_playlist(job, remote_id, cache, ctx).await;
    }

    async fn apply_thumbnail(&self, job: &UploadJob, remote_id: &str, ctx: &ExecContext) {
        let Some(path) = &job.thumbnail_path else {
            warn!(job_id = %job.id, "No thumbnail set; skipping");
            ctx.events.log("No thumbnail set, skipping".to_owned());
            return;
        };

        if tokio::fs::metadata(path).await.is_err() {
            warn!(
                job_id = %job.id,
                path = %path.display(),
                "Thumbnail file missing; skipping"
            );
            ctx.events.log(format!(
                "Thumbnail file missing, skipping: {}",
                path.display()
            ));
            return;
        }

        let transport = self.transport.as_ref();
        let image = path.as_path();
        let result = retry_with_backoff(&self.backoff, &ctx.cancel, |_| async move {
            transport.set_thumbnail(remote_id, image).await
        })
        .await;

        match result {
            Ok(()) => {
                info!(job_id = %job.id, remote_id, "Thumbnail set");
                ctx.events.log("Thumbnail set".to_owned());
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "Could not set the thumbnail");
                ctx.events.log(format!("Could not set thumbnail: {err}"));
            }
        }
    }

    async fn apply_playlist(
        &self,
        job: &UploadJob,
        remote_id: &str,
        cache: &PlaylistCache,
        ctx: &ExecContext,
    ) {
        let Some(name) = &job.playlist_name else {
            return;
        };

        let playlist_id = match cache
            .resolve(self.transport.as_ref(), &self.backoff, &ctx.cancel, name)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(job_id = %job.id, playlist = %name, "No playlist with this name");
                ctx.events
                    .log(format!("Playlist \"{name}\" not found, skipping"));
                return;
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "Playlist lookup failed");
                ctx.events.log(format!("Could not list playlists: {err}"));
                return;
            }
        };

        let transport = self.transport.as_ref();
        let playlist = playlist_id.as_str();
        let result = retry_with_backoff(&self.backoff, &ctx.cancel, |_| async move {
            transport.add_to_playlist(playlist, remote_id).await
        })
        .await;

        match result {
            Ok(()) => {
                info!(job_id = %job.id, playlist_id = %playlist_id, "Added to playlist");
                ctx.events.log(format!("Added to playlist \"{name}\""));
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "Could not add to the playlist");
                ctx.events
                    .log(format!("Could not add to playlist \"{name}\": {err}"));
            }
        }
    }
}
