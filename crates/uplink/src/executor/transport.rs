//! Resumable chunked-transfer executor.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::batch::UploadStrategy;
use crate::credentials::CredentialStore;
use crate::error::{Result, UploadError};
use crate::executor::{ExecContext, UploadExecutor};
use crate::job::UploadJob;
use crate::retry::{FixedRetryPolicy, retry_fixed};
use crate::transport::{ChunkStatus, UploadTransport};

/// Fixed chunk size for resumable transfers: 1 MiB.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Uploads one job through a resumable session, one fixed-size chunk at a
/// time. Transient chunk failures are retried at a fixed interval without an
/// attempt bound; only cancellation, success, or a terminal classification
/// ends the loop.
pub struct TransportExecutor {
    transport: Arc<dyn UploadTransport>,
    credentials: Arc<dyn CredentialStore>,
    chunk_retry: FixedRetryPolicy,
}

impl TransportExecutor {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        credentials: Arc<dyn CredentialStore>,
        chunk_retry: FixedRetryPolicy,
    ) -> Self {
        Self {
            transport,
            credentials,
            chunk_retry,
        }
    }

    async fn run_upload(&self, job: &UploadJob, ctx: &ExecContext) -> Result<String> {
        // The source must exist before any network I/O happens.
        let meta = tokio::fs::metadata(&job.source_path)
            .await
            .map_err(|_| UploadError::source_missing(job.source_path.display().to_string()))?;
        if !meta.is_file() {
            return Err(UploadError::source_missing(
                job.source_path.display().to_string(),
            ));
        }
        let total = meta.len();
        if total == 0 {
            return Err(UploadError::validation("source file is empty"));
        }

        ctx.checkpoint()?;
        info!(job_id = %job.id, total_bytes = total, "Opening resumable upload session");
        ctx.events.log(format!(
            "Uploading \"{}\" ({:.1} MiB)",
            job.title,
            total as f64 / (1024.0 * 1024.0)
        ));

        // The retry driver builds a fresh attempt future per tick, so the
        // session sits behind a mutex each attempt locks.
        let session = Mutex::new(self.transport.open_session(job, total).await?);

        let mut file = File::open(&job.source_path)
            .await
            .map_err(|e| UploadError::io(&e))?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;

        while sent < total {
            // Cancellation checkpoint before each chunk request.
            ctx.checkpoint()?;

            let want = CHUNK_SIZE.min((total - sent) as usize);
            file.read_exact(&mut buf[..want])
                .await
                .map_err(|e| UploadError::io(&e))?;
            let chunk = &buf[..want];

            // Transient failures resend this same chunk at a fixed interval,
            // indefinitely; a half-uploaded session is never abandoned over
            // flaky connectivity.
            let offset = sent;
            let session = &session;
            let status = retry_fixed(&self.chunk_retry, &ctx.cancel, |_| async move {
                session.lock().await.send_chunk(offset, chunk, total).await
            })
            .await?;

            sent += want as u64;
            match status {
                ChunkStatus::InProgress { committed } => {
                    debug!(job_id = %job.id, sent, committed, "Chunk accepted");
                    let percent = ((sent as u128 * 100) / total as u128) as u8;
                    ctx.progress.report(percent);
                }
                ChunkStatus::Complete { remote_id } => {
                    if sent < total {
                        warn!(job_id = %job.id, sent, total, "Remote finalized before the full media was sent");
                        return Err(UploadError::protocol(format!(
                            "session finalized after {sent} of {total} bytes"
                        )));
                    }
                    ctx.progress.report(100);
                    info!(job_id = %job.id, remote_id = %remote_id, "Upload complete");
                    ctx.events
                        .log(format!("Upload complete: \"{}\" -> {remote_id}", job.title));
                    return Ok(remote_id);
                }
            }
        }

        // Every byte was accepted but the remote never reported completion.
        Err(UploadError::protocol(
            "all chunks sent but the session was never finalized",
        ))
    }
}

#[async_trait]
impl UploadExecutor for TransportExecutor {
    fn strategy(&self) -> UploadStrategy {
        UploadStrategy::Transport
    }

    async fn execute(&self, job: &UploadJob, ctx: &ExecContext) -> Result<String> {
        let result = self.run_upload(job, ctx).await;
        if let Err(UploadError::AuthExpired { .. }) = &result {
            // The cached credential is dead; make sure nothing reuses it.
            self.credentials.invalidate().await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::events::{EventSink, UploadEvent};
    use crate::job::UploadSpec;
    use crate::progress::ProgressReporter;
    use crate::transport::{PlaylistPage, UploadSession};

    /// Session fed a fixed script of per-call results.
    struct ScriptedSession {
        script: VecDeque<Result<ChunkStatus>>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl UploadSession for ScriptedSession {
        async fn send_chunk(
            &mut self,
            _offset: u64,
            _chunk: &[u8],
            _total: u64,
        ) -> Result<ChunkStatus> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.script.pop_front().expect("session script exhausted")
        }
    }

    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<ChunkStatus>>>,
        calls: Arc<AtomicU32>,
        open_calls: Arc<AtomicU32>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<ChunkStatus>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: Arc::new(AtomicU32::new(0)),
                open_calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        async fn open_session(
            &self,
            _job: &UploadJob,
            _total_bytes: u64,
        ) -> Result<Box<dyn UploadSession>> {
            self.open_calls.fetch_add(1, Ordering::Relaxed);
            let script = std::mem::take(&mut *self.script.lock().await);
            Ok(Box::new(ScriptedSession {
                script,
                calls: self.calls.clone(),
            }))
        }

        async fn set_thumbnail(&self, _remote_id: &str, _image: &Path) -> Result<()> {
            Ok(())
        }

        async fn list_playlists(&self, _page_token: Option<String>) -> Result<PlaylistPage> {
            Ok(PlaylistPage::default())
        }

        async fn add_to_playlist(&self, _playlist_id: &str, _remote_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct SpyCredentials {
        invalidated: AtomicBool,
    }

    #[async_trait]
    impl CredentialStore for SpyCredentials {
        async fn bearer_token(&self) -> Result<String> {
            Ok("tok".into())
        }

        async fn invalidate(&self) {
            self.invalidated.store(true, Ordering::Relaxed);
        }
    }

    fn media_file(bytes: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![0u8; bytes]).unwrap();
        f.flush().unwrap();
        f
    }

    fn job_for(path: &Path) -> UploadJob {
        UploadJob::from_spec(UploadSpec::new(path, "test media")).unwrap()
    }

    fn executor(
        transport: ScriptedTransport,
        credentials: Arc<SpyCredentials>,
    ) -> TransportExecutor {
        TransportExecutor::new(
            Arc::new(transport),
            credentials,
            FixedRetryPolicy {
                interval: Duration::from_millis(1),
            },
        )
    }

    fn spy_credentials() -> Arc<SpyCredentials> {
        Arc::new(SpyCredentials {
            invalidated: AtomicBool::new(false),
        })
    }

    fn collect_percents(rx: &mut tokio::sync::broadcast::Receiver<UploadEvent>) -> Vec<u8> {
        let mut percents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let UploadEvent::JobProgress { percent, .. } = event {
                percents.push(percent);
            }
        }
        percents
    }

    #[tokio::test]
    async fn uploads_in_fixed_chunks_with_monotonic_progress() {
        // 2.5 MiB -> chunks of 1 MiB, 1 MiB, 0.5 MiB.
        let file = media_file(CHUNK_SIZE * 2 + CHUNK_SIZE / 2);
        let job = job_for(file.path());

        let transport = ScriptedTransport::new(vec![
            Ok(ChunkStatus::InProgress {
                committed: CHUNK_SIZE as u64,
            }),
            Ok(ChunkStatus::InProgress {
                committed: (CHUNK_SIZE * 2) as u64,
            }),
            Ok(ChunkStatus::Complete {
                remote_id: "vid42".into(),
            }),
        ]);
        let creds = spy_credentials();
        let exec = executor(transport, creds);

        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let ctx = ExecContext::new(
            CancellationToken::new(),
            ProgressReporter::new(&job.id, sink.clone()),
            sink,
        );

        let remote_id = exec.execute(&job, &ctx).await.unwrap();
        assert_eq!(remote_id, "vid42");

        let percents = collect_percents(&mut rx);
        assert_eq!(percents, vec![40, 80, 100]);
    }

    #[tokio::test]
    async fn transient_errors_retry_the_same_chunk_until_success() {
        let file = media_file(1024);
        let job = job_for(file.path());

        let transport = ScriptedTransport::new(vec![
            Err(UploadError::network("connection reset")),
            Err(UploadError::network("connection reset")),
            Ok(ChunkStatus::Complete {
                remote_id: "vid7".into(),
            }),
        ]);
        let calls = transport.calls.clone();
        let creds = spy_credentials();
        let exec = executor(transport, creds);

        let sink = EventSink::new();
        let mut rx = sink.subscribe();
        let ctx = ExecContext::new(
            CancellationToken::new(),
            ProgressReporter::new(&job.id, sink.clone()),
            sink,
        );

        let remote_id = exec.execute(&job, &ctx).await.unwrap();
        assert_eq!(remote_id, "vid7");
        // Two transient failures plus the final success, all the same chunk.
        assert_eq!(calls.load(Ordering::Relaxed), 3);

        let percents = collect_percents(&mut rx);
        assert_eq!(percents, vec![100]);
    }

    #[tokio::test]
    async fn quota_errors_are_terminal_without_retry() {
        let file = media_file(1024);
        let job = job_for(file.path());

        let transport = ScriptedTransport::new(vec![Err(UploadError::quota("daily limit"))]);
        let calls = transport.calls.clone();
        let creds = spy_credentials();
        let exec = executor(transport, creds.clone());

        let err = exec.execute(&job, &ctx_detached()).await.unwrap_err();
        assert!(matches!(err, UploadError::QuotaExceeded { .. }));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(!creds.invalidated.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn auth_expiry_invalidates_the_credential() {
        let file = media_file(1024);
        let job = job_for(file.path());

        let transport = ScriptedTransport::new(vec![Err(UploadError::auth_expired("revoked"))]);
        let creds = spy_credentials();
        let exec = executor(transport, creds.clone());

        let err = exec.execute(&job, &ctx_detached()).await.unwrap_err();
        assert!(matches!(err, UploadError::AuthExpired { .. }));
        assert!(creds.invalidated.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn missing_source_fails_before_any_network_io() {
        let job = job_for(Path::new("/nonexistent/clip.mp4"));
        let transport = ScriptedTransport::new(vec![]);
        let opens = transport.open_calls.clone();
        let creds = spy_credentials();
        let exec = executor(transport, creds);

        let err = exec.execute(&job, &ctx_detached()).await.unwrap_err();
        assert!(matches!(err, UploadError::SourceMissing { .. }));
        assert_eq!(opens.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_a_session_is_opened() {
        let file = media_file(CHUNK_SIZE * 2);
        let job = job_for(file.path());

        let transport = ScriptedTransport::new(vec![Ok(ChunkStatus::InProgress {
            committed: CHUNK_SIZE as u64,
        })]);
        let opens = transport.open_calls.clone();
        let creds = spy_credentials();
        let exec = executor(transport, creds);

        let token = CancellationToken::new();
        token.cancel();
        let sink = EventSink::new();
        let ctx = ExecContext::new(token, ProgressReporter::noop(), sink);

        let err = exec.execute(&job, &ctx).await.unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(opens.load(Ordering::Relaxed), 0);
    }

    fn ctx_detached() -> ExecContext {
        ExecContext::detached()
    }
}
