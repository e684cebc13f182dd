//! Resumable-upload transport over HTTP.
//!
//! The wire protocol is the two-step resumable scheme: a metadata POST
//! opens a session and hands back a session URI in the `Location` header,
//! then the media goes up that URI in `Content-Range`d PUTs. A 308 response
//! acknowledges an intermediate chunk; the final chunk gets a 2xx with the
//! stored media resource as JSON.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{Client, StatusCode};
use rustls::{ClientConfig, crypto::aws_lc_rs};
use rustls_platform_verifier::BuilderVerifierExt;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::credentials::CredentialStore;
use crate::error::{Result, UploadError};
use crate::job::UploadJob;
use crate::transport::{
    ChunkStatus, PlaylistEntry, PlaylistPage, UploadSession, UploadTransport,
};

/// HTTP client against the remote media API.
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let client = build_client(&config);
        Self {
            client,
            config,
            credentials,
        }
    }

    async fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.credentials.bearer_token().await?))
    }
}

fn build_client(config: &TransportConfig) -> Client {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .expect("Failed to initialize the platform certificate verifier")
        .with_no_client_auth();

    Client::builder()
        .use_preconfigured_tls(tls_config)
        .user_agent(&config.user_agent)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        // 308 is a transfer acknowledgement in the resumable protocol, not
        // a redirect to follow.
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn open_session(
        &self,
        job: &UploadJob,
        total_bytes: u64,
    ) -> Result<Box<dyn UploadSession>> {
        let url = format!("{}/media?uploadType=resumable", self.config.base_url);
        let content_type = content_type_for(&job.source_path);
        let body = metadata_body(job, &self.config.default_category);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer().await?)
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", total_bytes)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let session_uri = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                UploadError::protocol("upload initiation returned no session URI")
            })?;

        info!(job_id = %job.id, "Resumable upload session opened");
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            session_uri,
            content_type,
        }))
    }

    async fn set_thumbnail(&self, remote_id: &str, image: &Path) -> Result<()> {
        let bytes = tokio::fs::read(image).await.map_err(|e| UploadError::io(&e))?;
        let url = format!("{}/media/{remote_id}/thumbnail", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer().await?)
            .header(CONTENT_TYPE, content_type_for(image))
            .body(bytes)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        debug!(remote_id, "Thumbnail stored");
        Ok(())
    }

    async fn list_playlists(&self, page_token: Option<String>) -> Result<PlaylistPage> {
        let url = format!("{}/playlists", self.config.base_url);
        let mut request = self.client.get(&url).header(AUTHORIZATION, self.bearer().await?);
        if let Some(token) = &page_token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: PlaylistListBody = response
            .json()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        Ok(PlaylistPage {
            items: body
                .items
                .into_iter()
                .map(|item| PlaylistEntry {
                    id: item.id,
                    name: item.name,
                })
                .collect(),
            next_page_token: body.next_page_token,
        })
    }

    async fn add_to_playlist(&self, playlist_id: &str, remote_id: &str) -> Result<()> {
        let url = format!("{}/playlists/{playlist_id}/items", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.bearer().await?)
            .json(&serde_json::json!({ "mediaId": remote_id }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        debug!(remote_id, playlist_id, "Added to playlist");
        Ok(())
    }
}

/// One open resumable session; chunks go up the session URI, which is
/// self-authorizing.
struct HttpSession {
    client: Client,
    session_uri: String,
    content_type: &'static str,
}

#[async_trait]
impl UploadSession for HttpSession {
    async fn send_chunk(&mut self, offset: u64, chunk: &[u8], total: u64) -> Result<ChunkStatus> {
        debug_assert!(!chunk.is_empty());
        let last = offset + chunk.len() as u64 - 1;

        let response = self
            .client
            .put(&self.session_uri)
            .header(CONTENT_TYPE, self.content_type)
            .header(CONTENT_RANGE, format!("bytes {offset}-{last}/{total}"))
            .body(chunk.to_vec())
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if status == StatusCode::PERMANENT_REDIRECT {
            // Intermediate ack; the Range header says how much the remote
            // has durably stored.
            let committed = response
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(committed_from_range)
                .unwrap_or(offset + chunk.len() as u64);
            return Ok(ChunkStatus::InProgress { committed });
        }

        if status.is_success() {
            let media: UploadedMediaBody = response
                .json()
                .await
                .map_err(|e| classify_reqwest_error(&e))?;
            return Ok(ChunkStatus::Complete {
                remote_id: media.id,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[derive(Deserialize)]
struct UploadedMediaBody {
    id: String,
}

#[derive(Deserialize)]
struct PlaylistListBody {
    #[serde(default)]
    items: Vec<PlaylistItemBody>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItemBody {
    id: String,
    name: String,
}

/// Classify a transport-level failure from reqwest.
pub fn classify_reqwest_error(err: &reqwest::Error) -> UploadError {
    if err.is_decode() {
        UploadError::protocol(err.to_string())
    } else {
        // Timeouts, connection resets and the like; all worth retrying.
        UploadError::network(err.to_string())
    }
}

/// Map a non-success HTTP status onto the engine's error classification.
fn classify_status(status: StatusCode, body: &str) -> UploadError {
    let reason = body_snippet(body);
    match status {
        StatusCode::UNAUTHORIZED => UploadError::auth_expired(reason),
        // The remote reports quota exhaustion as a 403 with a quota marker
        // in the body; any other 403 means the credential lost the scope.
        StatusCode::FORBIDDEN => {
            if body.to_ascii_lowercase().contains("quota") {
                UploadError::quota(reason)
            } else {
                UploadError::auth_expired(reason)
            }
        }
        StatusCode::TOO_MANY_REQUESTS => UploadError::quota(reason),
        StatusCode::REQUEST_TIMEOUT => UploadError::network(reason),
        s if s.is_server_error() => UploadError::network(reason),
        s => UploadError::rejected(s.as_u16(), reason),
    }
}

/// Metadata sent with the initiation request. Title, category and privacy
/// always; description and tags only when non-empty.
fn metadata_body(job: &UploadJob, default_category: &str) -> serde_json::Value {
    let mut body = serde_json::json!({
        "title": job.title,
        "category": job.category.as_deref().unwrap_or(default_category),
        "privacy": job.privacy.to_string(),
    });
    if !job.description.is_empty() {
        body["description"] = serde_json::Value::String(job.description.clone());
    }
    if !job.tags.is_empty() {
        body["tags"] = serde_json::json!(job.tags);
    }
    body
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4" | "m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("flv") => "video/x-flv",
        Some("ts") => "video/mp2t",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Parse `bytes=0-N` from a 308 Range acknowledgement into a committed
/// byte count.
fn committed_from_range(value: &str) -> Option<u64> {
    let (_, end) = value.trim().strip_prefix("bytes=")?.split_once('-')?;
    end.trim().parse::<u64>().ok().map(|end| end + 1)
}

fn body_snippet(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_owned()
    } else {
        let cut: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::job::UploadSpec;

    #[rstest]
    #[case(401, "", UploadError::AuthExpired { reason: String::new() })]
    #[case(403, "user quota exceeded", UploadError::QuotaExceeded { reason: "user quota exceeded".into() })]
    #[case(403, "forbidden", UploadError::AuthExpired { reason: "forbidden".into() })]
    #[case(429, "slow down", UploadError::QuotaExceeded { reason: "slow down".into() })]
    #[case(500, "boom", UploadError::NetworkTransient { reason: "boom".into() })]
    #[case(503, "maintenance", UploadError::NetworkTransient { reason: "maintenance".into() })]
    #[case(400, "bad metadata", UploadError::RemoteRejected { status: 400, reason: "bad metadata".into() })]
    fn statuses_map_to_classified_errors(
        #[case] status: u16,
        #[case] body: &str,
        #[case] expected: UploadError,
    ) {
        let status = StatusCode::from_u16(status).unwrap();
        assert_eq!(classify_status(status, body), expected);
    }

    #[test]
    fn range_ack_parses_to_committed_bytes() {
        assert_eq!(committed_from_range("bytes=0-1048575"), Some(1_048_576));
        assert_eq!(committed_from_range(" bytes=0-0 "), Some(1));
        assert_eq!(committed_from_range("0-1048575"), None);
        assert_eq!(committed_from_range("bytes=garbage"), None);
    }

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.MKV")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("thumb.png")), "image/png");
        assert_eq!(
            content_type_for(Path::new("mystery")),
            "application/octet-stream"
        );
    }

    #[test]
    fn metadata_omits_empty_optional_fields() {
        let job = UploadJob::from_spec(UploadSpec::new("/clip.mp4", "a title")).unwrap();
        let body = metadata_body(&job, "22");

        assert_eq!(body["title"], "a title");
        assert_eq!(body["category"], "22");
        assert_eq!(body["privacy"], "private");
        assert!(body.get("description").is_none());
        assert!(body.get("tags").is_none());
    }

    #[test]
    fn metadata_carries_populated_optional_fields() {
        let spec = UploadSpec::new("/clip.mp4", "a title")
            .with_description("about the clip")
            .with_tags(vec!["one".to_owned(), "two".to_owned()])
            .with_category("10");
        let job = UploadJob::from_spec(spec).unwrap();
        let body = metadata_body(&job, "22");

        assert_eq!(body["category"], "10");
        assert_eq!(body["description"], "about the clip");
        assert_eq!(body["tags"], serde_json::json!(["one", "two"]));
    }
}
