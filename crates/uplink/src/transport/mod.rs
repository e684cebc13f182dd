//! Upload-transport collaborator interface.
//!
//! The executor owns chunking and retries; the transport owns the wire
//! protocol. Errors crossing this seam are already classified
//! (transient / quota / auth / rejection), which is what the retry drivers
//! and the batch loop act on.

mod http;

pub use http::{HttpTransport, classify_reqwest_error};

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::job::UploadJob;

/// Outcome of sending one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    /// The remote accepted the range and expects more.
    InProgress {
        /// Bytes the remote has confirmed so far.
        committed: u64,
    },
    /// Final chunk accepted; the media is fully stored remotely.
    Complete {
        /// Identifier assigned by the remote service.
        remote_id: String,
    },
}

/// One playlist from the paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub id: String,
    pub name: String,
}

/// A page of the playlist listing.
#[derive(Debug, Clone, Default)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistEntry>,
    /// Token for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// An open resumable upload session.
///
/// The session was sized to the full media at open time; callers feed chunks
/// in file order and may resend the same chunk after a transient failure.
#[async_trait]
pub trait UploadSession: Send {
    /// Send the chunk starting at byte `offset` of a `total`-byte media.
    async fn send_chunk(&mut self, offset: u64, chunk: &[u8], total: u64) -> Result<ChunkStatus>;
}

/// Remote-API collaborator used by the transport executor and the
/// post-upload pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Open a resumable session sized to `total_bytes`, carrying the job's
    /// metadata (at minimum title and category; description and tags only
    /// when non-empty).
    async fn open_session(
        &self,
        job: &UploadJob,
        total_bytes: u64,
    ) -> Result<Box<dyn UploadSession>>;

    /// Attach a thumbnail image to an already-uploaded media item.
    async fn set_thumbnail(&self, remote_id: &str, image: &Path) -> Result<()>;

    /// Fetch one page of the playlist listing.
    async fn list_playlists(&self, page_token: Option<String>) -> Result<PlaylistPage>;

    /// Insert an uploaded media item into a playlist.
    async fn add_to_playlist(&self, playlist_id: &str, remote_id: &str) -> Result<()>;
}
