//! Job model: one media item queued for publication.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, UploadError};

/// Hard ceiling on title length, in characters. Longer titles are truncated
/// at enqueue time and the truncation is recorded on the job.
pub const MAX_TITLE_CHARS: usize = 100;

/// Privacy setting applied to the published media.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Privacy {
    /// Visible only to the owning account. Safe default.
    #[default]
    Private,
    /// Reachable by link, not listed.
    Unlisted,
    /// Publicly listed.
    Public,
}

/// Job status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum JobStatus {
    /// Job is waiting to be processed.
    Pending,
    /// Job is currently being processed.
    Processing,
    /// Job completed successfully.
    Completed,
    /// Job failed.
    Failed,
}

impl JobStatus {
    /// Terminal statuses are never reverted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status moves strictly forward: Pending -> Processing -> terminal.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

/// Terminal result of a job, populated exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// Primary upload succeeded and the remote service assigned this id.
    Succeeded { remote_id: String },
    /// Upload failed with a classified error.
    Failed { error: UploadError },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Succeeded { remote_id } => Some(remote_id),
            Self::Failed { .. } => None,
        }
    }
}

/// Caller-supplied description of one upload.
///
/// Only the source path and a non-empty title are required; everything else
/// defaults to empty/unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSpec {
    /// Path to the media file. Existence is checked at execution time, not
    /// at enqueue (enqueue does no I/O).
    pub source_path: PathBuf,
    /// Title for the published media.
    pub title: String,
    /// Optional description body.
    #[serde(default)]
    pub description: String,
    /// Optional ordered tag list.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional playlist to attach the media to after upload.
    #[serde(default)]
    pub playlist_name: Option<String>,
    /// Optional thumbnail image to attach after upload.
    #[serde(default)]
    pub thumbnail_path: Option<PathBuf>,
    /// Privacy applied on publish.
    #[serde(default)]
    pub privacy: Privacy,
    /// Optional category identifier understood by the remote service.
    #[serde(default)]
    pub category: Option<String>,
}

impl UploadSpec {
    pub fn new(source_path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_playlist(mut self, name: impl Into<String>) -> Self {
        self.playlist_name = Some(name.into());
        self
    }

    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail_path = Some(path.into());
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = privacy;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A queued upload with its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    /// Opaque unique identifier, assigned at enqueue, never reused.
    pub id: String,
    /// Path to the media file.
    pub source_path: PathBuf,
    /// Title, at most [`MAX_TITLE_CHARS`] characters.
    pub title: String,
    /// Description body, possibly empty.
    pub description: String,
    /// Ordered tag list, possibly empty.
    pub tags: Vec<String>,
    /// Playlist to attach after upload, if any.
    pub playlist_name: Option<String>,
    /// Thumbnail to attach after upload, if any.
    pub thumbnail_path: Option<PathBuf>,
    /// Privacy applied on publish.
    pub privacy: Privacy,
    /// Category identifier, if any.
    pub category: Option<String>,
    /// Lifecycle status, monotonic.
    pub status: JobStatus,
    /// Terminal result; `None` until the job completes or fails.
    pub outcome: Option<JobOutcome>,
    /// Whether the title was truncated at enqueue.
    pub title_truncated: bool,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
    /// Terminal timestamp.
    pub finished_at: Option<DateTime<Utc>>,
}

impl UploadJob {
    /// Validate a spec and build the stored job. No I/O happens here; the
    /// source file is only required to exist once the job executes.
    pub(crate) fn from_spec(spec: UploadSpec) -> Result<Self> {
        if spec.source_path.as_os_str().is_empty() {
            return Err(UploadError::validation("source path must not be empty"));
        }
        if spec.title.trim().is_empty() {
            return Err(UploadError::validation("title must not be empty"));
        }

        let id = Uuid::new_v4().to_string();
        let (title, title_truncated) = truncate_title(&spec.title);
        if title_truncated {
            warn!(
                job_id = %id,
                max_chars = MAX_TITLE_CHARS,
                "Title exceeded the maximum length and was truncated"
            );
        }

        Ok(Self {
            id,
            source_path: spec.source_path,
            title,
            description: spec.description,
            tags: spec.tags,
            playlist_name: spec.playlist_name,
            thumbnail_path: spec.thumbnail_path,
            privacy: spec.privacy,
            category: spec.category,
            status: JobStatus::Pending,
            outcome: None,
            title_truncated,
            created_at: Utc::now(),
            finished_at: None,
        })
    }

    /// Advance the lifecycle status, rejecting anything non-monotonic.
    pub(crate) fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(UploadError::invalid_transition(
                self.status.to_string(),
                next.to_string(),
            ));
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Hard-truncate to [`MAX_TITLE_CHARS`] characters (not bytes), returning
/// whether truncation happened.
fn truncate_title(title: &str) -> (String, bool) {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return (title.to_owned(), false);
    }
    (title.chars().take(MAX_TITLE_CHARS).collect(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_title_is_truncated_to_exactly_max_chars() {
        let spec = UploadSpec::new("/tmp/a.mp4", "x".repeat(250));
        let job = UploadJob::from_spec(spec).unwrap();
        assert_eq!(job.title.chars().count(), MAX_TITLE_CHARS);
        assert!(job.title_truncated);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let spec = UploadSpec::new("/tmp/a.mp4", "ü".repeat(150));
        let job = UploadJob::from_spec(spec).unwrap();
        assert_eq!(job.title.chars().count(), MAX_TITLE_CHARS);
        assert!(job.title_truncated);
    }

    #[test]
    fn short_title_is_kept_verbatim() {
        let spec = UploadSpec::new("/tmp/a.mp4", "short title");
        let job = UploadJob::from_spec(spec).unwrap();
        assert_eq!(job.title, "short title");
        assert!(!job.title_truncated);
    }

    #[test]
    fn empty_title_is_rejected() {
        let spec = UploadSpec::new("/tmp/a.mp4", "   ");
        let err = UploadJob::from_spec(spec).unwrap_err();
        assert!(matches!(err, UploadError::Validation { .. }));
    }

    #[test]
    fn empty_source_path_is_rejected() {
        let spec = UploadSpec::new("", "title");
        let err = UploadJob::from_spec(spec).unwrap_err();
        assert!(matches!(err, UploadError::Validation { .. }));
    }

    #[test]
    fn status_moves_forward_only() {
        let mut job = UploadJob::from_spec(UploadSpec::new("/tmp/a.mp4", "t")).unwrap();
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.is_terminal());
        assert!(job.finished_at.is_some());

        // Terminal states are never reverted.
        let err = job.transition(JobStatus::Processing).unwrap_err();
        assert!(matches!(err, UploadError::InvalidTransition { .. }));
        let err = job.transition(JobStatus::Failed).unwrap_err();
        assert!(matches!(err, UploadError::InvalidTransition { .. }));
    }

    #[test]
    fn pending_cannot_jump_to_terminal() {
        let mut job = UploadJob::from_spec(UploadSpec::new("/tmp/a.mp4", "t")).unwrap();
        let err = job.transition(JobStatus::Completed).unwrap_err();
        assert!(matches!(err, UploadError::InvalidTransition { .. }));
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn ids_are_unique_across_enqueues() {
        let a = UploadJob::from_spec(UploadSpec::new("/tmp/a.mp4", "a")).unwrap();
        let b = UploadJob::from_spec(UploadSpec::new("/tmp/b.mp4", "b")).unwrap();
        assert_ne!(a.id, b.id);
    }
}
