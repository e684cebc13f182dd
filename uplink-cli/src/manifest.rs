//! Optional JSON manifest with per-file metadata.
//!
//! The manifest is an object keyed by file path or bare file name:
//!
//! ```json
//! {
//!   "talk.mp4": { "title": "Conference talk", "tags": ["talk"], "privacy": "unlisted" }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use uplink_engine::job::Privacy;

use crate::error::{AppError, Result};

/// Metadata overrides for one file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub playlist: Option<String>,
    pub thumbnail: Option<PathBuf>,
    pub privacy: Option<Privacy>,
    pub category: Option<String>,
}

#[derive(Debug, Default)]
pub struct Manifest {
    entries: HashMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries = serde_json::from_str(&raw)
            .map_err(|err| AppError::Manifest(format!("{}: {err}", path.display())))?;
        Ok(Self { entries })
    }

    /// Entry for a file, matched by full path first, then by file name.
    pub fn entry_for(&self, file: &Path) -> Option<&ManifestEntry> {
        if let Some(entry) = self.entries.get(&file.display().to_string()) {
            return Some(entry);
        }
        file.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.entries.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, body).expect("write manifest");
        path
    }

    #[test]
    fn file_name_matches_when_the_full_path_does_not() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = write_manifest(
            &dir,
            r#"{ "talk.mp4": { "title": "Conference talk", "tags": ["talk"] } }"#,
        );

        let manifest = Manifest::load(&path).expect("load");
        let entry = manifest
            .entry_for(Path::new("/media/out/talk.mp4"))
            .expect("entry by file name");
        assert_eq!(entry.title.as_deref(), Some("Conference talk"));
        assert_eq!(entry.tags, vec!["talk"]);
        assert!(manifest.entry_for(Path::new("/media/other.mp4")).is_none());
    }

    #[test]
    fn full_path_key_wins_over_file_name_key() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = write_manifest(
            &dir,
            r#"{
                "/media/out/talk.mp4": { "title": "By path" },
                "talk.mp4": { "title": "By name" }
            }"#,
        );

        let manifest = Manifest::load(&path).expect("load");
        let entry = manifest
            .entry_for(Path::new("/media/out/talk.mp4"))
            .expect("entry");
        assert_eq!(entry.title.as_deref(), Some("By path"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = write_manifest(&dir, r#"{ "x.mp4": { "titel": "typo" } }"#);

        assert!(matches!(
            Manifest::load(&path),
            Err(AppError::Manifest(_))
        ));
    }

    #[test]
    fn privacy_values_parse_lowercase() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = write_manifest(&dir, r#"{ "x.mp4": { "privacy": "unlisted" } }"#);

        let manifest = Manifest::load(&path).expect("load");
        let entry = manifest.entry_for(Path::new("x.mp4")).expect("entry");
        assert_eq!(entry.privacy, Some(Privacy::Unlisted));
    }
}
