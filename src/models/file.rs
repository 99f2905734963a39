use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Outcome of comparing a file against the stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FileStatus {
    /// Not checked yet
    Pending,
    /// No stored document for this path
    New,
    /// Stored signature differs
    Changed,
    /// Stored signature matches
    Unchanged,
}

impl FileStatus {
    /// Whether the file must go through preparation and indexing
    pub fn needs_indexing(&self) -> bool {
        matches!(self, FileStatus::New | FileStatus::Changed | FileStatus::Pending)
    }
}

/// A candidate file discovered on disk
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    /// Absolute location on disk
    pub full_path: PathBuf,

    /// Alias-prefixed id used as the document id
    pub aliased_path: String,

    pub length: u64,

    /// Empty when the file could not be read
    pub signature: String,

    pub status: FileStatus,

    pub has_azure_tags: bool,

    pub has_clarifai_tags: bool,
}

impl MediaFile {
    pub fn new(full_path: impl Into<PathBuf>, aliased_path: impl Into<String>, length: u64) -> Self {
        Self {
            full_path: full_path.into(),
            aliased_path: aliased_path.into(),
            length,
            signature: String::new(),
            status: FileStatus::Pending,
            has_azure_tags: false,
            has_clarifai_tags: false,
        }
    }

    /// An unreadable file never compares equal, so it is always re-indexed
    pub fn signature_matches(&self, stored: Option<&str>) -> bool {
        match stored {
            Some(stored) => !self.signature.is_empty() && stored == self.signature,
            None => false,
        }
    }

    /// True when at least one provider has not tagged the document yet
    pub fn needs_tags(&self) -> bool {
        !self.has_azure_tags || !self.has_clarifai_tags
    }

    pub fn is_video(&self) -> bool {
        self.full_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "mp4" | "m4v"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matches_requires_equal_non_empty() {
        let mut file = MediaFile::new("/photos/a.jpg", "1\\a.jpg", 10);
        assert!(!file.signature_matches(Some("")));

        file.signature = "abc".into();
        assert!(file.signature_matches(Some("abc")));
        assert!(!file.signature_matches(Some("abd")));
        assert!(!file.signature_matches(None));
    }

    #[test]
    fn test_is_video_by_extension() {
        assert!(MediaFile::new("/v/clip.MP4", "1\\clip.MP4", 1).is_video());
        assert!(MediaFile::new("/v/clip.m4v", "1\\clip.m4v", 1).is_video());
        assert!(!MediaFile::new("/v/pic.jpg", "1\\pic.jpg", 1).is_video());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(FileStatus::Unchanged.to_string(), "unchanged");
        assert!(!FileStatus::Unchanged.needs_indexing());
        assert!(FileStatus::Changed.needs_indexing());
    }
}
