//! Turn candidate files into media documents

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use super::error::IndexingResult;
use crate::models::{MediaDocument, MediaFile};

/// Builds the documents for the files of one folder.
///
/// Problems with a single file become document warnings; an error fails the
/// whole folder.
#[async_trait]
pub trait MediaPreparer: Send + Sync {
    async fn prepare(&self, folder: &Path, files: &[MediaFile]) -> IndexingResult<Vec<MediaDocument>>;
}

/// MIME type derived from the file extension
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "mp4" => Some("video/mp4"),
        "m4v" => Some("video/x-m4v"),
        _ => None,
    }
}

/// Preparer using filesystem metadata only; the capture date falls back to
/// the modification time
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMetadataPreparer;

#[async_trait]
impl MediaPreparer for FileMetadataPreparer {
    async fn prepare(&self, _folder: &Path, files: &[MediaFile]) -> IndexingResult<Vec<MediaDocument>> {
        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            let mut media = MediaDocument::new(&file.aliased_path, &file.signature);
            media.filename = file
                .full_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            media.length_in_bytes = Some(file.length);
            media.mime_type = mime_type_for(&file.full_path).map(str::to_string);

            match tokio::fs::metadata(&file.full_path).await.and_then(|m| m.modified()) {
                Ok(modified) => {
                    let local: DateTime<Local> = modified.into();
                    media.set_date_time(local.naive_local());
                }
                Err(e) => media.warn(format!("No modification time: {}", e)),
            }
            if media.mime_type.is_none() {
                media.warn("Unknown media type");
            }

            documents.push(media);
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(mime_type_for(Path::new("a.m4v")), Some("video/x-m4v"));
        assert_eq!(mime_type_for(Path::new("a.gif")), None);
    }

    #[tokio::test]
    async fn test_prepare_fills_file_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beach.jpg");
        std::fs::write(&path, b"jpeg").unwrap();
        let mut file = MediaFile::new(&path, "1\\beach.jpg", 4);
        file.signature = "abc".into();

        let docs = FileMetadataPreparer.prepare(dir.path(), &[file]).await.unwrap();
        let media = &docs[0];
        assert_eq!(media.path, "1\\beach.jpg");
        assert_eq!(media.signature, "abc");
        assert_eq!(media.filename.as_deref(), Some("beach.jpg"));
        assert_eq!(media.length_in_bytes, Some(4));
        assert_eq!(media.mime_type.as_deref(), Some("image/jpeg"));
        assert!(media.date_time.is_some());
        assert!(media.day_of_year.is_some());
        assert!(media.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_becomes_warning() {
        let file = MediaFile::new("/nowhere/x.png", "1\\x.png", 1);
        let docs = FileMetadataPreparer.prepare(Path::new("/nowhere"), &[file]).await.unwrap();
        assert_eq!(docs[0].warnings.len(), 1);
        assert!(docs[0].date_time.is_none());
    }
}
