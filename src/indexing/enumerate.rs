//! Discover media files below an alias root, grouped per folder

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::error::{IndexingError, IndexingResult};
use super::failures::FailureLog;
use super::statistics::Statistics;
use crate::models::{aliased_path, MediaFile};

/// Extensions (upper-cased) that are indexed
pub const SUPPORTED_EXTENSIONS: &[&str] = &["JPEG", "JPG", "M4V", "MP4", "PNG"];

/// Media files directly inside one folder
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFolder {
    pub path: PathBuf,
    pub files: Vec<MediaFile>,
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_uppercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Walk `root` depth first in sorted order.
///
/// Hidden entries below the root are skipped. Folders without media are
/// omitted; unreadable entries are recorded as failures and skipped.
pub fn enumerate_media(
    root: &Path,
    alias: &str,
    statistics: &Statistics,
    failures: &FailureLog,
) -> IndexingResult<Vec<MediaFolder>> {
    if !root.is_dir() {
        return Err(IndexingError::FolderNotFound(root.display().to_string()));
    }

    let mut folders: BTreeMap<PathBuf, Vec<MediaFile>> = BTreeMap::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let at = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                failures.append(format!("Enumerator failed at {}: {}", at, e));
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if entry.depth() > 0 {
                statistics.add_folders(1);
            }
            continue;
        }
        if !entry.file_type().is_file() || !is_supported(entry.path()) {
            continue;
        }

        let length = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                failures.append(format!("Enumerator failed at {}: {}", entry.path().display(), e));
                continue;
            }
        };
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or_else(|_| entry.path())
            .to_string_lossy()
            .into_owned();
        let parent = entry.path().parent().unwrap_or(root).to_path_buf();

        folders
            .entry(parent)
            .or_default()
            .push(MediaFile::new(entry.path(), aliased_path(alias, &relative), length));
    }

    let folders: Vec<MediaFolder> = folders
        .into_iter()
        .map(|(path, files)| MediaFolder { path, files })
        .collect();
    let file_count: usize = folders.iter().map(|folder| folder.files.len()).sum();
    statistics.add_files(file_count as u64);
    debug!(root = %root.display(), folders = folders.len(), files = file_count, "Enumerated media");

    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_groups_per_folder_and_filters() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("2016/beach")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("a.JPG"), b"a").unwrap();
        fs::write(root.join("notes.txt"), b"n").unwrap();
        fs::write(root.join(".secret.jpg"), b"s").unwrap();
        fs::write(root.join("2016/beach/b.jpeg"), b"bb").unwrap();
        fs::write(root.join("2016/beach/clip.mp4"), b"ccc").unwrap();
        fs::write(root.join(".hidden/c.jpg"), b"c").unwrap();

        let stats = Statistics::new(0);
        let failures = FailureLog::new();
        let folders = enumerate_media(root, "1", &stats, &failures).unwrap();

        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].path, root);
        assert_eq!(folders[0].files.len(), 1);
        assert_eq!(folders[0].files[0].aliased_path, "1\\a.JPG");

        let beach: Vec<_> = folders[1].files.iter().map(|f| f.aliased_path.as_str()).collect();
        assert_eq!(beach, vec!["1\\2016\\beach\\b.jpeg", "1\\2016\\beach\\clip.mp4"]);
        assert_eq!(folders[1].files[1].length, 3);

        assert_eq!(stats.snapshot().files, 3);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let result = enumerate_media(
            &dir.path().join("nope"),
            "1",
            &Statistics::new(0),
            &FailureLog::new(),
        );
        assert!(matches!(result, Err(IndexingError::FolderNotFound(_))));
    }
}
