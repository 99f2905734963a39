//! Content fingerprints used for change detection

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use super::failures::FailureLog;
use crate::models::MediaFile;

/// Bytes hashed from the start and from the end of a file
pub const SIGNATURE_BLOCK_BYTES: u64 = 10 * 1024;

/// SHA-256 over the first and the last block of a file, lower-case hex.
///
/// Files shorter than two blocks hash overlapping bytes twice.
pub fn file_signature(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let length = file.metadata()?.len();
    let mut hasher = Sha256::new();
    let mut block = Vec::with_capacity(SIGNATURE_BLOCK_BYTES as usize);

    (&mut file).take(SIGNATURE_BLOCK_BYTES).read_to_end(&mut block)?;
    hasher.update(&block);

    block.clear();
    file.seek(SeekFrom::Start(length.saturating_sub(SIGNATURE_BLOCK_BYTES)))?;
    file.take(SIGNATURE_BLOCK_BYTES).read_to_end(&mut block)?;
    hasher.update(&block);

    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect())
}

/// Fill in the signature of every file in parallel.
///
/// Unreadable files keep an empty signature and are recorded as failures.
pub fn calculate_signatures(files: &mut [MediaFile], failures: &FailureLog) {
    files.par_iter_mut().for_each(|file| match file_signature(&file.full_path) {
        Ok(signature) => file.signature = signature,
        Err(e) => {
            file.signature.clear();
            failures.append(format!("Can't read {}: {}", file.full_path.display(), e));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_signature_of_small_file_hashes_content_twice() {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "a.jpg", b"abc");

        let mut hasher = Sha256::new();
        hasher.update(b"abc");
        hasher.update(b"abc");
        let expected: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();

        assert_eq!(file_signature(&path).unwrap(), expected);
    }

    #[test]
    fn test_signature_ignores_middle_of_large_file() {
        let dir = tempdir().unwrap();
        let mut original = vec![1u8; 64 * 1024];
        let first = write_file(dir.path(), "a.jpg", &original);
        original[32 * 1024] = 2;
        let middle_changed = write_file(dir.path(), "b.jpg", &original);
        original[10] = 3;
        let head_changed = write_file(dir.path(), "c.jpg", &original);

        let a = file_signature(&first).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, file_signature(&middle_changed).unwrap());
        assert_ne!(a, file_signature(&head_changed).unwrap());
    }

    #[test]
    fn test_unreadable_file_recorded() {
        let dir = tempdir().unwrap();
        let readable = write_file(dir.path(), "a.jpg", b"data");
        let mut files = vec![
            MediaFile::new(&readable, "1\\a.jpg", 4),
            MediaFile::new(dir.path().join("missing.jpg"), "1\\missing.jpg", 4),
        ];
        let failures = FailureLog::new();

        calculate_signatures(&mut files, &failures);

        assert!(!files[0].signature.is_empty());
        assert!(files[1].signature.is_empty());
        let recorded = failures.drain();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("Can't read"));
    }
}
