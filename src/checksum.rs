//! Streaming SHA-256 verification of artifacts.
//!
//! Files are hashed in fixed-size chunks so multi-gigabyte images never sit
//! in memory. Digests compare case-insensitively.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::DownloadError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Same as [`sha256_file`] but off the async executor.
pub async fn sha256_file_async(path: &Path) -> io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(io::Error::other)?
}

pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}

/// True iff the file exists, is readable and hashes to `expected`.
pub async fn verify(path: &Path, expected: &str) -> bool {
    match sha256_file_async(path).await {
        Ok(actual) => digests_match(&actual, expected),
        Err(e) => {
            tracing::debug!("Could not hash {}: {}", path.display(), e);
            false
        }
    }
}

/// Like [`verify`], but reports why the file was rejected.
pub async fn ensure(path: &Path, expected: &str) -> Result<(), DownloadError> {
    let actual = sha256_file_async(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    if digests_match(&actual, expected) {
        Ok(())
    } else {
        Err(DownloadError::Verification {
            path: PathBuf::from(path),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello world")
    const HELLO_SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        assert_eq!(sha256_file(&path).unwrap(), HELLO_SHA);
    }

    #[test]
    fn test_sha256_spans_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![7u8; CHUNK_SIZE * 3 + 17];
        std::fs::write(&path, &data).unwrap();

        let expected = hex::encode(Sha256::digest(&data));
        assert_eq!(sha256_file(&path).unwrap(), expected);
    }

    #[test]
    fn test_digest_comparison_ignores_case() {
        assert!(digests_match(HELLO_SHA, &HELLO_SHA.to_uppercase()));
        assert!(!digests_match(HELLO_SHA, "00"));
    }

    #[tokio::test]
    async fn test_verify_detects_single_byte_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();
        assert!(verify(&path, HELLO_SHA).await);

        std::fs::write(&path, b"hello worle").unwrap();
        assert!(!verify(&path, HELLO_SHA).await);
    }

    #[tokio::test]
    async fn test_verify_missing_file_is_false() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!verify(&dir.path().join("absent"), HELLO_SHA).await);
    }

    #[tokio::test]
    async fn test_ensure_reports_actual_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        assert!(ensure(&path, &HELLO_SHA.to_uppercase()).await.is_ok());

        match ensure(&path, "deadbeef").await {
            Err(DownloadError::Verification { expected, actual, .. }) => {
                assert_eq!(expected, "deadbeef");
                assert_eq!(actual, HELLO_SHA);
            }
            other => panic!("expected verification error, got {:?}", other),
        }
    }
}
