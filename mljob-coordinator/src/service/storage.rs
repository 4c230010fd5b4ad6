//! File Storage
//!
//! Job archives and uploaded artifacts live on the local filesystem.
//! Bundles are stored as `{bundles_dir}/{job_id}.zip`; artifacts as
//! `{artifacts_dir}/{job_id}/{filename}`.

use std::io;
use std::path::{Path, PathBuf};

use mljob_core::dto::artifact::UploadedArtifact;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileStorage {
    bundles_dir: PathBuf,
    artifacts_dir: PathBuf,
}

impl FileStorage {
    pub fn new(bundles_dir: impl Into<PathBuf>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundles_dir: bundles_dir.into(),
            artifacts_dir: artifacts_dir.into(),
        }
    }

    /// Create the storage directories
    pub async fn init(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.bundles_dir).await?;
        tokio::fs::create_dir_all(&self.artifacts_dir).await
    }

    /// Store a job archive and return its bundle reference
    pub async fn save_bundle(&self, job_id: Uuid, data: &[u8]) -> io::Result<String> {
        let reference = format!("{}.zip", job_id);
        tokio::fs::create_dir_all(&self.bundles_dir).await?;
        tokio::fs::write(self.bundles_dir.join(&reference), data).await?;
        Ok(reference)
    }

    /// Read a stored archive back
    pub async fn read_bundle(&self, reference: &str) -> io::Result<Vec<u8>> {
        if sanitize_filename(reference).as_deref() != Some(reference) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid bundle reference: {}", reference),
            ));
        }
        tokio::fs::read(self.bundles_dir.join(reference)).await
    }

    /// Store an artifact under an already sanitized file name
    pub async fn save_artifact(
        &self,
        job_id: Uuid,
        filename: &str,
        data: &[u8],
    ) -> io::Result<UploadedArtifact> {
        let dir = self.artifacts_dir.join(job_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(filename), data).await?;

        Ok(UploadedArtifact {
            filename: filename.to_string(),
            size: data.len() as u64,
        })
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }
}

/// Reduce a client supplied name to a safe single path component
///
/// Directory parts are dropped, characters outside `[A-Za-z0-9._-]` become
/// `_`, and leading dots are stripped. Returns `None` when nothing usable
/// is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = last
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("model.pt").as_deref(), Some("model.pt"));
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\runs\\my model.bin").as_deref(),
            Some("my_model.bin")
        );
        assert_eq!(sanitize_filename(".hidden").as_deref(), Some("hidden"));
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[tokio::test]
    async fn test_bundle_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path().join("b"), tmp.path().join("a"));
        storage.init().await.unwrap();

        let job_id = Uuid::new_v4();
        let reference = storage.save_bundle(job_id, b"PK").await.unwrap();
        assert_eq!(reference, format!("{}.zip", job_id));
        assert_eq!(storage.read_bundle(&reference).await.unwrap(), b"PK");
    }

    #[tokio::test]
    async fn test_read_bundle_rejects_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path().join("b"), tmp.path().join("a"));

        let err = storage.read_bundle("../secret.zip").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_save_artifact_under_job_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(tmp.path().join("b"), tmp.path().join("a"));
        let job_id = Uuid::new_v4();

        let uploaded = storage
            .save_artifact(job_id, "weights.bin", b"1234")
            .await
            .unwrap();
        assert_eq!(uploaded.size, 4);
        assert!(
            storage
                .artifacts_dir()
                .join(job_id.to_string())
                .join("weights.bin")
                .exists()
        );
    }
}
