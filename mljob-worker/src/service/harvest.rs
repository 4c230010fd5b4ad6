//! Artifact harvest
//!
//! Uploads the regular files a job left in its output directory. A file
//! is deleted only after its upload succeeded; failed uploads stay on disk.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::repository::JobRepository;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
}

impl HarvestReport {
    pub fn summary(&self) -> String {
        if self.failed.is_empty() {
            format!("uploaded {} artifact(s)", self.uploaded.len())
        } else {
            format!(
                "uploaded {} artifact(s), {} failed",
                self.uploaded.len(),
                self.failed.len()
            )
        }
    }
}

/// Regular files directly under `dir`, sorted by name
async fn list_outputs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

pub async fn harvest(
    repo: &dyn JobRepository,
    job_id: Uuid,
    outputs_dir: &Path,
) -> std::io::Result<HarvestReport> {
    let mut report = HarvestReport::default();

    for path in list_outputs(outputs_dir).await? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        match repo.upload_artifact(job_id, &path).await {
            Ok(uploaded) => {
                info!(
                    job_id = %job_id,
                    "Uploaded artifact {} ({} bytes)",
                    uploaded.filename,
                    uploaded.size
                );
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(job_id = %job_id, "Failed to remove uploaded artifact {}: {}", name, e);
                }
                report.uploaded.push(name);
            }
            Err(e) => {
                warn!(job_id = %job_id, "Failed to upload artifact {}: {}", name, e);
                report.failed.push(name);
            }
        }
    }

    Ok(report)
}
