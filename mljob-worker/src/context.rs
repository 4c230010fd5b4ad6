//! Per-job workspace
//!
//! Scratch space for one job: the downloaded archive, the extracted build
//! context, and the output directory mounted into the container. Scratch
//! space is a `TempDir` and disappears when the workspace is dropped.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

pub struct JobWorkspace {
    scratch: TempDir,
    outputs_dir: PathBuf,
}

impl JobWorkspace {
    /// Creates `job_{id}_*` under `work_root` and `{outputs_root}/job-{id}`
    pub fn create(job_id: Uuid, work_root: &Path, outputs_root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(work_root)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job_{}_", job_id))
            .tempdir_in(work_root)?;

        std::fs::create_dir_all(scratch.path().join("context"))?;

        // Docker bind mounts need an absolute host path
        let outputs_root = std::path::absolute(outputs_root)?;
        let outputs_dir = outputs_root.join(format!("job-{}", job_id));
        std::fs::create_dir_all(&outputs_dir)?;

        debug!(
            job_id = %job_id,
            "Workspace at {}, outputs at {}",
            scratch.path().display(),
            outputs_dir.display()
        );

        Ok(Self {
            scratch,
            outputs_dir,
        })
    }

    /// Where the bundle is downloaded
    pub fn zip_path(&self) -> PathBuf {
        self.scratch.path().join("bundle.zip")
    }

    /// Extracted bundle, used as the image build context
    pub fn context_dir(&self) -> PathBuf {
        self.scratch.path().join("context")
    }

    /// Host side of the container's output mount
    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    /// Removes the scratch space, and the output directory when nothing
    /// was left behind in it
    pub fn cleanup(self) -> std::io::Result<()> {
        let is_empty = std::fs::read_dir(&self.outputs_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            std::fs::remove_dir(&self.outputs_dir)?;
        }

        self.scratch.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_layout() {
        let root = tempfile::tempdir().unwrap();
        let job_id = Uuid::new_v4();

        let ws = JobWorkspace::create(job_id, &root.path().join("work"), &root.path().join("out"))
            .unwrap();

        assert!(ws.context_dir().is_dir());
        assert!(ws.outputs_dir().is_dir());
        assert!(ws.outputs_dir().is_absolute());
        assert!(ws.outputs_dir().ends_with(format!("job-{}", job_id)));
        assert!(ws.zip_path().starts_with(root.path().join("work")));
    }

    #[test]
    fn test_cleanup_keeps_unharvested_outputs() {
        let root = tempfile::tempdir().unwrap();

        let ws = JobWorkspace::create(Uuid::new_v4(), root.path(), &root.path().join("out"))
            .unwrap();
        let scratch = ws.context_dir();
        let outputs = ws.outputs_dir().to_path_buf();
        std::fs::write(outputs.join("model.pt"), "w").unwrap();

        ws.cleanup().unwrap();
        assert!(!scratch.exists());
        assert!(outputs.join("model.pt").exists());
    }

    #[test]
    fn test_cleanup_removes_empty_outputs() {
        let root = tempfile::tempdir().unwrap();

        let ws = JobWorkspace::create(Uuid::new_v4(), root.path(), &root.path().join("out"))
            .unwrap();
        let outputs = ws.outputs_dir().to_path_buf();

        ws.cleanup().unwrap();
        assert!(!outputs.exists());
    }
}
