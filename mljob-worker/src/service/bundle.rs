//! Bundle pipeline
//!
//! Fetches a job archive, unpacks it safely and makes sure the build
//! context has a Dockerfile.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use mljob_client::ClientError;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::repository::JobRepository;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle download failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: ClientError,
    },

    #[error("corrupt bundle archive: {0}")]
    Corrupt(#[from] zip::result::ZipError),

    #[error("bundle entry '{0}' escapes the extraction directory")]
    PathTraversal(String),

    #[error("main entry '{0}' not found in bundle")]
    MissingEntry(String),

    #[error("bundle I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Downloads the bundle to `dest`, retrying `retries` extra times
pub async fn fetch(
    repo: &dyn JobRepository,
    job_id: Uuid,
    dest: &Path,
    retries: u32,
    delay: Duration,
) -> Result<u64, BundleError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match repo.download_bundle(job_id, dest).await {
            Ok(bytes) => {
                debug!(job_id = %job_id, "Downloaded bundle ({} bytes)", bytes);
                return Ok(bytes);
            }
            // Retrying cannot fix a missing bundle or a bad token
            Err(e) if attempt > retries || e.is_client_error() => {
                return Err(BundleError::Fetch {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    "Bundle download failed (attempt {}/{}): {}",
                    attempt,
                    retries + 1,
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Unpacks `zip_path` into `dest_dir` on a blocking thread
pub async fn extract(zip_path: &Path, dest_dir: &Path) -> Result<usize, BundleError> {
    let zip_path = zip_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || extract_sync(&zip_path, &dest_dir))
        .await
        .map_err(|e| BundleError::Io(io::Error::other(e)))?
}

/// Every entry is checked before anything is written, so a rejected
/// archive leaves `dest_dir` untouched.
fn extract_sync(zip_path: &Path, dest_dir: &Path) -> Result<usize, BundleError> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path)?)?;

    let mut targets: Vec<Option<PathBuf>> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let relative = safe_relative_path(entry.name())
            .ok_or_else(|| BundleError::PathTraversal(entry.name().to_string()))?;
        targets.push((!relative.as_os_str().is_empty()).then_some(relative));
    }

    std::fs::create_dir_all(dest_dir)?;

    let mut written = 0;
    for (index, target) in targets.into_iter().enumerate() {
        let Some(relative) = target else {
            continue;
        };
        let mut entry = archive.by_index(index)?;
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    Ok(written)
}

/// Normalizes an archive entry name, refusing absolute paths and any
/// `..` that climbs above the root
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(parts.iter().collect())
}

/// Inputs for a synthesized Dockerfile
#[derive(Debug, Clone)]
pub struct DockerfileSpec<'a> {
    pub base_image: &'a str,
    pub main_entry: &'a str,
    pub requirements_file: &'a str,
    pub entry_command: &'a [String],
}

/// What `ensure_dockerfile` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerfileSource {
    /// The bundle shipped its own
    Bundled,
    Generated { installs_requirements: bool },
}

/// Keeps a bundled Dockerfile, or writes one for a Python entry point
pub async fn ensure_dockerfile(
    dir: &Path,
    spec: &DockerfileSpec<'_>,
) -> Result<DockerfileSource, BundleError> {
    let dockerfile = dir.join("Dockerfile");
    if tokio::fs::try_exists(&dockerfile).await? {
        return Ok(DockerfileSource::Bundled);
    }

    if !tokio::fs::try_exists(dir.join(spec.main_entry)).await? {
        return Err(BundleError::MissingEntry(spec.main_entry.to_string()));
    }

    let installs_requirements = tokio::fs::try_exists(dir.join(spec.requirements_file)).await?;
    tokio::fs::write(&dockerfile, render_dockerfile(spec, installs_requirements)).await?;

    Ok(DockerfileSource::Generated {
        installs_requirements,
    })
}

fn render_dockerfile(spec: &DockerfileSpec<'_>, installs_requirements: bool) -> String {
    let mut lines = vec![
        format!("FROM {}", spec.base_image),
        "WORKDIR /app".to_string(),
        "COPY . /app".to_string(),
    ];

    if installs_requirements {
        lines.push(format!(
            "RUN pip install --no-cache-dir -r {}",
            spec.requirements_file
        ));
    }

    let cmd: Vec<String> = spec
        .entry_command
        .iter()
        .map(String::as_str)
        .chain([spec.main_entry])
        .map(|part| format!("\"{}\"", part.replace('"', "\\\"")))
        .collect();
    lines.push(format!("CMD [{}]", cmd.join(", ")));

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn python_spec<'a>(entry_command: &'a [String]) -> DockerfileSpec<'a> {
        DockerfileSpec {
            base_image: "python:3.8",
            main_entry: "main.py",
            requirements_file: "requirements.txt",
            entry_command,
        }
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(
            safe_relative_path("src/train.py"),
            Some(PathBuf::from("src/train.py"))
        );
        assert_eq!(
            safe_relative_path("./a/../b.txt"),
            Some(PathBuf::from("b.txt"))
        );
        assert_eq!(safe_relative_path("../../etc/passwd"), None);
        assert_eq!(safe_relative_path("/etc/passwd"), None);
        assert_eq!(safe_relative_path("a\\..\\..\\x"), None);
    }

    #[tokio::test]
    async fn test_extract_writes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("job.zip");
        write_zip(
            &zip_path,
            &[("main.py", "print('hi')\n"), ("data/train.csv", "x,y\n")],
        );

        let dest = dir.path().join("ctx");
        let written = extract(&zip_path, &dest).await.unwrap();

        assert_eq!(written, 2);
        assert!(dest.join("main.py").exists());
        assert_eq!(
            std::fs::read_to_string(dest.join("data/train.csv")).unwrap(),
            "x,y\n"
        );
    }

    #[tokio::test]
    async fn test_extract_rejects_traversal_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        write_zip(
            &zip_path,
            &[("main.py", "print('hi')\n"), ("../../etc/passwd", "root")],
        );

        let dest = dir.path().join("ctx");
        let err = extract(&zip_path, &dest).await.unwrap_err();

        assert!(matches!(err, BundleError::PathTraversal(name) if name == "../../etc/passwd"));
        assert!(!dest.join("main.py").exists());
    }

    #[tokio::test]
    async fn test_extract_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bad.zip");
        std::fs::write(&zip_path, b"not a zip").unwrap();

        let err = extract(&zip_path, &dir.path().join("ctx")).await.unwrap_err();
        assert!(matches!(err, BundleError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_generated_dockerfile_without_requirements() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print(1)\n").unwrap();
        let command = vec!["python".to_string()];

        let source = ensure_dockerfile(dir.path(), &python_spec(&command))
            .await
            .unwrap();
        assert_eq!(
            source,
            DockerfileSource::Generated {
                installs_requirements: false
            }
        );

        let dockerfile = std::fs::read_to_string(dir.path().join("Dockerfile")).unwrap();
        assert_eq!(
            dockerfile,
            "FROM python:3.8\nWORKDIR /app\nCOPY . /app\nCMD [\"python\", \"main.py\"]\n"
        );
    }

    #[tokio::test]
    async fn test_generated_dockerfile_installs_requirements() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "print(1)\n").unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "numpy\n").unwrap();
        let command = vec!["python".to_string(), "-u".to_string()];

        ensure_dockerfile(dir.path(), &python_spec(&command))
            .await
            .unwrap();

        let dockerfile = std::fs::read_to_string(dir.path().join("Dockerfile")).unwrap();
        assert!(dockerfile.contains("RUN pip install --no-cache-dir -r requirements.txt\n"));
        assert!(dockerfile.ends_with("CMD [\"python\", \"-u\", \"main.py\"]\n"));
    }

    #[tokio::test]
    async fn test_bundled_dockerfile_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let command = vec!["python".to_string()];

        let source = ensure_dockerfile(dir.path(), &python_spec(&command))
            .await
            .unwrap();

        assert_eq!(source, DockerfileSource::Bundled);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Dockerfile")).unwrap(),
            "FROM scratch\n"
        );
    }

    #[tokio::test]
    async fn test_missing_entry_without_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        let command = vec!["python".to_string()];

        let err = ensure_dockerfile(dir.path(), &python_spec(&command))
            .await
            .unwrap_err();

        assert!(matches!(err, BundleError::MissingEntry(entry) if entry == "main.py"));
        assert!(!dir.path().join("Dockerfile").exists());
    }
}
