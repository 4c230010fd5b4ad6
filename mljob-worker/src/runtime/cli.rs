//! Docker-compatible CLI backend
//!
//! Shells out to `docker` (or `podman`, or anything speaking the same
//! command line) through `tokio::process`.

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::{BuildOutput, ContainerHandle, ContainerRuntime, LogStream, RunSpec, RuntimeError};

pub struct DockerCliRuntime {
    binary: String,
}

impl DockerCliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.kill_on_drop(true);
        command
    }

    /// Arguments for `create`; the container is started separately so a
    /// failed start still leaves an id to remove
    fn create_args(&self, image: &str, spec: &RunSpec) -> Vec<String> {
        let mut args = vec!["create".to_string()];

        if let Some(name) = &spec.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        for pair in spec.env_pairs() {
            args.push("-e".to_string());
            args.push(pair);
        }
        if let Some(network) = &spec.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for bind in &spec.binds {
            args.push("-v".to_string());
            args.push(bind.to_bind());
        }

        args.push(image.to_string());
        args.extend(spec.command.iter().cloned());
        args
    }
}

fn failure(output: &Output) -> String {
    format!(
        "exit_code={}, stderr='{}'",
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stderr).trim()
    )
}

/// Lines of `reader`; invalid UTF-8 is replaced instead of ending the stream
fn byte_lines<R>(reader: R) -> impl Stream<Item = std::io::Result<String>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    futures_util::stream::unfold(Some(BufReader::new(reader)), |state| async move {
        let mut reader = state?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                Some((Ok(line), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

fn output_lines(stdout: &[u8], stderr: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .chain(String::from_utf8_lossy(stderr).lines())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn probe(&self) -> Result<String, RuntimeError> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "failed to execute '{} --version': {}",
                    self.binary, e
                ))
            })?;

        if !output.status.success() {
            return Err(RuntimeError::Unavailable(format!(
                "'{} --version' exited with {}",
                self.binary, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn build(&self, context_dir: &Path, tag: &str) -> Result<BuildOutput, RuntimeError> {
        debug!("Building {} in {}", tag, context_dir.display());

        let output = self
            .command()
            .args(["build", "-t", tag, "."])
            .current_dir(context_dir)
            .output()
            .await?;

        let lines = output_lines(&output.stdout, &output.stderr);

        if !output.status.success() {
            return Err(RuntimeError::Build {
                reason: format!("{} build exited with {}", self.binary, output.status),
                output: lines,
            });
        }

        Ok(BuildOutput {
            image: tag.to_string(),
            output_lines: lines,
        })
    }

    async fn run(&self, image: &str, spec: &RunSpec) -> Result<ContainerHandle, RuntimeError> {
        let output = self
            .command()
            .args(self.create_args(image, spec))
            .output()
            .await?;

        if !output.status.success() {
            return Err(RuntimeError::Run(failure(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = stdout.trim().lines().last().unwrap_or_default().to_string();
        if id.is_empty() {
            return Err(RuntimeError::Run(format!(
                "{} create printed no container id",
                self.binary
            )));
        }
        let handle = ContainerHandle { id };

        let reason = match self.command().args(["start", &handle.id]).output().await {
            Ok(output) if output.status.success() => return Ok(handle),
            Ok(output) => failure(&output),
            Err(e) => e.to_string(),
        };

        if let Err(e) = self.remove(&handle).await {
            warn!("Failed to remove container {}: {}", handle.short_id(), e);
        }
        Err(RuntimeError::Run(reason))
    }

    async fn stream_logs(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError> {
        let mut child = self
            .command()
            .args(["logs", "-f", &handle.id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Logs("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::Logs("stderr not captured".to_string()))?;

        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(async move {
            let mut merged = futures_util::stream::select(
                byte_lines(stdout).boxed(),
                byte_lines(stderr).boxed(),
            );

            while let Some(line) = merged.next().await {
                if tx.send(line.map_err(RuntimeError::from)).await.is_err() {
                    break;
                }
            }

            if let Err(e) = child.wait().await {
                warn!("Failed to reap log follower: {}", e);
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError> {
        let output = self.command().args(["wait", &handle.id]).output().await?;

        if !output.status.success() {
            return Err(RuntimeError::Container(format!(
                "wait failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<i64>().map_err(|_| {
            RuntimeError::Container(format!("unexpected wait output '{}'", stdout.trim()))
        })
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let output = self.command().args(["stop", &handle.id]).output().await?;

        if !output.status.success() {
            return Err(RuntimeError::Container(format!(
                "stop failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let output = self.command().args(["rm", "-f", &handle.id]).output().await?;

        if !output.status.success() {
            return Err(RuntimeError::Container(format!(
                "rm failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    use super::*;
    use crate::runtime::VolumeBinding;

    const CONTAINER_ID: &str = "c0ffee0123456789";

    /// Writes a stand-in for the docker binary that appends its arguments
    /// to `calls` and answers the subcommands the backend uses
    fn fake_docker(dir: &Path, start_fails: bool) -> (PathBuf, PathBuf) {
        let calls = dir.join("calls");
        let start = if start_fails {
            "echo 'error mounting /app/outputs' >&2; exit 1"
        } else {
            ":"
        };
        let script = format!(
            "#!/bin/sh\n\
             echo \"$*\" >> '{calls}'\n\
             case \"$1\" in\n\
             create) echo {id} ;;\n\
             start) {start} ;;\n\
             logs) printf 'epoch 1\\n\\377\\nepoch 3\\n' ;;\n\
             esac\n",
            calls = calls.display(),
            id = CONTAINER_ID,
            start = start,
        );

        let binary = dir.join("docker");
        std::fs::write(&binary, script).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        (binary, calls)
    }

    fn recorded(calls: &Path) -> Vec<String> {
        std::fs::read_to_string(calls)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_create_args() {
        let runtime = DockerCliRuntime::new("podman");
        let mut spec = RunSpec {
            name: Some("mljob-1".to_string()),
            network: Some("none".to_string()),
            binds: vec![VolumeBinding::new("/out/job-1", "/app/outputs")],
            ..Default::default()
        };
        spec.env.insert("EPOCHS".to_string(), "3".to_string());

        assert_eq!(
            runtime.create_args("mljob-1:latest", &spec),
            vec![
                "create",
                "--name",
                "mljob-1",
                "-e",
                "EPOCHS=3",
                "--network",
                "none",
                "-v",
                "/out/job-1:/app/outputs",
                "mljob-1:latest",
            ]
        );
    }

    #[test]
    fn test_output_lines_merges_streams() {
        let lines = output_lines(b"Step 1/4\nStep 2/4\n", b"warning: cache\n");
        assert_eq!(lines, vec!["Step 1/4", "Step 2/4", "warning: cache"]);
    }

    #[tokio::test]
    async fn test_probe_missing_binary_is_unavailable() {
        let runtime = DockerCliRuntime::new("definitely-not-a-container-runtime");
        let err = runtime.probe().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_run_creates_then_starts() {
        let dir = tempfile::tempdir().unwrap();
        let (binary, calls) = fake_docker(dir.path(), false);
        let runtime = DockerCliRuntime::new(binary.display().to_string());

        let handle = runtime
            .run("mljob-1:latest", &RunSpec::default())
            .await
            .unwrap();

        assert_eq!(handle.id, CONTAINER_ID);
        assert_eq!(
            recorded(&calls),
            vec![
                "create mljob-1:latest".to_string(),
                format!("start {}", CONTAINER_ID),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_start_removes_container() {
        let dir = tempfile::tempdir().unwrap();
        let (binary, calls) = fake_docker(dir.path(), true);
        let runtime = DockerCliRuntime::new(binary.display().to_string());

        let err = runtime
            .run("mljob-1:latest", &RunSpec::default())
            .await
            .unwrap_err();

        assert!(matches!(&err, RuntimeError::Run(reason) if reason.contains("error mounting")));
        assert_eq!(
            recorded(&calls).last().cloned(),
            Some(format!("rm -f {}", CONTAINER_ID))
        );
    }

    #[tokio::test]
    async fn test_logs_survive_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let (binary, _) = fake_docker(dir.path(), false);
        let runtime = DockerCliRuntime::new(binary.display().to_string());
        let handle = ContainerHandle {
            id: CONTAINER_ID.to_string(),
        };

        let lines: Vec<String> = runtime
            .stream_logs(&handle)
            .await
            .unwrap()
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["epoch 1", "\u{FFFD}", "epoch 3"]);
    }
}
