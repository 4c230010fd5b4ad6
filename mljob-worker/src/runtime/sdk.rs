//! Docker Engine API backend (bollard)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    BuildImageOptionsBuilder, CreateContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::{
    BuildOutput, ContainerHandle, ContainerRuntime, LineBuffer, LogStream, RunSpec, RuntimeError,
};

pub struct DockerSdkRuntime {
    docker: Docker,
}

impl DockerSdkRuntime {
    /// Connects through the platform default socket (or `DOCKER_HOST`)
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }
}

/// Packs a build context directory into an uncompressed tar
fn tar_context(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    builder.into_inner()
}

#[async_trait]
impl ContainerRuntime for DockerSdkRuntime {
    fn name(&self) -> &'static str {
        "sdk"
    }

    async fn probe(&self) -> Result<String, RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        let version = self
            .docker
            .version()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        Ok(format!(
            "Docker Engine {}",
            version.version.unwrap_or_else(|| "unknown".to_string())
        ))
    }

    async fn build(&self, context_dir: &Path, tag: &str) -> Result<BuildOutput, RuntimeError> {
        let dir: PathBuf = context_dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || tar_context(&dir))
            .await
            .map_err(|e| RuntimeError::Build {
                reason: format!("failed to pack build context: {}", e),
                output: Vec::new(),
            })??;

        debug!("Build context for {} is {} bytes", tag, archive.len());

        let options = BuildImageOptionsBuilder::default()
            .dockerfile("Dockerfile")
            .t(tag)
            .rm(true)
            .build();

        let mut stream =
            self.docker
                .build_image(options, None, Some(bollard::body_full(Bytes::from(archive))));

        let mut buffer = LineBuffer::default();
        let mut output = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(text) = info.stream {
                        output.extend(buffer.push(&text));
                    }
                }
                Err(e) => {
                    output.extend(buffer.finish());
                    return Err(RuntimeError::Build {
                        reason: e.to_string(),
                        output,
                    });
                }
            }
        }
        output.extend(buffer.finish());

        // A failed step can end the stream without an error item
        if let Err(e) = self.docker.inspect_image(tag).await {
            return Err(RuntimeError::Build {
                reason: format!("image {} missing after build: {}", tag, e),
                output,
            });
        }

        Ok(BuildOutput {
            image: tag.to_string(),
            output_lines: output,
        })
    }

    async fn run(&self, image: &str, spec: &RunSpec) -> Result<ContainerHandle, RuntimeError> {
        let body = ContainerCreateBody {
            image: Some(image.to_string()),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            env: Some(spec.env_pairs()),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.iter().map(|b| b.to_bind()).collect()),
                network_mode: spec.network.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: String::new(),
        };

        let container = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| RuntimeError::Run(e.to_string()))?;

        let handle = ContainerHandle { id: container.id };

        if let Err(e) = self
            .docker
            .start_container(&handle.id, None::<StartContainerOptions>)
            .await
        {
            if let Err(remove_err) = self.remove(&handle).await {
                warn!(
                    "Failed to remove container {}: {}",
                    handle.short_id(),
                    remove_err
                );
            }
            return Err(RuntimeError::Run(e.to_string()));
        }

        Ok(handle)
    }

    async fn stream_logs(&self, handle: &ContainerHandle) -> Result<LogStream, RuntimeError> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            since: 0,
            until: 0,
            timestamps: false,
            follow: true,
            tail: "all".to_string(),
        };

        let docker = self.docker.clone();
        let id = handle.id.clone();
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(async move {
            let mut logs = docker.logs(&id, Some(options));
            // One buffer per stream so partial lines never interleave
            let mut stdout = LineBuffer::default();
            let mut stderr = LineBuffer::default();

            while let Some(item) = logs.next().await {
                let lines = match item {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push(&String::from_utf8_lossy(&message))
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push(&String::from_utf8_lossy(&message))
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = tx.send(Err(RuntimeError::Logs(e.to_string()))).await;
                        return;
                    }
                };

                for line in lines {
                    if tx.send(Ok(line)).await.is_err() {
                        return;
                    }
                }
            }

            for rest in [stdout.finish(), stderr.finish()].into_iter().flatten() {
                if tx.send(Ok(rest)).await.is_err() {
                    return;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError> {
        let mut stream = self
            .docker
            .wait_container(&handle.id, Some(WaitContainerOptions::default()));

        match stream.next().await {
            Some(Ok(status)) => Ok(status.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::Container(format!(
                "wait stream for {} ended without a status",
                handle.short_id()
            ))),
        }
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(&handle.id, Some(StopContainerOptions::default()))
            .await?;
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(&handle.id, Some(options))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tar_context_includes_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Dockerfile"), "FROM python:3.8\n").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("train.py"), "print(1)\n").unwrap();

        let data = tar_context(dir.path()).unwrap();
        let mut archive = tar::Archive::new(data.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect();

        assert!(names.iter().any(|n| n.ends_with("Dockerfile")));
        assert!(names.iter().any(|n| n.ends_with("src/train.py")));
    }
}
