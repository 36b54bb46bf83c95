use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::{
    DownloadFromContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::Docker;
use futures_util::StreamExt;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::archive::{self, pipe};
use crate::container::Container;
use crate::deadline::Deadline;
use crate::error::{ContmanError, Result};

/// Container handle backed by the Docker Engine API
///
/// Start, wait and copies are bounded by the manager's deadline. Inspect, stop
/// and remove always run unbounded so cleanup still happens once it expired.
#[derive(Debug)]
pub struct DockerContainer {
    id: String,
    docker: Docker,
    deadline: Deadline,
    removed: AtomicBool,
}

impl DockerContainer {
    pub(crate) fn new(id: String, docker: Docker, deadline: Deadline) -> Self {
        Self {
            id,
            docker,
            deadline,
            removed: AtomicBool::new(false),
        }
    }

    /// Identifier of a handle that has not been removed yet
    fn live_id(&self) -> Result<&str> {
        if self.removed.load(Ordering::Acquire) {
            return Err(ContmanError::ContainerRemoved(self.id.clone()));
        }
        Ok(&self.id)
    }

    /// Stream container output to the host stdout/stderr until it closes
    ///
    /// The task is not joined; a broken log stream only costs observability.
    fn spawn_log_dump(&self) {
        let docker = self.docker.clone();
        let id = self.id.clone();
        let logger = self.logger();

        tokio::spawn(async move {
            let options = LogsOptions {
                follow: true,
                stdout: true,
                stderr: true,
                ..Default::default()
            };
            let mut logs = docker.logs(&id, Some(options));
            let mut stdout = tokio::io::stdout();
            let mut stderr = tokio::io::stderr();

            while let Some(item) = logs.next().await {
                let written = match item {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        stdout.write_all(&message).await
                    }
                    Ok(LogOutput::StdErr { message }) => stderr.write_all(&message).await,
                    Ok(_) => Ok(()),
                    Err(e) => {
                        logger.warn(format_args!("Log stream ended with error: {}", e));
                        break;
                    }
                };
                if let Err(e) = written {
                    logger.warn(format_args!("Failed to forward container output: {}", e));
                    break;
                }
            }
            let _ = stdout.flush().await;
            let _ = stderr.flush().await;
        });
    }
}

#[async_trait]
impl Container for DockerContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<()> {
        let id = self.live_id()?;
        let result = self
            .deadline
            .run(async {
                self.docker
                    .start_container(id, None::<StartContainerOptions>)
                    .await
                    .map_err(ContmanError::from)
            })
            .await;
        if let Err(e) = &result {
            self.logger().error(format_args!("Error starting container: {}", e));
        }
        result
    }

    async fn stop(&self, timeout: Duration) -> Result<()> {
        let id = self.live_id()?;
        let options = StopContainerOptions {
            t: Some(i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX)),
            ..Default::default()
        };
        let result = self.docker.stop_container(id, Some(options)).await;
        if let Err(e) = &result {
            self.logger().error(format_args!("Error stopping container: {}", e));
        }
        Ok(result?)
    }

    async fn remove(&self) -> Result<()> {
        let id = self.live_id()?;
        match self
            .docker
            .remove_container(id, None::<RemoveContainerOptions>)
            .await
        {
            Ok(()) => {
                self.removed.store(true, Ordering::Release);
                self.logger().debug("Container removed");
                Ok(())
            }
            Err(e) => {
                self.logger().error(format_args!("Error removing container: {}", e));
                Err(e.into())
            }
        }
    }

    async fn is_running(&self) -> Result<bool> {
        let id = self.live_id()?;
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => Ok(inspect
                .state
                .and_then(|state| state.running)
                .unwrap_or(false)),
            Err(e) => {
                self.logger()
                    .error(format_args!("Error checking container running status: {}", e));
                Err(e.into())
            }
        }
    }

    async fn wait(&self, dump_logs: bool) -> Result<i64> {
        let id = self.live_id()?;
        if dump_logs {
            self.spawn_log_dump();
        }

        let options = WaitContainerOptions {
            condition: "not-running".to_string(),
            ..Default::default()
        };
        let mut statuses = self.docker.wait_container(id, Some(options));

        let result = self
            .deadline
            .run(async {
                // First message wins: a status, or an error. Docker reports a
                // non-zero exit as a wait error carrying the code.
                match statuses.next().await {
                    Some(Ok(status)) => Ok(status.status_code),
                    Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
                    Some(Err(e)) => Err(ContmanError::from(e)),
                    None => Err(ContmanError::WaitEnded(id.to_string())),
                }
            })
            .await;

        if let Err(e) = &result {
            self.logger().error(format_args!("Error waiting container: {}", e));
        }
        result
    }

    async fn copy_from(&self, src: &str, dest: &Path) -> Result<()> {
        let id = self.live_id()?;
        let logger = self
            .logger()
            .with_field("src", src)
            .with_field("dest", dest.display());

        let options = DownloadFromContainerOptions {
            path: src.to_string(),
        };
        let mut stream = self.docker.download_from_container(id, Some(options));

        let (tx, reader) = pipe::chunk_reader(pipe::PIPE_CAPACITY);
        let target = dest.to_path_buf();
        let decoder = tokio::task::spawn_blocking(move || archive::decode_into(reader, &target));

        let forwarded = self
            .deadline
            .run(async move {
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            if tx.send(Ok(bytes)).await.is_err() {
                                // decoder stopped early; its own error explains why
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                            return Err(ContmanError::from(e));
                        }
                    }
                }
                Ok(())
            })
            .await;

        if let Err(e) = forwarded {
            logger.error(format_args!("Error copying from container: {}", e));
            return Err(e);
        }

        match decoder.await? {
            Ok(stats) => {
                logger.info(format_args!(
                    "Copied from container: {} written, {} unchanged, {} directories",
                    stats.written, stats.unchanged, stats.directories
                ));
                Ok(())
            }
            Err(e) => {
                logger.error(format_args!("Error extracting from container: {}", e));
                Err(e.into())
            }
        }
    }

    async fn copy_to(&self, src: &Path, dest: &str) -> Result<()> {
        let id = self.live_id()?;
        let logger = self
            .logger()
            .with_field("src", src.display())
            .with_field("dest", dest);

        let (writer, body) = pipe::chunk_writer(pipe::PIPE_CAPACITY);
        let source = src.to_path_buf();
        let encoder = tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut writer = archive::encode_dir(&source, writer)?;
            writer.flush()
        });

        let options = UploadToContainerOptions {
            path: dest.to_string(),
            ..Default::default()
        };
        let uploaded = self
            .deadline
            .run(async {
                self.docker
                    .upload_to_container(id, Some(options), bollard::body_stream(body))
                    .await
                    .map_err(ContmanError::from)
            })
            .await;

        let encoded = encoder.await?;

        if let Err(e) = uploaded {
            logger.error(format_args!("Error copying to container: {}", e));
            return Err(e);
        }
        if let Err(e) = encoded {
            logger.error(format_args!("Failed to create tar archive: {}", e));
            return Err(e.into());
        }

        logger.debug("Copied to container");
        Ok(())
    }
}
