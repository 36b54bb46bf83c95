use async_trait::async_trait;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig, Mount as DockerMount, MountTypeEnum};
use bollard::query_parameters::{CreateContainerOptions, CreateImageOptions, ListImagesOptions};
use bollard::Docker;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use super::auth;
use super::container::DockerContainer;
use super::reference::{registry_domain, with_default_tag};
use crate::config::{Config, ManagerConfig, Mount};
use crate::container::{Container, Manager};
use crate::deadline::Deadline;
use crate::error::{ContmanError, Result};

/// Host path of the Docker control socket
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Host directory with the Docker client config (registry credentials)
pub const DOCKER_CLIENT_CONFIG_DIR: &str = "/root/.docker";

/// Network mode every container is created with
pub const NETWORK_MODE: &str = "host";

/// [`Manager`] backed by a Docker Engine
#[derive(Debug, Clone)]
pub struct DockerManager {
    docker: Docker,
    deadline: Deadline,
}

impl DockerManager {
    /// Connect using local defaults (`DOCKER_HOST` or the local socket)
    /// and settings from the environment
    pub async fn connect() -> Result<Self> {
        Self::connect_with_config(ManagerConfig::from_env()).await
    }

    pub async fn connect_with_config(config: ManagerConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?
            .negotiate_version()
            .await?;
        log::debug!("Connected to Docker daemon");
        Ok(Self::from_docker(docker, config))
    }

    /// Wrap an existing client; the deadline starts counting now
    pub fn from_docker(docker: Docker, config: ManagerConfig) -> Self {
        let deadline = config.deadline.map(Deadline::after).unwrap_or_default();
        Self { docker, deadline }
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Run `command` non-interactively as root inside `container_id`
    ///
    /// Output is forwarded to the host stdout/stderr; a non-zero exit code is
    /// reported as [`ContmanError::CommandFailed`].
    pub async fn run_command(&self, container_id: &str, command: Vec<String>) -> Result<()> {
        log::debug!("Executing command in container {}: {:?}", container_id, command);

        let exec_config = CreateExecOptions {
            cmd: Some(command),
            user: Some("root".to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(container_id, exec_config).await?;
        if exec.id.is_empty() {
            return Err(ContmanError::CommandFailed(-1));
        }

        let start_config = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        match self.docker.start_exec(&exec.id, Some(start_config)).await? {
            StartExecResults::Attached { mut output, .. } => {
                let mut stdout = tokio::io::stdout();
                let mut stderr = tokio::io::stderr();
                while let Some(msg) = output.next().await {
                    match msg? {
                        bollard::container::LogOutput::StdOut { message }
                        | bollard::container::LogOutput::Console { message } => {
                            stdout.write_all(&message).await?
                        }
                        bollard::container::LogOutput::StdErr { message } => {
                            stderr.write_all(&message).await?
                        }
                        _ => {}
                    }
                }
                stdout.flush().await?;
                stderr.flush().await?;
            }
            StartExecResults::Detached => {
                log::error!("Unexpected detached execution for exec {}", exec.id);
                return Err(ContmanError::CommandFailed(-1));
            }
        }

        let exec_inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = exec_inspect.exit_code.unwrap_or(-1);
        if exit_code != 0 {
            log::warn!("Command failed with exit code {}", exit_code);
            return Err(ContmanError::CommandFailed(exit_code));
        }

        Ok(())
    }
}

/// Docker create body for a [`Config`]: `sh -c <cmd>` on the host network
pub(crate) fn container_body(config: &Config) -> ContainerCreateBody {
    let mounts = config
        .mounts
        .iter()
        .map(|m| DockerMount {
            source: Some(m.source.clone()),
            target: Some(m.target.clone()),
            read_only: Some(m.read_only),
            typ: Some(MountTypeEnum::BIND),
            ..Default::default()
        })
        .collect();

    let env = config
        .env
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();

    ContainerCreateBody {
        image: Some(config.image.clone()),
        entrypoint: Some(vec!["sh".to_string()]),
        cmd: Some(vec!["-c".to_string(), config.cmd.clone()]),
        working_dir: config.working_dir.clone(),
        env: Some(env),
        host_config: Some(HostConfig {
            mounts: Some(mounts),
            network_mode: Some(NETWORK_MODE.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl Manager for DockerManager {
    async fn pull_image(&self, image: &str) -> Result<()> {
        let domain = match registry_domain(image) {
            Ok(domain) => domain,
            Err(e) => {
                log::error!("Cannot parse image name: {}", e);
                return Err(e);
            }
        };
        let credentials = auth::resolve_credentials(domain).map(|c| c.into_docker(domain));

        let options = CreateImageOptions {
            from_image: Some(with_default_tag(image)),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, credentials);

        log::info!("Pulling image {}", image);
        let result = self
            .deadline
            .run(async {
                while let Some(info) = progress.next().await {
                    let info = info?;
                    if let Some(status) = &info.status {
                        log::debug!("Image pull progress: {}", status);
                    }
                }
                Ok::<(), ContmanError>(())
            })
            .await;

        match &result {
            Ok(()) => log::info!("Image {} is ready", image),
            Err(e) => log::error!("Error pulling image {}: {}", image, e),
        }
        result
    }

    async fn has_image(&self, image: &str) -> bool {
        if image.is_empty() {
            return false;
        }
        let wanted = with_default_tag(image);

        match self.docker.list_images(None::<ListImagesOptions>).await {
            Ok(images) => images
                .iter()
                .any(|summary| summary.repo_tags.iter().any(|tag| *tag == wanted)),
            Err(e) => {
                log::error!("Unable to list images: {}", e);
                false
            }
        }
    }

    async fn create_container(&self, config: Config) -> Result<Box<dyn Container>> {
        let body = container_body(&config);
        let response = self
            .deadline
            .run(async {
                self.docker
                    .create_container(None::<CreateContainerOptions>, body)
                    .await
                    .map_err(ContmanError::from)
            })
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                log::error!("Error creating container: {}", e);
                return Err(e);
            }
        };
        for warning in &response.warnings {
            log::warn!("Container create warning containerID={}: {}", response.id, warning);
        }
        log::debug!("Created container containerID={}", response.id);

        Ok(Box::new(DockerContainer::new(
            response.id,
            self.docker.clone(),
            self.deadline,
        )))
    }

    fn system_mounts(&self) -> Vec<Mount> {
        vec![
            Mount::new(DOCKER_SOCKET, DOCKER_SOCKET, false),
            Mount::new(DOCKER_CLIENT_CONFIG_DIR, DOCKER_CLIENT_CONFIG_DIR, true),
        ]
    }
}
