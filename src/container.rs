//! Capability traits over a container runtime
//!
//! [`Manager`] provisions containers and [`Container`] drives one of them. The
//! receipt runner only talks to these traits; `crate::docker` implements them on
//! top of the Docker Engine API.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::config::{Config, Mount};
use crate::error::Result;
use crate::logging::ScopedLogger;

/// One provisioned container
///
/// Once [`Container::remove`] succeeds the handle is dead: every further call
/// fails with `ContmanError::ContainerRemoved`.
#[async_trait]
pub trait Container: Send + Sync {
    /// Runtime-assigned identifier
    fn id(&self) -> &str;

    async fn start(&self) -> Result<()>;

    /// Stop, giving the process `timeout` to exit before it is killed
    async fn stop(&self, timeout: Duration) -> Result<()>;

    async fn remove(&self) -> Result<()>;

    /// Whether the runtime reports the container as running
    ///
    /// An inspect without state data counts as not running.
    async fn is_running(&self) -> Result<bool>;

    /// Block until the container stops and return its exit code
    ///
    /// With `dump_logs`, container stdout/stderr is streamed to the host streams
    /// in the background; failures there never fail the wait.
    async fn wait(&self, dump_logs: bool) -> Result<i64>;

    /// Copy `src` out of the container into the host directory `dest`
    async fn copy_from(&self, src: &str, dest: &Path) -> Result<()>;

    /// Copy the host path `src` into the container directory `dest`
    async fn copy_to(&self, src: &Path, dest: &str) -> Result<()>;

    /// Logger carrying this container's identifier
    fn logger(&self) -> ScopedLogger {
        ScopedLogger::new().with_field("containerID", self.id())
    }
}

/// Image and container provisioning
#[async_trait]
pub trait Manager: Send + Sync {
    async fn pull_image(&self, image: &str) -> Result<()>;

    async fn has_image(&self, image: &str) -> bool;

    async fn create_container(&self, config: Config) -> Result<Box<dyn Container>>;

    /// Mounts exposing the runtime control socket to a container
    fn system_mounts(&self) -> Vec<Mount>;
}
