//! Receipt runner
//!
//! Drives one [`Receipt`] through the container lifecycle:
//!
//! ```text
//! NotStarted -> ImageReady -> ContainerCreated -> InputsCopied -> Started
//!            -> Exited -> OutputsCopied -> Cleaned
//! ```
//!
//! Once a container exists, cleanup (stop if running, then remove) runs on every
//! path. The first error met along the way is what the run returns; cleanup
//! errors are only logged.

use std::fmt;
use std::path::Path;

use crate::config::{Config, Receipt};
use crate::container::{Container, Manager};
use crate::error::{ContmanError, Result};

/// Progress of a receipt run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    NotStarted,
    ImageReady,
    ContainerCreated,
    InputsCopied,
    Started,
    Exited,
    OutputsCopied,
    Cleaned,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NotStarted => "not-started",
            Stage::ImageReady => "image-ready",
            Stage::ContainerCreated => "container-created",
            Stage::InputsCopied => "inputs-copied",
            Stage::Started => "started",
            Stage::Exited => "exited",
            Stage::OutputsCopied => "outputs-copied",
            Stage::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// Runs a single receipt against a [`Manager`]
pub struct ReceiptRunner<'a> {
    manager: &'a dyn Manager,
    receipt: &'a Receipt,
    stage: Stage,
    exit_code: Option<i64>,
}

impl<'a> ReceiptRunner<'a> {
    pub fn new(manager: &'a dyn Manager, receipt: &'a Receipt) -> Self {
        Self {
            manager,
            receipt,
            stage: Stage::NotStarted,
            exit_code: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Exit code observed by the wait, if the container ran
    pub fn exit_code(&self) -> Option<i64> {
        self.exit_code
    }

    fn advance(&mut self, stage: Stage) {
        log::debug!("Receipt run {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// Execute the receipt; a runner is meant to be run once
    pub async fn run(&mut self) -> Result<()> {
        let container = match self.provision().await {
            Ok(container) => container,
            Err(e) => {
                // nothing was created, so there is nothing to clean up
                self.advance(Stage::Cleaned);
                return Err(e);
            }
        };

        let result = self.drive(container.as_ref()).await;
        self.cleanup(container.as_ref()).await;
        result
    }

    async fn provision(&mut self) -> Result<Box<dyn Container>> {
        if !self.receipt.use_local_image {
            self.manager.pull_image(&self.receipt.image).await?;
        }
        self.advance(Stage::ImageReady);

        let config = self.build_config()?;
        let container = self.manager.create_container(config).await?;
        self.advance(Stage::ContainerCreated);
        Ok(container)
    }

    fn build_config(&self) -> Result<Config> {
        let mounts = if self.receipt.use_control_socket {
            self.manager.system_mounts()
        } else {
            Vec::new()
        };

        let working_dir = if self.receipt.use_image_working_dir {
            None
        } else {
            Some(std::env::current_dir()?.to_string_lossy().into_owned())
        };

        Ok(Config {
            image: self.receipt.image.clone(),
            cmd: self.receipt.cmd.clone(),
            env: self.receipt.env.clone(),
            mounts,
            working_dir,
        })
    }

    /// Everything between creation and cleanup
    async fn drive(&mut self, container: &dyn Container) -> Result<()> {
        if self.receipt.only_create {
            container
                .logger()
                .info("Container created; skipping start as requested");
            return Ok(());
        }

        self.copy_inputs(container).await?;
        self.advance(Stage::InputsCopied);

        container.start().await?;
        self.advance(Stage::Started);

        let exit_code = container.wait(true).await?;
        self.exit_code = Some(exit_code);
        self.advance(Stage::Exited);

        let exited = if exit_code != 0 {
            container
                .logger()
                .error(format_args!("Container exited with non-zero code: {}", exit_code));
            Err(ContmanError::NonZeroExit(exit_code))
        } else {
            Ok(())
        };

        let copy_errors = self.copy_outputs(container).await;
        self.advance(Stage::OutputsCopied);

        exited?;
        if !copy_errors.is_empty() {
            return Err(ContmanError::OutputCopy(copy_errors.join("; ")));
        }
        Ok(())
    }

    /// Copy inputs that exist on the host; missing ones are optional
    async fn copy_inputs(&self, container: &dyn Container) -> Result<()> {
        for (src, dest) in &self.receipt.input_copy {
            let source = Path::new(src);
            if !source.exists() {
                container
                    .logger()
                    .with_field("src", src)
                    .info("Skipping missing input");
                continue;
            }
            container.copy_to(source, dest).await?;
        }
        Ok(())
    }

    /// Copy every output, collecting failures instead of stopping at the first
    async fn copy_outputs(&self, container: &dyn Container) -> Vec<String> {
        let mut errors = Vec::new();
        for (src, dest) in &self.receipt.output_copy {
            if let Err(e) = container.copy_from(src, Path::new(dest)).await {
                container
                    .logger()
                    .with_field("src", src)
                    .with_field("dest", dest)
                    .warn(format_args!("Output copy failed: {}", e));
                errors.push(format!("{} -> {}: {}", src, dest, e));
            }
        }
        errors
    }

    /// Stop if still running, then remove; never fails the run
    async fn cleanup(&mut self, container: &dyn Container) {
        let logger = container.logger();

        match container.is_running().await {
            Ok(true) => {
                if let Err(e) = container.stop(self.receipt.timeout).await {
                    logger.warn(format_args!("Cleanup stop failed: {}", e));
                }
            }
            Ok(false) => {}
            Err(e) => logger.warn(format_args!("Cleanup could not inspect container: {}", e)),
        }

        if let Err(e) = container.remove().await {
            logger.warn(format_args!("Cleanup remove failed: {}", e));
        }

        self.advance(Stage::Cleaned);
    }
}

/// Run `receipt` to completion with `manager`
pub async fn run_receipt(manager: &dyn Manager, receipt: &Receipt) -> Result<()> {
    ReceiptRunner::new(manager, receipt).run().await
}
