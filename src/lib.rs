//! Run a single command in an ephemeral Docker container
//!
//! A [`Receipt`] describes the run: image, shell command, environment, files to
//! copy in before start and out after exit. [`run_receipt`] pulls the image,
//! creates the container, copies inputs, runs and waits for it, copies outputs
//! and always tears the container down.

pub mod archive;
pub mod config;
pub mod container;
pub mod deadline;
pub mod docker;
pub mod error;
pub mod logging;
pub mod receipt;

pub use config::{Config, ManagerConfig, Mount, Receipt};
pub use container::{Container, Manager};
pub use deadline::Deadline;
pub use docker::{DockerContainer, DockerManager};
pub use error::{ContmanError, Result};
pub use receipt::{run_receipt, ReceiptRunner, Stage};
