/// Errors that can occur while provisioning, running or tearing down a container
#[derive(Debug, thiserror::Error)]
pub enum ContmanError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid image reference '{0}'")]
    InvalidImage(String),
    #[error("Container {0} has already been removed")]
    ContainerRemoved(String),
    #[error("Operation cancelled: deadline exceeded")]
    Cancelled,
    #[error("Wait stream for container {0} ended without a status")]
    WaitEnded(String),
    #[error("Container exited with non-zero code: {0}")]
    NonZeroExit(i64),
    #[error("Command failed with exit code {0}")]
    CommandFailed(i64),
    #[error("Failed to copy outputs: {0}")]
    OutputCopy(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ContmanError>;
