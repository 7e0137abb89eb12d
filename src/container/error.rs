//! Error types for the container collaborator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Invalid image reference '{image}': {reason}")]
    InvalidImage { image: String, reason: String },

    #[error("Container runtime error: {0}")]
    Runtime(#[from] testcontainers::TestcontainersError),

    #[error("Failed to copy into {path}: {reason}")]
    CopyFailed { path: String, reason: String },

    #[error("Container port {port} is not exposed")]
    PortNotExposed { port: u16 },

    #[error("No Tokio runtime to drive the container: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Realm import file {path} not found")]
    RealmFileMissing { path: std::path::PathBuf },
}
