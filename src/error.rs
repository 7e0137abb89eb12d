//! Crate-level error type.

use thiserror::Error;

use crate::client::ClientError;
use crate::container::ContainerError;
use crate::mount::MountError;
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
