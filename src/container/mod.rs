//! Container collaborator: start configuration and runtime writes.
//!
//! The watcher only sees [`ContainerHandle`]; everything testcontainers
//! specific stays in this module.

mod docker;
mod error;
mod handle;
mod keycloak;
mod spec;

pub use docker::{DockerHandle, atomic_write_argv};
pub use error::ContainerError;
pub use handle::ContainerHandle;
pub use keycloak::{DEBUG_PORT, DevContainer, HTTP_PORT, REALM_IMPORT_PATH, RunningDevContainer};
pub use spec::{ContainerFile, ContainerSpec, FileSource};
