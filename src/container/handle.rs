//! Runtime access to a started container.

use std::sync::Arc;

use super::ContainerError;

/// Write access into a running container.
///
/// Called from the watcher thread, so implementations must not require an
/// async context of their own.
pub trait ContainerHandle: Send + Sync {
    /// Replace the file at `container_path` with `bytes`.
    ///
    /// Readers inside the container see either the old or the new contents.
    fn copy_bytes_into(&self, bytes: &[u8], container_path: &str) -> Result<(), ContainerError>;
}

impl<T: ContainerHandle + ?Sized> ContainerHandle for Arc<T> {
    fn copy_bytes_into(&self, bytes: &[u8], container_path: &str) -> Result<(), ContainerError> {
        (**self).copy_bytes_into(bytes, container_path)
    }
}
