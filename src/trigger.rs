//! Redeploy trigger: rewrites the `.dodeploy` sentinel inside the container.

use crate::container::ContainerHandle;
use crate::mount::SENTINEL_PAYLOAD;
use crate::watcher::{ChangeEvent, ChangeSink, WatchError};

/// Change sink that asks the server to redeploy the mounted archive.
///
/// Writing the sentinel is idempotent; every write produces the same bytes.
pub struct RedeployTrigger<H> {
    handle: H,
    sentinel_path: String,
}

impl<H: ContainerHandle> RedeployTrigger<H> {
    pub fn new(handle: H, sentinel_path: impl Into<String>) -> Self {
        Self {
            handle,
            sentinel_path: sentinel_path.into(),
        }
    }

    pub fn sentinel_path(&self) -> &str {
        &self.sentinel_path
    }

    /// Write the sentinel now, independent of any file change.
    pub fn fire(&self) -> Result<(), crate::container::ContainerError> {
        self.handle
            .copy_bytes_into(SENTINEL_PAYLOAD, &self.sentinel_path)
    }
}

impl<H: ContainerHandle + 'static> ChangeSink for RedeployTrigger<H> {
    fn name(&self) -> &str {
        "trigger"
    }

    fn on_change(&mut self, event: &ChangeEvent) -> Result<(), WatchError> {
        crate::log_event!("trigger", "redeploying", "changed file: {}", event.path.display());

        self.fire().map_err(|e| WatchError::SinkFailed {
            sink: "trigger".to_string(),
            path: event.path.clone(),
            reason: e.to_string(),
        })?;

        crate::log_event!("trigger", "redeployment triggered");
        Ok(())
    }
}
