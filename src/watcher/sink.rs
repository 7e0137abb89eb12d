//! Receiver of debounced change signals.

use super::WatchError;
use super::event::ChangeEvent;

/// Called by the watcher thread once per dispatched batch.
///
/// Errors are logged by the watcher and never stop it.
pub trait ChangeSink: Send + 'static {
    /// Sink name for logging.
    fn name(&self) -> &str {
        "callback"
    }

    fn on_change(&mut self, event: &ChangeEvent) -> Result<(), WatchError>;
}

impl<F> ChangeSink for F
where
    F: FnMut(&ChangeEvent) -> Result<(), WatchError> + Send + 'static,
{
    fn on_change(&mut self, event: &ChangeEvent) -> Result<(), WatchError> {
        self(event)
    }
}
