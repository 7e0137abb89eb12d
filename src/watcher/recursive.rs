//! Recursive directory watcher running on a dedicated thread.
//!
//! `notify` is used with one non-recursive watch per directory so that the
//! registration set is explicit. Before every blocking wait the tree is walked
//! again and directories created since the last walk are registered.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, select};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::error::WatchError;
use super::event::{ChangeKind, RawEvent};
use super::memo::DEFAULT_TTL;
use super::policy::FilenamePolicy;
use super::registry::WatchRegistry;
use super::router::EventRouter;
use super::sink::ChangeSink;

/// Watch `root` with the default coalescing window.
///
/// Shorthand for `RecursiveWatcher::new(root, policy).spawn(sink)`.
pub fn watch<S: ChangeSink>(
    root: impl AsRef<Path>,
    policy: FilenamePolicy,
    sink: S,
) -> Result<WatchHandle, WatchError> {
    RecursiveWatcher::new(root, policy).spawn(sink)
}

/// Configures and starts a watcher over one directory tree.
#[derive(Debug, Clone)]
pub struct RecursiveWatcher {
    root: PathBuf,
    policy: FilenamePolicy,
    coalesce: Duration,
}

impl RecursiveWatcher {
    pub fn new(root: impl AsRef<Path>, policy: FilenamePolicy) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            policy,
            coalesce: DEFAULT_TTL,
        }
    }

    /// Set the coalescing window.
    pub fn coalesce(mut self, window: Duration) -> Self {
        self.coalesce = window;
        self
    }

    /// Register the existing tree and start the worker thread.
    ///
    /// Directories present when this returns are already subscribed.
    pub fn spawn<S: ChangeSink>(self, sink: S) -> Result<WatchHandle, WatchError> {
        if !self.root.is_dir() {
            return Err(WatchError::RootMissing { path: self.root });
        }
        let root = fs::canonicalize(&self.root).map_err(|e| WatchError::PathWatchFailed {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(res);
        })?;

        // Never sent on; dropping the sender is the stop signal.
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let registry = WatchRegistry::new();

        let mut worker = Worker {
            root: root.clone(),
            watcher,
            registry: registry.clone(),
            router: EventRouter::new(self.policy, self.coalesce),
            sink,
            events: event_rx,
            stop: stop_rx,
        };
        worker.scan(false);

        crate::log_event!(
            "watcher",
            "monitoring",
            "{} directories under {}",
            registry.len(),
            root.display()
        );

        let thread = thread::Builder::new()
            .name("kcdev-watcher".to_string())
            .spawn(move || worker.run())?;

        Ok(WatchHandle {
            root,
            registry,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// Handle to a running watcher. Dropping it stops the watcher.
#[must_use = "dropping the handle stops the watcher"]
#[derive(Debug)]
pub struct WatchHandle {
    root: PathBuf,
    registry: WatchRegistry,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Canonical watch root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of directories subscribed so far. Never decreases.
    pub fn registered_dirs(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|thread| thread.is_finished())
    }

    /// Ask the worker to exit. Takes effect at its next wakeup.
    pub fn stop(&mut self) {
        self.stop.take();
    }

    /// Stop the worker and wait for it to exit.
    pub fn join(mut self) -> Result<(), WatchError> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| WatchError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Wakeup {
    Batch(Vec<RawEvent>),
    Stopped,
    Disconnected,
}

struct Worker<S> {
    root: PathBuf,
    watcher: RecommendedWatcher,
    registry: WatchRegistry,
    router: EventRouter,
    sink: S,
    events: Receiver<notify::Result<Event>>,
    stop: Receiver<()>,
}

impl<S: ChangeSink> Worker<S> {
    fn run(mut self) {
        loop {
            if self.stop_requested() {
                crate::debug_event!("watcher", "stopped");
                return;
            }

            let swept = self.scan(true);
            if !swept.is_empty() {
                self.dispatch(swept);
                continue;
            }

            let invalidated = match self.wait() {
                Wakeup::Batch(batch) => {
                    let invalidated = batch.contains(&RawEvent::RootInvalidated);
                    self.dispatch(batch);
                    invalidated
                }
                Wakeup::Stopped => {
                    crate::debug_event!("watcher", "stopped");
                    return;
                }
                Wakeup::Disconnected => {
                    tracing::warn!("[watcher] event source closed, exiting");
                    return;
                }
            };

            // A root recreated at the same path is a different directory with
            // no watch on it, so the removal event decides, not `is_dir`.
            if invalidated || !self.root.is_dir() {
                tracing::warn!(
                    "[watcher] watch root {} no longer valid, exiting",
                    self.root.display()
                );
                return;
            }
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }

    /// Register directories not yet watched.
    ///
    /// With `sweep`, files already inside newly registered directories are
    /// returned as `Created` events: they may have been written before the
    /// directory was subscribed.
    fn scan(&mut self, sweep: bool) -> Vec<RawEvent> {
        let mut swept = Vec::new();

        for dir in self.registry.unregistered_dirs(&self.root) {
            if let Err(e) = self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                crate::debug_event!("watcher", "register failed", "{}: {e}", dir.display());
                continue;
            }
            crate::debug_event!("watcher", "watching", "{}", dir.display());

            if sweep {
                swept.extend(self.existing_files(&dir));
            }
            self.registry.insert(dir);
        }

        swept
    }

    fn existing_files(&self, dir: &Path) -> Vec<RawEvent> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|ty| ty.is_file()))
            .filter_map(|entry| {
                let path = entry.path();
                let relative = path.strip_prefix(&self.root).ok()?;
                Some(RawEvent::change(ChangeKind::Created, relative))
            })
            .collect()
    }

    /// Block until events arrive, then drain whatever else is queued.
    fn wait(&self) -> Wakeup {
        select! {
            recv(self.stop) -> _ => Wakeup::Stopped,
            recv(self.events) -> first => match first {
                Ok(first) => {
                    let mut batch = self.translate(first);
                    for more in self.events.try_iter() {
                        batch.extend(self.translate(more));
                    }
                    Wakeup::Batch(batch)
                }
                Err(_) => Wakeup::Disconnected,
            },
        }
    }

    fn translate(&self, res: notify::Result<Event>) -> Vec<RawEvent> {
        match res {
            Ok(event) => RawEvent::from_notify(&event, &self.root),
            Err(e) => {
                crate::debug_event!("watcher", "event error", "{e}");
                Vec::new()
            }
        }
    }

    /// Route a batch and hand at most one change to the sink.
    fn dispatch(&mut self, batch: Vec<RawEvent>) {
        let Some(event) = self.router.route(batch) else {
            return;
        };

        crate::log_event!("watcher", "change detected", "{event}");

        let sink = &mut self.sink;
        match panic::catch_unwind(AssertUnwindSafe(|| sink.on_change(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("[watcher] {} failed: {e}", sink.name()),
            Err(_) => tracing::error!("[watcher] {} panicked on {event}", sink.name()),
        }
    }
}
