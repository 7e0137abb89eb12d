//! Change events as seen by the router.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        };
        f.write_str(label)
    }
}

/// A change below the watch root. `path` is relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Last component of the relative path.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

/// Event as delivered by the OS, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// The OS dropped events. Never surfaces past the router.
    Overflow,
    /// The watch root itself was removed or moved away. Its OS watch is gone
    /// even if a directory reappears at the same path.
    RootInvalidated,
    Change(ChangeEvent),
}

impl RawEvent {
    pub fn change(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        RawEvent::Change(ChangeEvent::new(kind, path))
    }

    /// Translate a `notify` event into raw events relative to `root`.
    ///
    /// Paths outside the root and access events are skipped. On the root
    /// itself only a removal or rename away is reported, as `RootInvalidated`.
    pub fn from_notify(event: &notify::Event, root: &Path) -> Vec<RawEvent> {
        if event.need_rescan() {
            return vec![RawEvent::Overflow];
        }

        let kinds: Vec<ChangeKind> = match event.kind {
            EventKind::Create(_) => vec![ChangeKind::Created],
            EventKind::Remove(_) => vec![ChangeKind::Deleted],
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => vec![ChangeKind::Deleted],
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => vec![ChangeKind::Created],
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                vec![ChangeKind::Deleted, ChangeKind::Created]
            }
            EventKind::Modify(_) => vec![ChangeKind::Modified],
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
        };

        event
            .paths
            .iter()
            .enumerate()
            .filter_map(|(idx, path)| {
                let relative = path.strip_prefix(root).ok()?;
                // Rename pairs carry (from, to); everything else shares one kind.
                let kind = kinds.get(idx).or_else(|| kinds.first()).copied()?;
                if relative.as_os_str().is_empty() {
                    return invalidates_root(&event.kind, kind).then_some(RawEvent::RootInvalidated);
                }
                Some(RawEvent::change(kind, relative))
            })
            .collect()
    }
}

/// Whether an event reported on the root path means the root watch is gone.
///
/// A rename of unknown direction on the root is treated as a move away.
fn invalidates_root(kind: &EventKind, change: ChangeKind) -> bool {
    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => true,
        _ => change == ChangeKind::Deleted,
    }
}
