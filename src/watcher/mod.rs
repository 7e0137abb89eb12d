//! Class folder watcher for hot redeploy.
//!
//! Observes a compiled-output tree and turns the burst of events a build
//! produces into a single change signal.
//!
//! # Architecture
//!
//! ```text
//! RecursiveWatcher (dedicated thread)
//!   - notify::RecommendedWatcher, one watch per directory
//!   - WatchRegistry (grows on every re-scan)
//!   - EventRouter
//!       - FilenamePolicy (extension allow-list, excludes)
//!       - CoalescingMemo (short TTL per key)
//!         |
//!     ChangeSink (at most one call per batch)
//! ```

mod error;
mod event;
mod memo;
mod policy;
mod recursive;
mod registry;
mod router;
mod sink;

pub use error::WatchError;
pub use event::{ChangeEvent, ChangeKind, RawEvent};
pub use memo::{CoalescingMemo, DEFAULT_TTL};
pub use policy::{FilenamePolicy, KeyMode};
pub use recursive::{RecursiveWatcher, WatchHandle, watch};
pub use registry::WatchRegistry;
pub use router::EventRouter;
pub use sink::ChangeSink;
