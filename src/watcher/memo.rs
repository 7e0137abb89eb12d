//! Short-lived "recently seen" memo for coalescing change bursts.
//!
//! Build tools write dozens of class files in quick succession. A key seen
//! within the TTL suppresses further dispatches for that key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default coalescing window.
pub const DEFAULT_TTL: Duration = Duration::from_millis(500);

/// Maps a coalescing key to the instant its suppression ends.
///
/// Expired entries are evicted lazily on lookup; there is no sweeper.
#[derive(Debug)]
pub struct CoalescingMemo {
    /// key -> deadline
    entries: HashMap<String, Instant>,
    ttl: Duration,
}

impl Default for CoalescingMemo {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CoalescingMemo {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Admit `key` now. See [`CoalescingMemo::admit_at`].
    pub fn admit(&mut self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// Returns `true` and starts a new window if `key` is not suppressed at `now`.
    ///
    /// Returns `false` while an earlier window for `key` is still open. A
    /// suppressed lookup does not extend the window.
    pub fn admit_at(&mut self, key: &str, now: Instant) -> bool {
        if let Some(deadline) = self.entries.get(key) {
            if now < *deadline {
                return false;
            }
            self.entries.remove(key);
        }

        self.entries.insert(key.to_string(), now + self.ttl);
        true
    }

    /// Check if `key` is suppressed at `now`, evicting it if expired.
    pub fn contains_at(&mut self, key: &str, now: Instant) -> bool {
        match self.entries.get(key) {
            Some(deadline) if now < *deadline => true,
            Some(_) => {
                self.entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
