//! Filters and debounces raw events into at most one dispatch per batch.

use std::time::{Duration, Instant};

use super::event::{ChangeEvent, RawEvent};
use super::memo::CoalescingMemo;
use super::policy::FilenamePolicy;

/// Applies the filename policy and the coalescing memo to event batches.
///
/// Owned by the watcher thread; nothing here is shared.
#[derive(Debug)]
pub struct EventRouter {
    policy: FilenamePolicy,
    memo: CoalescingMemo,
}

impl EventRouter {
    pub fn new(policy: FilenamePolicy, ttl: Duration) -> Self {
        Self {
            policy,
            memo: CoalescingMemo::new(ttl),
        }
    }

    pub fn policy(&self) -> &FilenamePolicy {
        &self.policy
    }

    /// Route one batch. See [`EventRouter::route_at`].
    pub fn route<I>(&mut self, batch: I) -> Option<ChangeEvent>
    where
        I: IntoIterator<Item = RawEvent>,
    {
        self.route_at(batch, Instant::now())
    }

    /// Return the first event in `batch` that passes the policy and is not
    /// suppressed by the memo. Later events in the batch are not examined:
    /// one redeploy covers the whole batch.
    pub fn route_at<I>(&mut self, batch: I, now: Instant) -> Option<ChangeEvent>
    where
        I: IntoIterator<Item = RawEvent>,
    {
        for raw in batch {
            let event = match raw {
                RawEvent::Overflow | RawEvent::RootInvalidated => continue,
                RawEvent::Change(event) => event,
            };

            let Some(key) = self.policy.key_for(&event) else {
                crate::debug_event!("router", "ignored", "{event}");
                continue;
            };

            if !self.memo.admit_at(&key, now) {
                crate::debug_event!("router", "coalesced", "{event}");
                continue;
            }

            return Some(event);
        }

        None
    }
}
