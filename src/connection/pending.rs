//! Correlation table: pending requests keyed by sync id.
//!
//! Each entry owns its completion and a key into a shared [`DelayQueue`]
//! that acts as the per-request deadline timer. An entry leaves the table
//! exactly once, through [`resolve`](PendingTable::resolve),
//! [`take_expired`](PendingTable::take_expired) or
//! [`drain`](PendingTable::drain).

use std::collections::HashMap;
use std::future::poll_fn;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::time::delay_queue::{DelayQueue, Key};

use super::engine::Completion;

struct PendingRequest {
    deadline: Instant,
    key: Key,
    completion: Completion,
}

/// What a fired deadline turned out to mean.
pub(crate) enum Expiry {
    /// The deadline was reached; the entry is gone and must time out.
    Fired(Completion),
    /// The timer fired early or was raced; the entry was re-armed.
    Rearmed,
    /// The entry was already resolved.
    Gone,
}

pub(crate) struct PendingTable {
    entries: HashMap<u32, PendingRequest>,
    deadlines: DelayQueue<u32>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            deadlines: DelayQueue::new(),
        }
    }

    /// Register `sync` with a deadline `timeout` from now.
    ///
    /// Returns the completion of an entry that was already registered under
    /// the same sync id, so the caller can resolve it.
    pub(crate) fn register(
        &mut self,
        sync: u32,
        timeout: Duration,
        completion: Completion,
    ) -> Option<Completion> {
        let replaced = self.resolve(sync);
        let deadline = Instant::now() + timeout;
        let key = self.deadlines.insert_at(sync, deadline);
        self.entries.insert(
            sync,
            PendingRequest {
                deadline,
                key,
                completion,
            },
        );
        replaced
    }

    /// Remove `sync` and cancel its deadline.
    pub(crate) fn resolve(&mut self, sync: u32) -> Option<Completion> {
        let entry = self.entries.remove(&sync)?;
        self.deadlines.try_remove(&entry.key);
        Some(entry.completion)
    }

    /// Wait for the next deadline to fire and return its sync id.
    ///
    /// Resolves to `None` immediately when no deadline is armed.
    pub(crate) async fn next_expired(&mut self) -> Option<u32> {
        poll_fn(|cx| self.deadlines.poll_expired(cx))
            .await
            .map(|expired| expired.into_inner())
    }

    /// Handle a fired deadline for `sync`.
    ///
    /// Must be called right after [`next_expired`](Self::next_expired)
    /// yielded `sync`, while the entry's key is already consumed. The fire
    /// only counts if the entry's own deadline has been reached; a fire that
    /// arrives before it re-arms the timer instead.
    pub(crate) fn take_expired(&mut self, sync: u32, now: Instant) -> Expiry {
        let Some(entry) = self.entries.get_mut(&sync) else {
            return Expiry::Gone;
        };
        if entry.deadline > now {
            entry.key = self.deadlines.insert_at(sync, entry.deadline);
            return Expiry::Rearmed;
        }
        match self.entries.remove(&sync) {
            Some(entry) => Expiry::Fired(entry.completion),
            None => Expiry::Gone,
        }
    }

    /// Remove every entry and cancel every deadline.
    pub(crate) fn drain(&mut self) -> Vec<(u32, Completion)> {
        self.deadlines.clear();
        self.entries
            .drain()
            .map(|(sync, entry)| (sync, entry.completion))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, sync: u32) -> bool {
        self.entries.contains_key(&sync)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
