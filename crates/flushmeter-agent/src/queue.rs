//! Bounded handoff between the ticker and the sender.
//!
//! Overflow policy: drop oldest. The producer is the worker's own ticker, so
//! `offer` never waits; when the sender falls behind the stalest pending
//! epoch is discarded and counted. Before a snapshot is queued the global
//! name prefix is applied and every entry is re-validated, since a prefix can
//! push an admitted name past the length limit.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use flushmeter_core::{NameRules, Snapshot};

/// Outcome of [`ValidatingQueue::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Accepted after evicting the oldest pending snapshot.
    EvictedOldest,
    /// Nothing left after validation; not queued.
    Empty,
    /// Queue closed; snapshot dropped.
    Closed,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Snapshot>,
    closed: bool,
}

enum Next {
    Ready(Snapshot),
    Finished,
    Wait,
}

pub struct ValidatingQueue {
    state: Mutex<State>,
    notify: Notify,
    capacity: usize,
    rules: NameRules,
    prefix: Option<String>,
    dropped: AtomicU64,
    invalid: AtomicU64,
}

impl ValidatingQueue {
    pub fn new(capacity: usize, rules: NameRules, prefix: Option<String>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            rules,
            prefix: prefix.filter(|p| !p.is_empty()),
            dropped: AtomicU64::new(0),
            invalid: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots discarded by overflow, closure or shutdown.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Entries removed because the prefixed name failed validation.
    pub fn invalid_count(&self) -> u64 {
        self.invalid.load(Ordering::Relaxed)
    }

    /// Validate and enqueue without ever blocking the caller.
    pub fn offer(&self, snapshot: Snapshot) -> Offer {
        let snapshot = self.prepare(snapshot);
        if snapshot.is_empty() {
            return Offer::Empty;
        }

        let outcome = {
            let mut state = self.lock();
            if state.closed {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Offer::Closed;
            }
            let outcome = if state.pending.len() >= self.capacity {
                state.pending.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Offer::EvictedOldest
            } else {
                Offer::Accepted
            };
            state.pending.push_back(snapshot);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    pub fn try_take(&self) -> Option<Snapshot> {
        self.lock().pending.pop_front()
    }

    /// Wait for the next snapshot. Returns `None` once closed and drained.
    pub async fn take(&self) -> Option<Snapshot> {
        loop {
            match self.next() {
                Next::Ready(snapshot) => return Some(snapshot),
                Next::Finished => return None,
                Next::Wait => self.notify.notified().await,
            }
        }
    }

    /// Stop accepting; `take` drains what is pending and then yields `None`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    /// Accept offers again after a `close`.
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    /// Throw away everything pending; returns how many snapshots were lost.
    pub fn discard_pending(&self) -> usize {
        let lost = {
            let mut state = self.lock();
            let n = state.pending.len();
            state.pending.clear();
            n
        };
        self.dropped.fetch_add(lost as u64, Ordering::Relaxed);
        lost
    }

    fn next(&self) -> Next {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some(snapshot) => Next::Ready(snapshot),
            None if state.closed => Next::Finished,
            None => Next::Wait,
        }
    }

    fn prepare(&self, mut snapshot: Snapshot) -> Snapshot {
        if let Some(prefix) = &self.prefix {
            snapshot.counters = prefixed(prefix, std::mem::take(&mut snapshot.counters));
            snapshot.timings = prefixed(prefix, std::mem::take(&mut snapshot.timings));
        }

        let rules = &self.rules;
        let removed = snapshot.retain_names(|name| match rules.validate(name) {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!(name = %name, reason = reason.code(), "dropping invalid metric before submit");
                false
            }
        });
        if removed > 0 {
            self.invalid.fetch_add(removed as u64, Ordering::Relaxed);
        }
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn prefixed<V>(prefix: &str, entries: BTreeMap<String, V>) -> BTreeMap<String, V> {
    entries
        .into_iter()
        .map(|(name, v)| (format!("{prefix}.{name}"), v))
        .collect()
}
