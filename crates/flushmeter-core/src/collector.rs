//! Concurrent epoch collector.
//!
//! The live epoch is a pair of `DashMap`s behind an `RwLock`. Observations
//! hold the read lock only for the duration of one map update, so writers run
//! in parallel and contend only on DashMap shards. `snapshot_and_clear` takes
//! the write lock and swaps in an empty epoch: once it holds the lock no
//! writer can be inside the old maps, so every observation lands wholly in the
//! old epoch or wholly in the new one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::error::Rejection;
use crate::name::{validate_delta, validate_duration, validate_sample, NameRules};
use crate::snapshot::{Snapshot, TimingStats};

#[derive(Default)]
struct Epoch {
    counters: DashMap<String, i64>,
    timings: DashMap<String, TimingStats>,
}

impl Epoch {
    fn into_snapshot(self) -> Snapshot {
        Snapshot {
            counters: self.counters.into_iter().collect::<BTreeMap<_, _>>(),
            timings: self.timings.into_iter().collect::<BTreeMap<_, _>>(),
            taken_at_unix: unix_now(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Aggregates counters and timings for the current epoch.
pub struct Collector {
    live: RwLock<Epoch>,
    rules: NameRules,
    rejected: AtomicU64,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(NameRules::default())
    }
}

impl Collector {
    pub fn new(rules: NameRules) -> Self {
        Self {
            live: RwLock::new(Epoch::default()),
            rules,
            rejected: AtomicU64::new(0),
        }
    }

    pub fn rules(&self) -> &NameRules {
        &self.rules
    }

    /// Add `delta` to the counter `name`, creating it at zero.
    pub fn increment(&self, name: &str, delta: i64) -> Result<(), Rejection> {
        self.admit(name, validate_delta(delta))?;

        let live = self.read();
        if let Some(mut sum) = live.counters.get_mut(name) {
            *sum = sum.saturating_add(delta);
            return Ok(());
        }
        let mut sum = live.counters.entry(name.to_string()).or_insert(0);
        *sum = sum.saturating_add(delta);
        Ok(())
    }

    /// Record a duration sample in milliseconds.
    pub fn timing(&self, name: &str, millis: f64) -> Result<(), Rejection> {
        self.admit(name, validate_duration(millis))?;
        self.record(name, millis);
        Ok(())
    }

    /// Record an arbitrary finite sample.
    pub fn measure(&self, name: &str, value: f64) -> Result<(), Rejection> {
        self.admit(name, validate_sample(value))?;
        self.record(name, value);
        Ok(())
    }

    /// Close the current epoch and return everything it observed.
    pub fn snapshot_and_clear(&self) -> Snapshot {
        let closed = {
            let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *live)
        };
        closed.into_snapshot()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct entries in the live epoch.
    pub fn len(&self) -> usize {
        let live = self.read();
        live.counters.len() + live.timings.len()
    }

    /// Observations refused since construction.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn record(&self, name: &str, value: f64) {
        let live = self.read();
        if let Some(mut stats) = live.timings.get_mut(name) {
            stats.record(value);
            return;
        }
        live.timings
            .entry(name.to_string())
            .and_modify(|stats| stats.record(value))
            .or_insert_with(|| TimingStats::new(value));
    }

    fn admit(&self, name: &str, value_check: Result<(), Rejection>) -> Result<(), Rejection> {
        let verdict = self.rules.validate(name).and(value_check);
        if let Err(reason) = &verdict {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(name = %name, reason = reason.code(), "observation rejected");
        }
        verdict
    }

    // Lock poisoning can only follow a panic inside a map update; the maps
    // themselves stay consistent, so keep serving.
    fn read(&self) -> RwLockReadGuard<'_, Epoch> {
        self.live.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate() {
        let c = Collector::default();
        c.increment("rack.request.total", 1).unwrap();
        c.increment("rack.request.total", 4).unwrap();
        c.increment("rack.request.slow", 0).unwrap();
        let snap = c.snapshot_and_clear();
        assert_eq!(snap.counter("rack.request.total"), Some(5));
        assert_eq!(snap.counter("rack.request.slow"), Some(0));
    }

    #[test]
    fn timing_records_sufficient_stats() {
        let c = Collector::default();
        for v in [10.0, 20.0, 30.0] {
            c.timing("rack.request.time", v).unwrap();
        }
        let snap = c.snapshot_and_clear();
        let t = snap.timing("rack.request.time").unwrap();
        assert_eq!((t.count, t.sum, t.min, t.max), (3, 60.0, 10.0, 30.0));
    }

    #[test]
    fn counter_and_timing_may_share_a_name() {
        let c = Collector::default();
        c.increment("db.query", 1).unwrap();
        c.measure("db.query", -2.5).unwrap();
        let snap = c.snapshot_and_clear();
        assert_eq!(snap.counter("db.query"), Some(1));
        assert_eq!(snap.timing("db.query").unwrap().min, -2.5);
    }

    #[test]
    fn rejected_observations_are_counted_not_stored() {
        let c = Collector::default();
        assert_eq!(c.increment("", 1), Err(Rejection::Empty));
        assert!(c.increment("bad name", 1).is_err());
        assert!(c.timing("ok", -1.0).is_err());
        assert!(c.measure("ok", f64::NAN).is_err());
        assert!(c.increment("ok", -3).is_err());

        assert_eq!(c.rejected_count(), 5);
        assert!(c.is_empty());
        assert!(c.snapshot_and_clear().is_empty());
    }

    #[test]
    fn snapshot_clears_live_epoch() {
        let c = Collector::default();
        c.increment("a", 1).unwrap();
        c.timing("b", 1.0).unwrap();
        assert_eq!(c.len(), 2);

        let first = c.snapshot_and_clear();
        assert_eq!(first.len(), 2);
        assert!(c.is_empty());

        c.increment("a", 2).unwrap();
        let second = c.snapshot_and_clear();
        assert_eq!(second.counter("a"), Some(2));
        assert_eq!(second.timing("b"), None);
    }
}
