//! Immutable epoch snapshots.

use std::collections::BTreeMap;

use serde::Serialize;

/// Sufficient statistics for a timing or measured value within one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingStats {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
}

impl TimingStats {
    /// Stats for a single sample.
    pub fn new(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
            sum_squares: value * value,
        }
    }

    pub fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum_squares += value * value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }
}

/// Everything observed in one epoch, owned by whoever took it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub counters: BTreeMap<String, i64>,
    pub timings: BTreeMap<String, TimingStats>,
    /// Wall-clock second at which the epoch was closed.
    pub taken_at_unix: u64,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.timings.is_empty()
    }

    /// Number of entries across both maps.
    pub fn len(&self) -> usize {
        self.counters.len() + self.timings.len()
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.get(name).copied()
    }

    pub fn timing(&self, name: &str) -> Option<&TimingStats> {
        self.timings.get(name)
    }

    /// Drop entries whose name fails `keep`; returns how many were removed.
    pub fn retain_names(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.len();
        self.counters.retain(|name, _| keep(name.as_str()));
        self.timings.retain(|name, _| keep(name.as_str()));
        before - self.len()
    }
}
