//! Public recording surface.
//!
//! A `Tracker` is constructed once per process and cloned into whatever needs
//! it (it is an `Arc` inside). Observation verbs only validate and update the
//! collector; they never block on I/O and never fail the caller.
//!
//! `group` opens a namespace scope and hands the body a [`Group`], which
//! supports the same verbs through the [`Instrument`] trait, so groups nest to
//! any depth:
//!
//! ```ignore
//! tracker.group("rack.request", |g| {
//!     g.increment("total");
//!     g.group("status", |s| s.increment("200"));
//! });
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use flushmeter_core::{Collector, FlushError, NameRules, Namespace, Result};

use crate::config::FlushmeterConfig;
use crate::queue::{Offer, ValidatingQueue};
use crate::transport::Transport;
use crate::worker::{Worker, WorkerSettings, WorkerState};

/// The capability set shared by the tracker and its scoped groups.
pub trait Instrument {
    fn increment_by(&self, name: &str, delta: i64);

    fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    fn measure(&self, name: &str, value: f64);

    /// Duration sample in milliseconds.
    fn timing(&self, name: &str, millis: f64);

    fn group<R>(&mut self, segment: &str, body: impl FnOnce(&mut Group<'_>) -> R) -> R;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Turns every verb into a no-op.
    pub disabled: bool,
    pub rules: NameRules,
    pub queue_depth: usize,
    /// Global prefix applied to every name before submission.
    pub prefix: Option<String>,
    pub worker: WorkerSettings,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            rules: NameRules::default(),
            queue_depth: 4,
            prefix: None,
            worker: WorkerSettings::default(),
        }
    }
}

/// Point-in-time health of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub rejected_observations: u64,
    pub dropped_epochs: u64,
    pub delivery_failures: u64,
    pub delivered_epochs: u64,
    pub pending_epochs: usize,
    pub worker_state: WorkerState,
}

struct TrackerInner {
    enabled: bool,
    collector: Arc<Collector>,
    queue: Arc<ValidatingQueue>,
    worker: Worker,
    managed_host: AtomicBool,
    shut_down: AtomicBool,
    warned_no_runtime: AtomicBool,
}

impl TrackerInner {
    fn increment_by(&self, name: &str, delta: i64) {
        let _ = self.collector.increment(name, delta);
    }

    fn measure(&self, name: &str, value: f64) {
        let _ = self.collector.measure(name, value);
    }

    fn timing(&self, name: &str, millis: f64) {
        let _ = self.collector.timing(name, millis);
    }
}

#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Tracker {
    pub fn new(settings: TrackerSettings, transport: Arc<dyn Transport>) -> Self {
        let collector = Arc::new(Collector::new(settings.rules.clone()));
        let queue = Arc::new(ValidatingQueue::new(
            settings.queue_depth,
            settings.rules,
            settings.prefix,
        ));
        let worker = Worker::new(settings.worker, Arc::clone(&collector), Arc::clone(&queue), transport);

        Self {
            inner: Arc::new(TrackerInner {
                enabled: !settings.disabled,
                collector,
                queue,
                worker,
                managed_host: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                warned_no_runtime: AtomicBool::new(false),
            }),
        }
    }

    /// Build from a loaded (and validated) config file.
    pub fn from_config(cfg: &FlushmeterConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(cfg.tracker_settings(), transport)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    pub fn increment_by(&self, name: &str, delta: i64) {
        if self.inner.enabled {
            self.inner.increment_by(name, delta);
        }
    }

    pub fn measure(&self, name: &str, value: f64) {
        if self.inner.enabled {
            self.inner.measure(name, value);
        }
    }

    pub fn timing(&self, name: &str, millis: f64) {
        if self.inner.enabled {
            self.inner.timing(name, millis);
        }
    }

    /// Run `body` inside the namespace `segment`. The frame is popped on every
    /// exit path and whatever `body` returns is passed back unchanged.
    pub fn group<R>(&self, segment: &str, body: impl FnOnce(&mut Group<'_>) -> R) -> R {
        let mut root = Namespace::new();
        if !self.inner.enabled {
            return body(&mut Group { inner: &*self.inner, ns: &mut root });
        }
        let mut frame = root.enter(segment);
        let mut group = Group { inner: &*self.inner, ns: &mut *frame };
        body(&mut group)
    }

    /// Start the worker if it is not running. Cheap; meant to be called on
    /// every request.
    pub fn check_worker(&self) {
        let inner = &*self.inner;
        if !inner.enabled
            || inner.shut_down.load(Ordering::Acquire)
            || inner.warned_no_runtime.load(Ordering::Relaxed)
        {
            return;
        }
        if inner.worker.state() != WorkerState::Stopped {
            return;
        }
        if let Err(e) = inner.worker.start() {
            if !inner.warned_no_runtime.swap(true, Ordering::Relaxed) {
                tracing::warn!(error = %e, code = e.code(), "flush worker not started");
            }
        }
    }

    /// Explicit start hook for the host's startup sequence. Also the only way
    /// to start the worker once `check_worker` has found no runtime.
    pub fn start(&self) -> Result<bool> {
        if !self.inner.enabled {
            return Err(FlushError::Config("metrics are disabled".into()));
        }
        self.inner.shut_down.store(false, Ordering::Release);
        self.inner.worker.start()
    }

    /// Shutdown hook: stop the worker after a bounded final flush.
    /// `check_worker` will not restart it afterwards.
    pub async fn stop(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.inner.worker.stop().await;
    }

    /// Close the current epoch now instead of waiting for the next tick.
    pub fn flush_now(&self) -> Offer {
        self.inner.worker.flush_now()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.inner.worker.state()
    }

    /// Flag set by the framework layer when it detects a managed host.
    pub fn set_managed_host(&self, managed: bool) {
        self.inner.managed_host.store(managed, Ordering::Relaxed);
    }

    pub fn is_managed_host(&self) -> bool {
        self.inner.managed_host.load(Ordering::Relaxed)
    }

    pub fn collector(&self) -> &Collector {
        &self.inner.collector
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let inner = &*self.inner;
        let stats = inner.worker.stats();
        Diagnostics {
            rejected_observations: inner.collector.rejected_count() + inner.queue.invalid_count(),
            dropped_epochs: inner.queue.dropped_count(),
            delivery_failures: stats.delivery_failures,
            delivered_epochs: stats.delivered_epochs,
            pending_epochs: inner.queue.len(),
            worker_state: inner.worker.state(),
        }
    }
}

impl Instrument for Tracker {
    fn increment_by(&self, name: &str, delta: i64) {
        Tracker::increment_by(self, name, delta);
    }

    fn measure(&self, name: &str, value: f64) {
        Tracker::measure(self, name, value);
    }

    fn timing(&self, name: &str, millis: f64) {
        Tracker::timing(self, name, millis);
    }

    fn group<R>(&mut self, segment: &str, body: impl FnOnce(&mut Group<'_>) -> R) -> R {
        Tracker::group(self, segment, body)
    }
}

/// Scoped accessor bound to one namespace frame.
pub struct Group<'a> {
    inner: &'a TrackerInner,
    ns: &'a mut Namespace,
}

impl Group<'_> {
    /// Fully qualified name for `leaf` in this scope.
    pub fn resolve(&self, leaf: &str) -> String {
        self.ns.resolve(leaf)
    }
}

impl Instrument for Group<'_> {
    fn increment_by(&self, name: &str, delta: i64) {
        if self.inner.enabled {
            self.inner.increment_by(&self.ns.resolve(name), delta);
        }
    }

    fn measure(&self, name: &str, value: f64) {
        if self.inner.enabled {
            self.inner.measure(&self.ns.resolve(name), value);
        }
    }

    fn timing(&self, name: &str, millis: f64) {
        if self.inner.enabled {
            self.inner.timing(&self.ns.resolve(name), millis);
        }
    }

    fn group<R>(&mut self, segment: &str, body: impl FnOnce(&mut Group<'_>) -> R) -> R {
        if !self.inner.enabled {
            return body(self);
        }
        let mut frame = self.ns.enter(segment);
        let mut child = Group { inner: self.inner, ns: &mut *frame };
        body(&mut child)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transport::LogTransport;

    fn tracker() -> Tracker {
        Tracker::new(TrackerSettings::default(), Arc::new(LogTransport))
    }

    #[test]
    fn group_resolves_nested_names() {
        let t = tracker();
        t.group("a", |a| {
            assert_eq!(a.resolve("x"), "a.x");
            a.group("b", |b| {
                assert_eq!(b.resolve("c"), "a.b.c");
                b.increment("c");
            });
        });
        t.increment("c");

        let snap = t.collector().snapshot_and_clear();
        assert_eq!(snap.counter("a.b.c"), Some(1));
        assert_eq!(snap.counter("c"), Some(1));
    }

    #[test]
    fn disabled_tracker_records_nothing_but_runs_bodies() {
        let settings = TrackerSettings { disabled: true, ..TrackerSettings::default() };
        let t = Tracker::new(settings, Arc::new(LogTransport));
        let ran = t.group("g", |g| {
            g.increment("x");
            g.timing("y", 1.0);
            true
        });
        t.increment("z");
        t.check_worker();

        assert!(ran);
        assert!(t.collector().is_empty());
        assert_eq!(t.worker_state(), WorkerState::Stopped);
        assert!(t.start().is_err());
    }

    #[test]
    fn disabled_groups_push_no_frames() {
        let settings = TrackerSettings { disabled: true, ..TrackerSettings::default() };
        let t = Tracker::new(settings, Arc::new(LogTransport));
        t.group("outer", |g| {
            assert_eq!(g.resolve("x"), "x");
            g.group("inner", |i| assert_eq!(i.resolve("y"), "y"));
        });
    }

    #[test]
    fn check_worker_stops_probing_after_missing_runtime() {
        let t = tracker();
        t.check_worker();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            t.check_worker();
            assert_eq!(t.worker_state(), WorkerState::Stopped);
            assert!(t.start().unwrap());
            assert_eq!(t.worker_state(), WorkerState::Running);
            t.stop().await;
        });
    }

    #[test]
    fn check_worker_without_runtime_keeps_recording() {
        let t = tracker();
        t.check_worker();
        t.check_worker();
        assert_eq!(t.worker_state(), WorkerState::Stopped);
        t.increment("still.counted");
        assert_eq!(t.collector().len(), 1);
    }

    #[test]
    fn managed_host_flag_round_trips() {
        let t = tracker();
        assert!(!t.is_managed_host());
        t.set_managed_host(true);
        assert!(t.clone().is_managed_host());
    }
}
