//! Per-request instrumentation for web frameworks.
//!
//! Produces the `rack.request.*` family:
//! - `rack.request.total`, `rack.request.time`, `rack.request.slow`
//! - `rack.request.status.<code>` and `.<code>.time`
//! - `rack.request.status.<N>xx` and `.<N>xx.time`
//! - `rack.request.exceptions`
//!
//! Recording never changes the outcome of the request: failures and panics
//! are observed and then handed back to the caller untouched.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;

use crate::tracker::{Instrument, Tracker};

pub const REQUEST_GROUP: &str = "rack.request";
pub const EXCEPTIONS: &str = "rack.request.exceptions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSettings {
    /// `false` disables request metrics only; explicit tracker calls still record.
    pub enabled: bool,
    pub slow_threshold: Duration,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_threshold: Duration::from_millis(200),
        }
    }
}

#[derive(Clone)]
pub struct RequestMetrics {
    tracker: Tracker,
    settings: RequestSettings,
}

impl RequestMetrics {
    pub fn new(tracker: Tracker, settings: RequestSettings) -> Self {
        Self { tracker, settings }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Record one completed request.
    pub fn record(&self, status: u16, duration: Duration) {
        if !self.settings.enabled {
            return;
        }
        let millis = duration.as_micros() as f64 / 1000.0;
        let slow = duration > self.settings.slow_threshold;
        let class = status / 100;

        self.tracker.group(REQUEST_GROUP, |g| {
            g.increment("total");
            g.timing("time", millis);
            if slow {
                g.increment("slow");
            }

            g.group("status", |s| {
                s.increment(&status.to_string());
                s.increment(&format!("{class}xx"));
                s.timing(&format!("{status}.time"), millis);
                s.timing(&format!("{class}xx.time"), millis);
            });
        });
    }

    pub fn record_exception(&self) {
        if self.settings.enabled {
            self.tracker.increment(EXCEPTIONS);
        }
    }

    /// Time a fallible request body. `Ok` values are recorded with the status
    /// picked by `status_of`; `Err` values count as exceptions. The result is
    /// returned unchanged either way.
    pub fn observe<T, E>(
        &self,
        body: impl FnOnce() -> Result<T, E>,
        status_of: impl FnOnce(&T) -> u16,
    ) -> Result<T, E> {
        self.tracker.check_worker();
        let started = Instant::now();
        let result = body();
        match &result {
            Ok(value) => self.record(status_of(value), started.elapsed()),
            Err(_) => self.record_exception(),
        }
        result
    }
}

/// axum middleware:
/// `Router::new().layer(axum::middleware::from_fn_with_state(metrics, track_requests))`.
///
/// A panicking handler is counted as an exception and the panic resumes
/// unchanged.
pub async fn track_requests(State(metrics): State<RequestMetrics>, req: Request, next: Next) -> Response {
    metrics.tracker().check_worker();
    let started = Instant::now();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => {
            metrics.record(response.status().as_u16(), started.elapsed());
            response
        }
        Err(panic) => {
            metrics.record_exception();
            std::panic::resume_unwind(panic)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tracker::TrackerSettings;
    use crate::transport::LogTransport;

    fn metrics(settings: RequestSettings) -> RequestMetrics {
        let tracker = Tracker::new(TrackerSettings::default(), Arc::new(LogTransport));
        RequestMetrics::new(tracker, settings)
    }

    #[test]
    fn record_emits_request_family() {
        let m = metrics(RequestSettings::default());
        m.record(200, Duration::from_millis(50));
        m.record(503, Duration::from_millis(250));

        let snap = m.tracker().collector().snapshot_and_clear();
        assert_eq!(snap.counter("rack.request.total"), Some(2));
        assert_eq!(snap.counter("rack.request.slow"), Some(1));
        assert_eq!(snap.counter("rack.request.status.200"), Some(1));
        assert_eq!(snap.counter("rack.request.status.2xx"), Some(1));
        assert_eq!(snap.counter("rack.request.status.503"), Some(1));
        assert_eq!(snap.counter("rack.request.status.5xx"), Some(1));
        assert_eq!(snap.timing("rack.request.time").map(|t| t.count), Some(2));
        assert_eq!(snap.timing("rack.request.status.503.time").map(|t| t.max), Some(250.0));
        assert_eq!(snap.timing("rack.request.status.2xx.time").map(|t| t.sum), Some(50.0));
    }

    #[test]
    fn observe_counts_errors_and_returns_them_unchanged() {
        let m = metrics(RequestSettings::default());

        let ok: Result<u16, String> = m.observe(|| Ok(201), |s| *s);
        assert_eq!(ok, Ok(201));
        let err: Result<u16, String> = m.observe(|| Err("db down".to_string()), |s| *s);
        assert_eq!(err, Err("db down".to_string()));

        let snap = m.tracker().collector().snapshot_and_clear();
        assert_eq!(snap.counter("rack.request.status.201"), Some(1));
        assert_eq!(snap.counter(EXCEPTIONS), Some(1));
        assert_eq!(snap.counter("rack.request.total"), Some(1));
    }

    #[test]
    fn disabled_request_metrics_leave_tracker_usable() {
        let m = metrics(RequestSettings { enabled: false, ..RequestSettings::default() });
        m.record(200, Duration::from_millis(1));
        m.record_exception();
        m.tracker().increment("manual");

        let snap = m.tracker().collector().snapshot_and_clear();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.counter("manual"), Some(1));
    }
}
