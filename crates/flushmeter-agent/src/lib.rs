//! flushmeter agent: the runtime half of the pipeline.
//!
//! - `tracker`: recording surface (`Tracker`, `Group`, `Instrument`)
//! - `queue`: bounded, validating handoff between ticker and sender
//! - `worker`: flush lifecycle with bounded retry
//! - `transport`: batch shape and the delivery seam
//! - `request`: per-request instrumentation and axum middleware
//! - `config`: strict YAML loading

pub mod backoff;
pub mod config;
pub mod env;
pub mod queue;
pub mod request;
pub mod tracker;
pub mod transport;
pub mod worker;

pub use backoff::{Backoff, RetryPolicy};
pub use env::{detect_managed_host, looks_like_managed_host, LogTarget};
pub use queue::{Offer, ValidatingQueue};
pub use request::{track_requests, RequestMetrics, RequestSettings};
pub use tracker::{Diagnostics, Group, Instrument, Tracker, TrackerSettings};
pub use transport::{Batch, CounterEntry, GaugeEntry, LogTransport, Transport};
pub use worker::{Worker, WorkerSettings, WorkerState, WorkerStats};
