//! flushmeter core: metric name rules, namespace scoping, and the epoch collector.
//!
//! This crate holds everything on the request path: validation, namespace
//! resolution and the concurrent aggregation store. It carries no runtime or
//! transport dependencies so the hot path never pulls in an executor.
//!
//! # No panics
//! `clippy::panic`, `unwrap_used` and `expect_used` are denied. A refused
//! observation is a `Rejection`, never a crash in the host application.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod collector;
pub mod error;
pub mod name;
pub mod namespace;
pub mod snapshot;

pub use collector::Collector;
pub use error::{FlushError, Rejection, Result, TransportError, TransportErrorKind};
pub use name::NameRules;
pub use namespace::{Frame, Namespace};
pub use snapshot::{Snapshot, TimingStats};
