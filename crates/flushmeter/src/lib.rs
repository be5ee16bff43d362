//! Top-level facade crate for flushmeter.
//!
//! Re-exports the core aggregation types and the agent runtime so users can depend on a single crate.

pub mod core {
    pub use flushmeter_core::*;
}

pub mod agent {
    pub use flushmeter_agent::*;
}

pub use flushmeter_agent::{Group, Instrument, RequestMetrics, Tracker};
