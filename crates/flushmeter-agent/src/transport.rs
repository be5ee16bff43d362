//! Transport seam and the batch wire shape.
//!
//! The agent never talks HTTP itself: a `Transport` receives one `Batch` per
//! epoch and reports success, a transient failure (retried) or a fatal one
//! (epoch discarded).

use async_trait::async_trait;
use serde::Serialize;

use flushmeter_core::{Snapshot, TransportError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterEntry {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeEntry {
    pub name: String,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub sum_squares: f64,
}

/// One epoch, ready to submit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub measure_time: u64,
    pub counters: Vec<CounterEntry>,
    pub gauges: Vec<GaugeEntry>,
}

impl Batch {
    pub fn from_snapshot(snapshot: &Snapshot, source: Option<&str>) -> Self {
        let counters = snapshot
            .counters
            .iter()
            .map(|(name, value)| CounterEntry { name: name.clone(), value: *value })
            .collect();
        let gauges = snapshot
            .timings
            .iter()
            .map(|(name, t)| GaugeEntry {
                name: name.clone(),
                count: t.count,
                sum: t.sum,
                min: t.min,
                max: t.max,
                sum_squares: t.sum_squares,
            })
            .collect();

        Self {
            source: source.map(str::to_string),
            measure_time: snapshot.taken_at_unix,
            counters,
            gauges,
        }
    }

    pub fn len(&self) -> usize {
        self.counters.len() + self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.counters.iter().find(|c| c.name == name).map(|c| c.value)
    }

    pub fn gauge(&self, name: &str) -> Option<&GaugeEntry> {
        self.gauges.iter().find(|g| g.name == name)
    }
}

/// Delivery collaborator used by the worker.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, batch: &Batch) -> Result<(), TransportError>;
}

/// Writes every batch to the log. Never fails.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn submit(&self, batch: &Batch) -> Result<(), TransportError> {
        let body = serde_json::to_string(batch)
            .map_err(|e| TransportError::fatal(format!("json encode failed: {e}")))?;
        tracing::info!(
            counters = batch.counters.len(),
            gauges = batch.gauges.len(),
            measure_time = batch.measure_time,
            %body,
            "metrics batch"
        );
        Ok(())
    }
}
