//! Background flush worker.
//!
//! Two tokio tasks share the handoff queue:
//! - ticker: on each interval, `snapshot_and_clear` + `offer` (synchronous,
//!   so a tick is either fully applied or not started);
//! - sender: `take` + deliver with bounded back-off.
//!
//! Lifecycle: `Stopped -> Running -> Stopping -> Stopped`. Transitions happen
//! under the control mutex; the current state is mirrored in an atomic so
//! per-request `check_worker` calls stay cheap.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use flushmeter_core::{Collector, FlushError, Result, Snapshot};

use crate::backoff::{Backoff, RetryPolicy};
use crate::queue::{Offer, ValidatingQueue};
use crate::transport::{Batch, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Stopped,
    Running,
    Stopping,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerState::Stopped => 0,
            WorkerState::Running => 1,
            WorkerState::Stopping => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub flush_interval: Duration,
    /// Upper bound on the final flush performed by `stop`.
    pub final_flush_timeout: Duration,
    /// Start ticking on the next wall-clock multiple of `flush_interval`.
    pub align_ticks: bool,
    pub retry: RetryPolicy,
    pub source: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(60),
            final_flush_timeout: Duration::from_secs(5),
            align_ticks: true,
            retry: RetryPolicy::default(),
            source: None,
        }
    }
}

#[derive(Default)]
struct DeliveryStats {
    delivered: AtomicU64,
    failures: AtomicU64,
}

/// State shared by the worker handle and its tasks.
struct Shared {
    collector: Arc<Collector>,
    queue: Arc<ValidatingQueue>,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    source: Option<String>,
    stats: DeliveryStats,
    /// Set while the sender holds an epoch taken off the queue.
    in_flight: AtomicBool,
}

impl Shared {
    /// One tick: close the epoch and hand it to the sender.
    fn tick(&self) -> Offer {
        let snapshot = self.collector.snapshot_and_clear();
        if snapshot.is_empty() {
            tracing::trace!("empty epoch, nothing to flush");
            return Offer::Empty;
        }
        let entries = snapshot.len();
        let outcome = self.queue.offer(snapshot);
        match outcome {
            Offer::EvictedOldest => tracing::warn!(
                pending = self.queue.len(),
                dropped_total = self.queue.dropped_count(),
                "sender behind, oldest pending epoch dropped"
            ),
            Offer::Closed => tracing::warn!(entries, "queue closed, epoch dropped"),
            Offer::Accepted | Offer::Empty => {}
        }
        outcome
    }

    async fn deliver(&self, snapshot: Snapshot) {
        let batch = Batch::from_snapshot(&snapshot, self.source.as_deref());
        let mut backoff = Backoff::new(self.retry);

        loop {
            let err = match self.transport.submit(&batch).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(entries = batch.len(), attempts = backoff.attempts(), "epoch delivered");
                    return;
                }
                Err(e) => e,
            };

            let wait = if err.is_transient() { backoff.next_wait() } else { None };
            match wait {
                Some(wait) => {
                    tracing::debug!(error = %err, ?wait, attempt = backoff.attempts(), "delivery failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                None => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %err,
                        attempts = backoff.attempts(),
                        entries = batch.len(),
                        "delivery failed, epoch discarded"
                    );
                    return;
                }
            }
        }
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    ticker: JoinHandle<()>,
    sender: JoinHandle<()>,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub delivered_epochs: u64,
    pub delivery_failures: u64,
}

pub struct Worker {
    shared: Arc<Shared>,
    flush_interval: Duration,
    final_flush_timeout: Duration,
    align_ticks: bool,
    state: AtomicU8,
    control: Mutex<Option<Running>>,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        collector: Arc<Collector>,
        queue: Arc<ValidatingQueue>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                collector,
                queue,
                transport,
                retry: settings.retry,
                source: settings.source,
                stats: DeliveryStats::default(),
                in_flight: AtomicBool::new(false),
            }),
            flush_interval: settings.flush_interval,
            final_flush_timeout: settings.final_flush_timeout,
            align_ticks: settings.align_ticks,
            state: AtomicU8::new(WorkerState::Stopped.as_u8()),
            control: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            delivered_epochs: self.shared.stats.delivered.load(Ordering::Relaxed),
            delivery_failures: self.shared.stats.failures.load(Ordering::Relaxed),
        }
    }

    /// `Stopped -> Running`. Returns `Ok(false)` when already running or
    /// stopping.
    pub fn start(&self) -> Result<bool> {
        let mut control = self.lock_control();
        if self.state() != WorkerState::Stopped {
            return Ok(false);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| FlushError::NoRuntime)?;

        self.shared.queue.reopen();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let ticker = handle.spawn(run_ticker(
            Arc::clone(&self.shared),
            self.first_tick(),
            self.flush_interval,
            shutdown_rx,
        ));
        let sender = handle.spawn(run_sender(Arc::clone(&self.shared)));

        *control = Some(Running { shutdown, ticker, sender });
        self.set_state(WorkerState::Running);
        tracing::info!(interval = ?self.flush_interval, "flush worker started");
        Ok(true)
    }

    /// Force one tick outside the schedule.
    pub fn flush_now(&self) -> Offer {
        self.shared.tick()
    }

    /// `Running -> Stopping -> Stopped`, with a final flush bounded by
    /// `final_flush_timeout`. Calling it again, or while another stop is in
    /// progress, returns immediately.
    pub async fn stop(&self) {
        let running = {
            let mut control = self.lock_control();
            if self.state() != WorkerState::Running {
                return;
            }
            self.set_state(WorkerState::Stopping);
            control.take()
        };
        let Some(Running { shutdown, mut ticker, mut sender }) = running else {
            self.set_state(WorkerState::Stopped);
            return;
        };

        let deadline = Instant::now() + self.final_flush_timeout;
        let _ = shutdown.send(true);

        // The ticker finishes its in-flight tick, takes the final snapshot
        // and closes the queue; the sender then drains it.
        if tokio::time::timeout_at(deadline, &mut ticker).await.is_err() {
            ticker.abort();
            self.shared.queue.close();
        }
        if tokio::time::timeout_at(deadline, &mut sender).await.is_err() {
            sender.abort();
            let _ = (&mut sender).await;
            let aborted_delivery = self.shared.in_flight.swap(false, Ordering::AcqRel);
            if aborted_delivery {
                self.shared.stats.failures.fetch_add(1, Ordering::Relaxed);
            }
            let lost = self.shared.queue.discard_pending();
            tracing::warn!(
                lost,
                aborted_delivery,
                timeout = ?self.final_flush_timeout,
                "final flush timed out"
            );
        }

        let _guard = self.lock_control();
        self.set_state(WorkerState::Stopped);
        tracing::info!("flush worker stopped");
    }

    fn first_tick(&self) -> Instant {
        let now = Instant::now();
        if !self.align_ticks {
            return now + self.flush_interval;
        }
        let interval_ms = self.flush_interval.as_millis().max(1);
        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let into_period = wall_ms % interval_ms;
        let wait_ms = (interval_ms - into_period) as u64;
        now + Duration::from_millis(wait_ms)
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn lock_control(&self) -> MutexGuard<'_, Option<Running>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_ticker(
    shared: Arc<Shared>,
    first: Instant,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(first, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shared.tick();
            }
            _ = shutdown.changed() => break,
        }
    }

    shared.tick();
    shared.queue.close();
}

async fn run_sender(shared: Arc<Shared>) {
    while let Some(snapshot) = shared.queue.take().await {
        shared.in_flight.store(true, Ordering::Release);
        shared.deliver(snapshot).await;
        shared.in_flight.store(false, Ordering::Release);
    }
}
