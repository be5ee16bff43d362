use std::time::Duration;

use serde::Deserialize;

use flushmeter_core::name::{DEFAULT_MAX_LENGTH, DEFAULT_RESERVED_PREFIX};
use flushmeter_core::{FlushError, NameRules, Result};

use crate::backoff::RetryPolicy;
use crate::request::RequestSettings;
use crate::tracker::TrackerSettings;
use crate::worker::WorkerSettings;

fn bad(msg: impl Into<String>) -> FlushError {
    FlushError::Config(msg.into())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlushmeterConfig {
    pub version: u32,

    #[serde(default)]
    pub tracker: TrackerSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub names: NamesSection,

    #[serde(default)]
    pub request: RequestSection,

    #[serde(default)]
    pub server: ServerSection,
}

impl FlushmeterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(bad(format!("unsupported config version {}", self.version)));
        }
        self.names.validate()?;
        self.tracker.validate(&self.names)?;
        self.retry.validate()?;
        self.request.validate()?;
        Ok(())
    }

    pub fn name_rules(&self) -> NameRules {
        self.names.rules()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        let t = &self.tracker;
        TrackerSettings {
            disabled: t.disabled,
            rules: self.name_rules(),
            queue_depth: t.queue_depth,
            prefix: t.prefix.clone(),
            worker: WorkerSettings {
                flush_interval: Duration::from_millis(t.flush_interval_ms),
                final_flush_timeout: Duration::from_millis(t.final_flush_timeout_ms),
                align_ticks: true,
                retry: self.retry_policy(),
                source: t.source.clone(),
            },
        }
    }

    pub fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            enabled: self.request.enabled,
            slow_threshold: Duration::from_millis(self.request.slow_threshold_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerSection {
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default = "default_final_flush_timeout_ms")]
    pub final_flush_timeout_ms: u64,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default)]
    pub source: Option<String>,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            queue_depth: default_queue_depth(),
            final_flush_timeout_ms: default_final_flush_timeout_ms(),
            disabled: false,
            prefix: None,
            source: None,
        }
    }
}

impl TrackerSection {
    fn validate(&self, names: &NamesSection) -> Result<()> {
        if !(1000..=3_600_000).contains(&self.flush_interval_ms) {
            return Err(bad("tracker.flush_interval_ms must be between 1000 and 3600000"));
        }
        if !(1..=64).contains(&self.queue_depth) {
            return Err(bad("tracker.queue_depth must be between 1 and 64"));
        }
        if !(100..=60_000).contains(&self.final_flush_timeout_ms) {
            return Err(bad("tracker.final_flush_timeout_ms must be between 100 and 60000"));
        }
        if let Some(prefix) = &self.prefix {
            // Reserved namespace does not apply to the prefix.
            NameRules::new(names.max_length, None)
                .validate(prefix)
                .map_err(|r| bad(format!("tracker.prefix is invalid: {r}")))?;
        }
        if self.source.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(bad("tracker.source must not be blank"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetrySection {
    fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(bad("retry.max_attempts must be between 1 and 10"));
        }
        if self.initial_backoff_ms == 0 {
            return Err(bad("retry.initial_backoff_ms must be positive"));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(bad("retry.max_backoff_ms must be >= initial_backoff_ms"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamesSection {
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default = "default_reserved_prefix")]
    pub reserved_prefix: String,
}

impl Default for NamesSection {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            reserved_prefix: default_reserved_prefix(),
        }
    }
}

impl NamesSection {
    fn validate(&self) -> Result<()> {
        if !(16..=1024).contains(&self.max_length) {
            return Err(bad("names.max_length must be between 16 and 1024"));
        }
        Ok(())
    }

    /// An empty `reserved_prefix` disables the reservation.
    pub fn rules(&self) -> NameRules {
        NameRules::new(self.max_length, Some(self.reserved_prefix.clone()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_threshold_ms: default_slow_threshold_ms(),
        }
    }
}

impl RequestSection {
    fn validate(&self) -> Result<()> {
        if self.slow_threshold_ms == 0 {
            return Err(bad("request.slow_threshold_ms must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

fn default_flush_interval_ms() -> u64 {
    60_000
}
fn default_queue_depth() -> usize {
    4
}
fn default_final_flush_timeout_ms() -> u64 {
    5000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    10_000
}
fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}
fn default_reserved_prefix() -> String {
    DEFAULT_RESERVED_PREFIX.into()
}
fn default_true() -> bool {
    true
}
fn default_slow_threshold_ms() -> u64 {
    200
}
fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
