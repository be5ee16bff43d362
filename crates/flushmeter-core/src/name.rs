//! Metric name and value admission rules.
//!
//! Names are dot-delimited segments over the alphabet `[A-Za-z0-9.:_-]`.
//! Every check here is pure; the collector runs them before touching any
//! shared state.

use crate::error::Rejection;

/// Default byte limit for a fully resolved metric name.
pub const DEFAULT_MAX_LENGTH: usize = 255;

/// Namespace reserved for the agent's own diagnostics.
pub const DEFAULT_RESERVED_PREFIX: &str = "flushmeter.";

/// Compiled name rules, built once and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRules {
    max_length: usize,
    reserved_prefix: Option<String>,
}

impl Default for NameRules {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH, Some(DEFAULT_RESERVED_PREFIX.to_string()))
    }
}

impl NameRules {
    /// An empty reserved prefix is treated as "none".
    pub fn new(max_length: usize, reserved_prefix: Option<String>) -> Self {
        Self {
            max_length,
            reserved_prefix: reserved_prefix.filter(|p| !p.is_empty()),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn reserved_prefix(&self) -> Option<&str> {
        self.reserved_prefix.as_deref()
    }

    /// Check a fully resolved name.
    pub fn validate(&self, name: &str) -> Result<(), Rejection> {
        if name.is_empty() {
            return Err(Rejection::Empty);
        }
        if name.len() > self.max_length {
            return Err(Rejection::TooLong { len: name.len(), max: self.max_length });
        }

        let mut segment_start = 0;
        for (at, ch) in name.char_indices() {
            if ch == '.' {
                if at == segment_start {
                    return Err(Rejection::EmptySegment { at });
                }
                segment_start = at + 1;
                continue;
            }
            if !is_name_char(ch) {
                return Err(Rejection::InvalidChar { ch, at });
            }
        }
        if segment_start == name.len() {
            return Err(Rejection::EmptySegment { at: segment_start });
        }

        if let Some(prefix) = &self.reserved_prefix {
            if name.starts_with(prefix.as_str()) {
                return Err(Rejection::ReservedPrefix(prefix.clone()));
            }
        }
        Ok(())
    }
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, ':' | '_' | '-')
}

/// Counter deltas: counters only move forward within an epoch.
pub fn validate_delta(delta: i64) -> Result<(), Rejection> {
    if delta < 0 {
        return Err(Rejection::Negative(delta as f64));
    }
    Ok(())
}

/// Generic samples (`measure`): any finite value.
pub fn validate_sample(value: f64) -> Result<(), Rejection> {
    if !value.is_finite() {
        return Err(Rejection::NonFinite);
    }
    Ok(())
}

/// Duration samples (`timing`): finite and non-negative.
pub fn validate_duration(millis: f64) -> Result<(), Rejection> {
    validate_sample(millis)?;
    if millis < 0.0 {
        return Err(Rejection::Negative(millis));
    }
    Ok(())
}
