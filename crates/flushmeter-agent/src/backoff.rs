//! Bounded exponential back-off for batch delivery.

use std::time::Duration;

/// Retry limits for one epoch's delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total submissions per epoch, first attempt included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Back-off state for a single epoch.
///
/// Each call to `next_wait` doubles the wait (capped at `max_backoff`) and
/// returns `None` once `max_attempts` submissions have been spent.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    current_wait: Duration,
    attempts: u32,
}

impl Backoff {
    /// Starts with the first submission already counted.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current_wait: policy.initial_backoff,
            attempts: 1,
        }
    }

    /// Wait before the next submission, or `None` when attempts are spent.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let wait = self.current_wait.min(self.policy.max_backoff);
        self.current_wait = (self.current_wait * 2).min(self.policy.max_backoff);
        self.attempts += 1;
        Some(wait)
    }

    /// Submissions made or granted so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_caps() {
        let mut bo = Backoff::new(RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        });
        assert_eq!(bo.attempts(), 1);
        assert_eq!(bo.next_wait(), Some(Duration::from_millis(100)));
        assert_eq!(bo.next_wait(), Some(Duration::from_millis(200)));
        assert_eq!(bo.next_wait(), Some(Duration::from_millis(400)));
        assert_eq!(bo.next_wait(), Some(Duration::from_millis(500)));
        assert_eq!(bo.next_wait(), Some(Duration::from_millis(500)));
        assert_eq!(bo.attempts(), 6);
        assert_eq!(bo.next_wait(), None);
    }

    #[test]
    fn single_attempt_never_retries() {
        let mut bo = Backoff::new(RetryPolicy { max_attempts: 1, ..RetryPolicy::default() });
        assert_eq!(bo.next_wait(), None);
    }
}
