//! Exponential backoff used by the supervisor and the RPC transports.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for an exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Maximum number of attempts after the first (`None` = unbounded).
    pub max_retries: Option<u32>,
    /// Delay before the first retry.
    pub initial: Duration,
    /// Cap on the delay.
    pub max: Duration,
    /// Multiplier applied on each retry.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(3),
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Stateless backoff policy: computes the delay for a given attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based), or `None`
    /// once `max_retries` is exceeded.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || self.config.max_retries.is_some_and(|max| attempt > max) {
            return None;
        }
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.config.initial.as_millis() as f64 * self.config.multiplier.powi(exp);
        let capped = base_ms.min(self.config.max.as_millis() as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_exhausted() {
        let b = Backoff::new(BackoffConfig {
            max_retries: Some(3),
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        });
        assert_eq!(b.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(b.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(b.next_delay(3), Some(Duration::from_millis(400)));
        assert!(b.next_delay(4).is_none());
    }

    #[test]
    fn capped_and_unbounded() {
        let b = Backoff::new(BackoffConfig {
            max_retries: None,
            initial: Duration::from_secs(5),
            max: Duration::from_secs(300),
            multiplier: 2.0,
        });
        assert_eq!(b.next_delay(100), Some(Duration::from_secs(300)));
    }
}
