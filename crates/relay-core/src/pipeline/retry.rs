use std::time::Duration;

use crate::config::PipelineConfig;

/// Retry budget and exponential backoff for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            backoff_max,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_retries, config.backoff_base, config.backoff_max)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry - 1),
    /// capped at `backoff_max`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Sum of every backoff delay a step can wait through.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries)
            .map(|retry| self.backoff(retry))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }

    /// Worst-case wall time of one step with the given per-attempt timeout.
    pub fn step_budget(&self, attempt_timeout: Duration) -> Duration {
        attempt_timeout
            .saturating_mul(self.max_attempts())
            .saturating_add(self.total_backoff())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
