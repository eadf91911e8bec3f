//! Retry with exponential backoff for install against a flaky control plane

use crate::error::{EngineError, Result};
use std::time::Duration;
use vdcflow_config::{RetryScope, RetrySettings};

/// Fixed-attempt exponential backoff
///
/// With the defaults an operation runs at most five times and sleeps 3, 6, 12
/// and 24 seconds in between. There is no sleep after the last attempt; its
/// error is returned unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Factor applied to the delay after every further failure
    pub multiplier: f64,

    /// Which errors are retried at all
    pub scope: RetryScope,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: settings.initial_delay(),
            multiplier: settings.multiplier,
            scope: settings.scope,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    pub fn should_retry(&self, err: &EngineError) -> bool {
        match self.scope {
            RetryScope::Always => true,
            RetryScope::Transient => err.is_transient(),
        }
    }

    /// Delay before the next attempt, or `None` when `err` must be returned
    pub fn backoff(&self, attempt: u32, err: &EngineError) -> Option<Duration> {
        if attempt >= self.max_attempts || !self.should_retry(err) {
            return None;
        }
        Some(self.delay_for_attempt(attempt))
    }
}
