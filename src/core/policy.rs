//! Retry, timeout and liveness policy for workflow steps.
//!
//! The orchestrator declares these per step; the execution engine enforces
//! them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy for failed step attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_interval")]
    pub initial_interval_ms: u64,

    /// Backoff coefficient (delay *= coefficient after each retry)
    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_maximum_interval")]
    pub maximum_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    6
}
fn default_initial_interval() -> u64 {
    1000
}
fn default_backoff_coefficient() -> f64 {
    2.0
}
fn default_maximum_interval() -> u64 {
    100_000
} // 100x the initial interval

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_interval_ms: default_initial_interval(),
            backoff_coefficient: default_backoff_coefficient(),
            maximum_interval_ms: default_maximum_interval(),
        }
    }
}

impl RetryPolicy {
    /// Delay after a failed attempt (1-indexed) before the next one
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_interval_ms.min(self.maximum_interval_ms));
        }

        let delay = self.initial_interval_ms as f64
            * self.backoff_coefficient.powi((attempt - 1) as i32);

        let capped = delay.min(self.maximum_interval_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Everything the engine needs to run one step invocation
#[derive(Debug, Clone, PartialEq)]
pub struct StepOptions {
    pub retry_policy: RetryPolicy,

    /// Upper bound on a single attempt
    pub start_to_close_timeout: Duration,

    /// An attempt with no heartbeat for this long is considered hung
    pub heartbeat_timeout: Duration,

    /// Beat automatically while the attempt runs. When off, the step must
    /// call `ActivityContext::heartbeat` itself.
    pub auto_heartbeat: bool,
}

impl StepOptions {
    pub fn new(
        retry_policy: RetryPolicy,
        start_to_close_timeout: Duration,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            retry_policy,
            start_to_close_timeout,
            heartbeat_timeout,
            auto_heartbeat: true,
        }
    }

    pub fn manual_heartbeat(mut self) -> Self {
        self.auto_heartbeat = false;
        self
    }

    /// Cadence of the automatic heartbeat: a third of the timeout, so two
    /// beats can be missed before the step is declared hung.
    pub fn heartbeat_interval(&self) -> Duration {
        (self.heartbeat_timeout / 3).max(Duration::from_millis(1))
    }
}

/// Policy the connector workflow declares for its steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    #[serde(flatten)]
    pub retry_policy: RetryPolicy,

    /// Preflight start-to-close timeout; longer than the others because the
    /// probe itself may be rate limited
    #[serde(default = "default_preflight_timeout")]
    pub preflight_timeout_seconds: u64,

    /// Start-to-close timeout of the remaining steps
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,

    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
}

fn default_preflight_timeout() -> u64 {
    7200
} // 2 hours
fn default_step_timeout() -> u64 {
    60
}
fn default_heartbeat_timeout() -> u64 {
    300
} // 5 min

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            preflight_timeout_seconds: default_preflight_timeout(),
            step_timeout_seconds: default_step_timeout(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
        }
    }
}

impl WorkflowPolicy {
    pub fn preflight_options(&self) -> StepOptions {
        StepOptions::new(
            self.retry_policy.clone(),
            Duration::from_secs(self.preflight_timeout_seconds),
            Duration::from_secs(self.heartbeat_timeout_seconds),
        )
    }

    pub fn step_options(&self) -> StepOptions {
        StepOptions::new(
            self.retry_policy.clone(),
            Duration::from_secs(self.step_timeout_seconds),
            Duration::from_secs(self.heartbeat_timeout_seconds),
        )
    }
}
