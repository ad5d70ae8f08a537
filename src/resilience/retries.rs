//! Retry decisions for upstream dispatch.

use std::time::Duration;

use super::backoff::calculate_backoff;
use crate::config::RetryConfig;

/// How an upstream send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No connection was established; nothing reached the origin.
    Connect,
    Timeout,
    Other,
}

impl FailureKind {
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connect
        } else {
            FailureKind::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    /// One original attempt plus one retry.
    pub const MAX_ATTEMPTS: u32 = 2;

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, failure: FailureKind) -> bool {
        self.enabled && attempt < Self::MAX_ATTEMPTS && failure == FailureKind::Connect
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}
