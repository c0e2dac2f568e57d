//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use rede_hierarchy::{DEFAULT_MAX_DEPTH, DEFAULT_PAGE_CAP};
use tracing::warn;

/// Backoff for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
    /// Ceiling for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Fast retries for tests and local runs.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Configuration for a hierarchy engine instance (one tenant).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows requested per closure page; the store may serve fewer.
    pub page_size: usize,

    /// Deepest level any leader may sit at.
    pub max_depth: u32,

    /// Bound on each store round trip and on lock acquisition.
    pub op_timeout: Duration,

    /// Retry policy for transient page fetch failures.
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EngineConfig {
    /// Built-in defaults, ignoring the environment.
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_CAP,
            max_depth: DEFAULT_MAX_DEPTH,
            op_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        let defaults = Self::new();

        let page_size = env_or("REDE_PAGE_SIZE", defaults.page_size);
        let max_depth = env_or("REDE_MAX_DEPTH", defaults.max_depth);
        let op_timeout = Duration::from_millis(env_or(
            "REDE_OP_TIMEOUT_MS",
            defaults.op_timeout.as_millis() as u64,
        ));
        let retry = RetryPolicy {
            max_attempts: env_or("REDE_RETRY_ATTEMPTS", defaults.retry.max_attempts).max(1),
            base_delay: Duration::from_millis(env_or(
                "REDE_RETRY_BASE_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )),
            ..defaults.retry
        };

        Self {
            page_size: page_size.max(1),
            max_depth,
            op_timeout,
            retry,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
