//! Delivery outcome and retry policy shared by the outbound adapters.
//!
//! # Retry Strategy
//!
//! - Network errors and 5xx responses: retry with backoff
//! - 4xx responses: no retry
//! - Delays: `base_delay_ms * 2^(attempt - 1)` (1s, 2s, 4s by default)

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Retry configuration for outbound delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryConfig {
    /// Delay in milliseconds before retrying after `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let shift = (attempt - 1).min(10);
        self.base_delay_ms.saturating_mul(1u64 << shift)
    }

    /// Request timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Result of a delivery, after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Whether the delivery was successful.
    pub success: bool,

    /// HTTP status code (if available).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Number of attempts made.
    pub attempts: u32,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    /// Creates a successful delivery result.
    #[must_use]
    pub const fn success(status_code: u16, attempts: u32, duration_ms: u64) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            attempts,
            duration_ms,
            error: None,
        }
    }

    /// Creates a failed delivery result.
    #[must_use]
    pub const fn failure(
        status_code: Option<u16>,
        error: String,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            status_code,
            attempts,
            duration_ms,
            error: Some(error),
        }
    }

    /// Metric label for this outcome.
    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        if self.success { "delivered" } else { "failed" }
    }
}

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttemptError {
    pub status: Option<u16>,
    pub message: String,
}

impl AttemptError {
    pub(crate) fn transport(err: &reqwest::Error) -> Self {
        Self {
            status: None,
            message: format!("HTTP request failed: {err}"),
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            message: format!("HTTP {status} response"),
        }
    }

    const fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
    }
}

/// Runs `attempt` until it succeeds, fails with a 4xx, or retries run out.
///
/// Blocks the calling thread between attempts; only call from blocking
/// contexts.
pub(crate) fn deliver_with_retry(
    retry: &RetryConfig,
    target: &str,
    mut attempt: impl FnMut() -> Result<u16, AttemptError>,
) -> DeliveryResult {
    let start = Instant::now();
    let max_attempts = retry.max_retries + 1;
    let mut last_error = AttemptError {
        status: None,
        message: "no attempt made".to_string(),
    };

    for n in 1..=max_attempts {
        match attempt() {
            Ok(status) => return DeliveryResult::success(status, n, elapsed_ms(start)),
            Err(error) => {
                if error.is_client_error() || n == max_attempts {
                    return DeliveryResult::failure(
                        error.status,
                        error.message,
                        n,
                        elapsed_ms(start),
                    );
                }
                let delay_ms = retry.delay_for_attempt(n);
                tracing::warn!(
                    target_name = target,
                    attempt = n,
                    delay_ms,
                    error = %error.message,
                    "Delivery failed, retrying"
                );
                last_error = error;
                std::thread::sleep(Duration::from_millis(delay_ms));
            },
        }
    }

    DeliveryResult::failure(
        last_error.status,
        last_error.message,
        max_attempts,
        elapsed_ms(start),
    )
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), 0);
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
    }

    #[test]
    fn test_delay_caps_shift() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(50), config.delay_for_attempt(11));
    }

    #[test]
    fn test_retries_server_errors_then_succeeds() {
        let calls = Cell::new(0);
        let result = deliver_with_retry(&fast(), "acme/web", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(AttemptError::status(503))
            } else {
                Ok(201)
            }
        });
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.status_code, Some(201));
    }

    #[test]
    fn test_client_error_is_not_retried() {
        let calls = Cell::new(0);
        let result = deliver_with_retry(&fast(), "acme/web", || {
            calls.set(calls.get() + 1);
            Err(AttemptError::status(404))
        });
        assert!(!result.success);
        assert_eq!(calls.get(), 1);
        assert_eq!(result.status_code, Some(404));
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let result = deliver_with_retry(&fast(), "acme/web", || Err(AttemptError::status(500)));
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.status_label(), "failed");
        assert_eq!(result.error.as_deref(), Some("HTTP 500 response"));
    }
}
