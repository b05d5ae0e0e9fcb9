//! Retry logic with exponential backoff, shared by page fetches and
//! file downloads.
//!
//! When a request fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - temporary failures that may succeed on retry
//! - [`FailureType::Permanent`] - failures that won't succeed regardless of retries
//! - [`FailureType::RateLimited`] - server throttling (retried with backoff)
//!
//! The [`RetryPolicy`] then decides whether to retry based on failure type
//! and attempt count. Backoff doubles per attempt and is capped at 30 seconds;
//! the cap also bounds `Retry-After` values the server sends with 429s.

use std::time::Duration;

use tracing::{debug, warn};

use super::DownloadError;

/// Default maximum attempts (including the initial attempt).
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Backoff cap between attempts (30 seconds).
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Maximum honored Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Classification of request failures.
///
/// Used to determine whether a failed fetch or download should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused,
    /// truncated response body.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 403 Forbidden, invalid URL, local IO errors.
    Permanent,

    /// Server throttling (HTTP 429). Retried; a Retry-After header, when
    /// present, overrides the computed backoff.
    RateLimited,
}

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (0-indexed).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(2^attempt_index, 30) seconds    (attempt_index 0-based)
/// ```
///
/// With the default 3 attempts, failed attempts are followed by delays of
/// 1s and 2s. No jitter term: the engine's randomized pre-attempt delay
/// already de-synchronizes concurrent tasks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Backoff cap.
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            max_delay: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a custom attempt count, clamped to at least 1.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after a failed attempt.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - classification of the failure
    /// * `attempt` - the attempt index that just failed (0-indexed)
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt + 1 >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "attempts exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.backoff_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff for the retry following failed attempt `attempt` (0-indexed):
    /// `min(2^attempt, cap)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let seconds = 2u64.saturating_pow(attempt.min(31));
        Duration::from_secs(seconds).min(self.max_delay)
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type | Rationale |
/// |--------|------|-----------|
/// | 408 | Transient | Request timeout - may succeed |
/// | 429 | RateLimited | Throttled - retry with backoff |
/// | other 4xx | Permanent | Client error - won't succeed on retry |
/// | 5xx | Transient | Server error - may be temporary |
///
/// # Non-HTTP Errors
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Timeout | Transient | Network may recover |
/// | Network | Transient | Server may come back |
/// | SizeMismatch | Transient | Truncated body; full read may succeed |
/// | Io | Permanent | Local file system issue |
/// | InvalidUrl | Permanent | Won't succeed |
/// | Cancelled | Permanent | Caller asked to stop |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_status(*status),
        DownloadError::Timeout { .. } | DownloadError::Network { .. } => FailureType::Transient,
        DownloadError::SizeMismatch { .. } => FailureType::Transient,
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::Cancelled { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
#[must_use]
pub fn classify_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        // Anything else outside the error ranges is unexpected, treat as permanent
        _ => FailureType::Permanent,
    }
}

/// Parses a Retry-After header value into a delay.
///
/// Handles both forms from RFC 7231: integer seconds and HTTP-date. Values
/// are capped at one hour; negative or unparseable values return `None`.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Integer seconds first (most common)
    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    // HTTP-date form
    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            return Some(duration);
        }
        // Date in the past: no delay needed
        return Some(Duration::ZERO);
    }

    debug!(header = header_value, "unparseable Retry-After value");
    None
}
