//! Retry policy for venue and node requests.
//!
//! Failed responses are classified by status. Throttling and transient
//! server errors back off exponentially with optional jitter; everything
//! else fails on the first attempt. Transient failures of non-idempotent
//! requests are not replayed.

use std::time::Duration;

use rand::Rng;
use reqwest::{Method, StatusCode};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};

/// Retry configuration (`http.retry` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First delay, in milliseconds.
    #[serde(default = "default_initial_backoff", with = "duration_ms")]
    pub initial_backoff: Duration,
    /// Delay cap, in milliseconds.
    #[serde(default = "default_max_backoff", with = "duration_ms")]
    pub max_backoff: Duration,
    /// Growth factor between delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Random spread as a fraction of each delay. 0 disables jitter.
    #[serde(default)]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter: 0.0,
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

const fn default_max_backoff() -> Duration {
    Duration::from_secs(10)
}

const fn default_multiplier() -> f64 {
    2.0
}

/// Durations as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as milliseconds.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Handling of a non-success status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 429. Honour `Retry-After`, else back off.
    Throttled,
    /// 408 and gateway / server failures. Back off.
    Transient,
    /// 401 / 403. Credentials or signature rejected.
    Unauthorized,
    /// 404.
    Missing,
    /// Any other client error. The venue rejected the request.
    Rejected,
}

impl StatusClass {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Throttled | Self::Transient)
    }
}

/// Classify a failed response status.
#[must_use]
pub const fn classify(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        429 => StatusClass::Throttled,
        408 | 500 | 502 | 503 | 504 => StatusClass::Transient,
        401 | 403 => StatusClass::Unauthorized,
        404 => StatusClass::Missing,
        _ => StatusClass::Rejected,
    }
}

/// Whether replaying `method` after an unknown outcome has no extra effect.
#[must_use]
pub fn is_idempotent(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::PUT, Method::DELETE].contains(method)
}

/// `Retry-After` in delta-seconds form. HTTP dates are ignored.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Delay sequence for one request.
#[derive(Debug)]
pub struct Backoff {
    attempts: u32,
    max_attempts: u32,
    next: Duration,
    cap: Duration,
    multiplier: f64,
    jitter: f64,
}

impl Backoff {
    /// Start a sequence; the first attempt has not been made yet.
    #[must_use]
    pub const fn new(config: &RetryConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_attempts,
            next: config.initial_backoff,
            cap: config.max_backoff,
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }

    /// Failed attempts recorded so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt fits in the budget.
    #[must_use]
    pub const fn has_remaining(&self) -> bool {
        self.attempts + 1 < self.max_attempts
    }

    /// Record a failed attempt whose delay the server dictated.
    pub const fn consume(&mut self) {
        self.attempts += 1;
    }

    /// Record a failed attempt and return the delay before the next one,
    /// or `None` when the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.has_remaining() {
            self.attempts += 1;
            return None;
        }
        self.attempts += 1;

        let delay = self.next;
        let grown = (delay.as_secs_f64() * self.multiplier).min(self.cap.as_secs_f64());
        self.next = Duration::from_secs_f64(grown);

        if self.jitter > 0.0 {
            let spread = delay.as_secs_f64() * self.jitter;
            let offset = rand::rng().random_range(-spread..=spread);
            return Some(Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0)));
        }
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use test_case::test_case;

    #[test_case(StatusCode::TOO_MANY_REQUESTS, StatusClass::Throttled ; "429 throttled")]
    #[test_case(StatusCode::REQUEST_TIMEOUT, StatusClass::Transient ; "408 transient")]
    #[test_case(StatusCode::BAD_GATEWAY, StatusClass::Transient ; "502 transient")]
    #[test_case(StatusCode::SERVICE_UNAVAILABLE, StatusClass::Transient ; "503 transient")]
    #[test_case(StatusCode::FORBIDDEN, StatusClass::Unauthorized ; "403 unauthorized")]
    #[test_case(StatusCode::NOT_FOUND, StatusClass::Missing ; "404 missing")]
    #[test_case(StatusCode::BAD_REQUEST, StatusClass::Rejected ; "400 rejected")]
    #[test_case(StatusCode::NOT_IMPLEMENTED, StatusClass::Rejected ; "501 rejected")]
    fn classifies_statuses(status: StatusCode, expected: StatusClass) {
        assert_eq!(classify(status), expected);
    }

    #[test_case(Method::GET, true ; "get")]
    #[test_case(Method::DELETE, true ; "delete")]
    #[test_case(Method::PUT, true ; "put")]
    #[test_case(Method::POST, false ; "post")]
    #[test_case(Method::PATCH, false ; "patch")]
    fn idempotent_methods(method: Method, expected: bool) {
        assert_eq!(is_idempotent(&method), expected);
    }

    #[test]
    fn only_throttling_and_transient_errors_retry() {
        assert!(StatusClass::Throttled.is_retryable());
        assert!(StatusClass::Transient.is_retryable());
        assert!(!StatusClass::Rejected.is_retryable());
        assert!(!StatusClass::Missing.is_retryable());
    }

    #[test]
    fn delays_double_until_the_budget_is_spent() {
        let config = RetryConfig {
            max_attempts: 4,
            ..RetryConfig::default()
        };
        let mut backoff = Backoff::new(&config);

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn delays_are_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            multiplier: 10.0,
            jitter: 0.0,
        };
        let mut backoff = Backoff::new(&config);
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn single_attempt_never_retries() {
        let config = RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        };
        let mut backoff = Backoff::new(&config);
        assert!(!backoff.has_remaining());
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn server_dictated_delays_count_against_the_budget() {
        let config = RetryConfig {
            max_attempts: 2,
            ..RetryConfig::default()
        };
        let mut backoff = Backoff::new(&config);
        assert!(backoff.has_remaining());
        backoff.consume();
        assert!(!backoff.has_remaining());
    }

    #[test]
    fn jitter_stays_within_spread() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1000),
            jitter: 0.25,
            ..RetryConfig::default()
        };
        let delay = Backoff::new(&config).next_delay().unwrap();
        assert!(delay >= Duration::from_millis(750));
        assert!(delay <= Duration::from_millis(1250));
    }

    #[test]
    fn reads_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn config_reads_millis() {
        let config: RetryConfig = serde_json::from_str(r#"{"max_attempts": 4, "initial_backoff": 250}"#).unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.max_backoff, Duration::from_secs(10));
    }
}
