// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry Manager (component C): exponential backoff with jitter and
//! transient/permanent error classification.
//!
//! Grounded on the retry manager in the source this spec was distilled
//! from — the pattern catalogues and backoff formula are carried over
//! near-verbatim.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classification of an error for retry-eligibility purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Transient,
    Permanent,
    Timeout,
    Unknown,
}

const TRANSIENT_ERROR_PATTERNS: &[&str] = &[
    "connection refused",
    "connection timeout",
    "connection reset",
    "connection aborted",
    "connection error",
    "temporary failure in name resolution",
    "network is unreachable",
    "host is unreachable",
    "no route to host",
    "429 too many requests",
    "500 internal server error",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
    "lock wait timeout exceeded",
    "deadlock found",
    "too many connections",
    "connection pool exhausted",
    "database is locked",
    "rate limit exceeded",
    "quota exceeded",
    "throttled",
    "too many requests",
    "timeout",
    "timed out",
    "deadline exceeded",
];

const PERMANENT_ERROR_PATTERNS: &[&str] = &[
    "authentication failed",
    "unauthorized",
    "forbidden",
    "not found",
    "permission denied",
    "invalid argument",
    "invalid input",
    "validation error",
    "schema validation failed",
    "bad request",
    "invalid api key",
];

/// Classifies an error message. Timeout takes precedence over permanent
/// patterns (an error string containing both "timeout" and, say, "invalid
/// argument" is still a timeout); permanent patterns are then checked
/// before transient ones; anything unmatched is `Unknown`.
pub fn classify_error(message: &str) -> ErrorType {
    let lower = message.to_lowercase();
    if lower.contains("timeout") {
        return ErrorType::Timeout;
    }
    if PERMANENT_ERROR_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorType::Permanent;
    }
    if TRANSIENT_ERROR_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorType::Transient;
    }
    ErrorType::Unknown
}

/// Retry behavior configuration (spec §3 `Step.errorHandling`).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub retry_count: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
    pub retry_on_timeout: bool,
    pub retry_on_transient_only: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: 0,
            base_delay: Duration::from_secs_f64(1.0),
            max_delay: Duration::from_secs_f64(60.0),
            exponential_base: 2.0,
            jitter: true,
            retry_on_timeout: true,
            retry_on_transient_only: true,
        }
    }
}

/// One retry attempt's bookkeeping.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub error_type: ErrorType,
    pub error_message: String,
    pub delay_ms: u64,
}

/// Summary of a completed `execute_with_retry` call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetryMetadata {
    pub total_attempts: u32,
    pub successful: bool,
    pub final_error: Option<String>,
    pub final_error_type: Option<ErrorType>,
    pub total_delay_ms: u64,
    pub attempts: Vec<RetryAttempt>,
}

/// `delay = min(base * exponential_base^attempt, max)`, optionally
/// scaled by a uniform `[0.5, 1.0)` jitter factor.
pub fn calculate_backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let raw = config.base_delay.as_secs_f64() * config.exponential_base.powi(attempt as i32);
    let capped = raw.min(config.max_delay.as_secs_f64());
    let scaled = if config.jitter {
        let jitter_factor = 0.5 + rand::thread_rng().gen::<f64>() * 0.5;
        capped * jitter_factor
    } else {
        capped
    };
    Duration::from_secs_f64(scaled.max(0.0))
}

/// Whether an error occurring on `attempt` (1-based) should be retried.
pub fn should_retry(attempt: u32, config: &RetryConfig, error_type: ErrorType) -> bool {
    if attempt > config.retry_count {
        return false;
    }
    match error_type {
        ErrorType::Permanent => false,
        ErrorType::Timeout => config.retry_on_timeout,
        ErrorType::Unknown => !config.retry_on_transient_only,
        ErrorType::Transient => true,
    }
}

/// Runs `op` (a factory producing a fresh future per attempt) under the
/// retry policy, sleeping between attempts per `calculate_backoff_delay`.
/// `classify` maps the error type `E` to an `(ErrorType, message)` pair —
/// callers typically implement this via `Display`/`ToString` plus
/// [`classify_error`].
pub async fn execute_with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    classify: impl Fn(&E) -> (ErrorType, String),
    mut op: F,
) -> Result<(T, RetryMetadata), (E, RetryMetadata)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut metadata = RetryMetadata {
        total_attempts: 0,
        successful: false,
        final_error: None,
        final_error_type: None,
        total_delay_ms: 0,
        attempts: Vec::new(),
    };

    let max_attempts = 1 + config.retry_count;
    let mut attempt = 1;
    loop {
        metadata.total_attempts = attempt;
        match op().await {
            Ok(value) => {
                metadata.successful = true;
                return Ok((value, metadata));
            }
            Err(error) => {
                let (error_type, message) = classify(&error);
                if attempt < max_attempts && should_retry(attempt, config, error_type) {
                    let delay = calculate_backoff_delay(attempt, config);
                    metadata.total_delay_ms += delay.as_millis() as u64;
                    metadata.attempts.push(RetryAttempt {
                        attempt_number: attempt + 1,
                        error_type,
                        error_message: message,
                        delay_ms: delay.as_millis() as u64,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                metadata.successful = false;
                metadata.final_error = Some(message);
                metadata.final_error_type = Some(error_type);
                return Err((error, metadata));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn classifies_timeout_before_permanent() {
        assert_eq!(classify_error("request timed out"), ErrorType::Timeout);
    }

    #[test]
    fn classifies_permanent_patterns() {
        assert_eq!(classify_error("401 unauthorized"), ErrorType::Permanent);
        assert_eq!(classify_error("validation error: bad field"), ErrorType::Permanent);
    }

    #[test]
    fn classifies_transient_patterns() {
        assert_eq!(classify_error("503 service unavailable"), ErrorType::Transient);
    }

    #[test]
    fn classifies_unknown_when_unmatched() {
        assert_eq!(classify_error("something odd happened"), ErrorType::Unknown);
    }

    #[test]
    fn backoff_delay_is_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs_f64(5.0),
            ..Default::default()
        };
        let delay = calculate_backoff_delay(10, &config);
        assert!(delay.as_secs_f64() <= 5.0 + 1e-9);
    }

    #[test]
    fn should_retry_respects_retry_count() {
        let config = RetryConfig { retry_count: 2, ..Default::default() };
        assert!(should_retry(1, &config, ErrorType::Transient));
        assert!(should_retry(2, &config, ErrorType::Transient));
        assert!(!should_retry(3, &config, ErrorType::Transient));
    }

    #[test]
    fn should_retry_never_retries_permanent() {
        let config = RetryConfig { retry_count: 5, ..Default::default() };
        assert!(!should_retry(1, &config, ErrorType::Permanent));
    }

    #[tokio::test]
    async fn execute_with_retry_succeeds_after_transient_failures() {
        let config = RetryConfig {
            retry_count: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        };
        let calls = Cell::new(0);
        let result = execute_with_retry(
            &config,
            |e: &String| (classify_error(e), e.clone()),
            || {
                let n = calls.get();
                calls.set(n + 1);
                async move {
                    if n < 2 {
                        Err("503 service unavailable".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        let (value, metadata) = result.unwrap();
        assert_eq!(value, 42);
        assert_eq!(metadata.total_attempts, 3);
        assert!(metadata.successful);
    }

    #[tokio::test]
    async fn execute_with_retry_stops_on_permanent_error() {
        let config = RetryConfig {
            retry_count: 3,
            base_delay: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        };
        let calls = Cell::new(0);
        let result = execute_with_retry(
            &config,
            |e: &String| (classify_error(e), e.clone()),
            || {
                calls.set(calls.get() + 1);
                async { Err::<i32, _>("403 forbidden".to_string()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
