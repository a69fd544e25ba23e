// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timeout Manager (component D): bounded execution with FAIL/FALLBACK/
//! SKIP strategies and an exactly-once cleanup hook.
//!
//! Grounded on the timeout manager in the source this spec was distilled
//! from (`execute_with_timeout`).

use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};

/// What to do when the deadline expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStrategy {
    /// Propagate a timeout failure.
    Fail,
    /// Substitute a fallback value and report success.
    Fallback,
    /// Report a non-fatal "skip" outcome.
    Skip,
}

/// Per-call timeout configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub timeout: Duration,
    pub strategy: TimeoutStrategy,
    pub fallback_value: Option<Value>,
}

/// Outcome of a timeout-bounded call.
#[derive(Debug, Clone)]
pub struct TimeoutOutcome<T> {
    pub success: bool,
    pub result: Option<T>,
    pub timed_out: bool,
    pub execution_time: Duration,
    pub error_message: Option<String>,
}

/// Runs `op` under a deadline. `cleanup`, if given, runs at most once,
/// only when the deadline actually expires (spec §4.8 step 6's "cleanup
/// hook exactly-once" requirement); its own failure is swallowed — a
/// cleanup problem must never mask the original timeout.
pub async fn execute_with_timeout<T, Fut, C, CFut>(
    config: &TimeoutConfig,
    op: Fut,
    cleanup: Option<C>,
) -> TimeoutOutcome<T>
where
    Fut: Future<Output = Result<T, String>>,
    C: FnOnce() -> CFut,
    CFut: Future<Output = ()>,
{
    let start = Instant::now();
    match tokio::time::timeout(config.timeout, op).await {
        Ok(Ok(value)) => TimeoutOutcome {
            success: true,
            result: Some(value),
            timed_out: false,
            execution_time: start.elapsed(),
            error_message: None,
        },
        Ok(Err(message)) => TimeoutOutcome {
            success: false,
            result: None,
            timed_out: false,
            execution_time: start.elapsed(),
            error_message: Some(message),
        },
        Err(_elapsed) => {
            if let Some(cleanup) = cleanup {
                cleanup().await;
            }
            let execution_time = start.elapsed();
            match config.strategy {
                TimeoutStrategy::Fallback if config.fallback_value.is_some() => TimeoutOutcome {
                    success: true,
                    result: None,
                    timed_out: true,
                    execution_time,
                    error_message: None,
                },
                TimeoutStrategy::Skip => TimeoutOutcome {
                    success: false,
                    result: None,
                    timed_out: true,
                    execution_time,
                    error_message: Some(format!(
                        "step skipped: timeout after {:.1}s",
                        config.timeout.as_secs_f64()
                    )),
                },
                _ => TimeoutOutcome {
                    success: false,
                    result: None,
                    timed_out: true,
                    execution_time,
                    error_message: Some(format!(
                        "timeout after {:.1}s",
                        config.timeout.as_secs_f64()
                    )),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn config(strategy: TimeoutStrategy, fallback: Option<Value>, millis: u64) -> TimeoutConfig {
        TimeoutConfig {
            timeout: Duration::from_millis(millis),
            strategy,
            fallback_value: fallback,
        }
    }

    #[tokio::test]
    async fn successful_call_returns_before_deadline() {
        let outcome = execute_with_timeout(
            &config(TimeoutStrategy::Fail, None, 50),
            async { Ok::<_, String>(7) },
            None::<fn() -> std::future::Ready<()>>,
        )
        .await;
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(7));
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn fail_strategy_reports_timeout_error() {
        let outcome: TimeoutOutcome<i32> = execute_with_timeout(
            &config(TimeoutStrategy::Fail, None, 1),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            },
            None::<fn() -> std::future::Ready<()>>,
        )
        .await;
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert!(outcome.error_message.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn fallback_strategy_reports_success() {
        let outcome: TimeoutOutcome<i32> = execute_with_timeout(
            &config(TimeoutStrategy::Fallback, Some(Value::from(99)), 1),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            },
            None::<fn() -> std::future::Ready<()>>,
        )
        .await;
        assert!(outcome.success);
        assert!(outcome.timed_out);
    }

    #[tokio::test]
    async fn skip_strategy_reports_failure_without_error_propagation() {
        let outcome: TimeoutOutcome<i32> = execute_with_timeout(
            &config(TimeoutStrategy::Skip, None, 1),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            },
            None::<fn() -> std::future::Ready<()>>,
        )
        .await;
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert!(outcome.error_message.unwrap().contains("skipped"));
    }

    #[tokio::test]
    async fn cleanup_runs_exactly_once_on_timeout() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        let _outcome: TimeoutOutcome<i32> = execute_with_timeout(
            &config(TimeoutStrategy::Fail, None, 1),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            },
            Some(|| async move {
                called_clone.store(true, Ordering::SeqCst);
            }),
        )
        .await;
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cleanup_does_not_run_on_success() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();
        let _outcome = execute_with_timeout(
            &config(TimeoutStrategy::Fail, None, 50),
            async { Ok::<_, String>(1) },
            Some(|| async move {
                called_clone.store(true, Ordering::SeqCst);
            }),
        )
        .await;
        assert!(!called.load(Ordering::SeqCst));
    }
}
