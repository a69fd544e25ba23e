// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parallel Executor (component H): the heart of the system. Runs a
//! workflow's steps wave-by-wave against a `StepExecutor` registry,
//! threading condition gates, input/output validation, retry, and
//! timeout around each step.

use crate::context::{ExecutionContext, RetryMetadata as CtxRetryMetadata, SharedContext, StepResult, StepStatus};
use crate::dag::WorkflowDAG;
use crate::error::{OrchestratorError, Result};
use crate::providers::StepExecutorRegistry;
use crate::retry::{self, RetryConfig};
use crate::timeout::{self, TimeoutConfig, TimeoutStrategy};
use crate::validation;
use crate::workflow::{OnError, Step, WorkflowDefinition};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Result of running a workflow to completion (spec §4.8).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParallelExecutionResult {
    pub status: ExecutionStatus,
    pub step_results: Vec<StepResult>,
    #[serde(skip)]
    pub execution_context: SharedContext,
    pub total_time_ms: u64,
    pub parallel_speedup: f64,
    pub error_message: Option<String>,
    pub cancelled_at_step: Option<u32>,
}

/// Optional hook invoked as each step starts and finishes, used by the
/// Workflow Orchestrator (J) to run step-level risk-rule evaluation and
/// emit stream events without the executor knowing about either.
pub trait StepObserver: Send + Sync {
    fn on_step_started(&self, _step: &Step) {}
    fn on_step_result(&self, _result: &StepResult) {}
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// An observer that does nothing; the default when the caller does not
/// need step-level callbacks.
pub struct NoopObserver;
impl StepObserver for NoopObserver {}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Runs `workflow` against `input`/`context` using `executors` to dispatch
/// each step by `kind`. `enable_parallel=false` executes every wave in
/// strict step-number order with no concurrency, for debugging (spec
/// §4.8).
pub async fn execute_workflow(
    workflow: &WorkflowDefinition,
    input: Value,
    context: Value,
    executors: &StepExecutorRegistry,
    enable_parallel: bool,
    observer: &dyn StepObserver,
) -> Result<ParallelExecutionResult> {
    let exec_context: SharedContext =
        Arc::new(ExecutionContext::new(input, context, workflow.steps.len()));
    execute_workflow_with_context(workflow, exec_context, executors, enable_parallel, observer).await
}

/// Same as [`execute_workflow`], but against a caller-supplied context.
/// Lets the Workflow Orchestrator (J) register the context for cooperative
/// cancellation (`ExecutionContext::cancel`) before the run starts.
pub async fn execute_workflow_with_context(
    workflow: &WorkflowDefinition,
    exec_context: SharedContext,
    executors: &StepExecutorRegistry,
    enable_parallel: bool,
    observer: &dyn StepObserver,
) -> Result<ParallelExecutionResult> {
    let dag = WorkflowDAG::from_workflow(workflow)?;
    let waves = dag.execution_order()?;
    let speedup = dag.estimate_speedup();

    let start = std::time::Instant::now();

    let mut cancelled_at_step: Option<u32> = None;
    let mut failure_message: Option<String> = None;
    let mut all_results: Vec<StepResult> = Vec::with_capacity(workflow.steps.len());

    'waves: for wave in &waves {
        if exec_context.is_cancelled() {
            break;
        }

        let mut step_numbers = wave.clone();
        if !enable_parallel {
            step_numbers.sort_unstable();
        }

        let mut wave_results: Vec<StepResult> = Vec::with_capacity(step_numbers.len());

        if enable_parallel && step_numbers.len() > 1 {
            for &n in &step_numbers {
                let step = workflow.step(n).expect("validated workflow");
                observer.on_step_started(step);
            }
            let joined = futures::future::join_all(step_numbers.iter().map(|&n| {
                let step = workflow.step(n).expect("validated workflow");
                run_step(step, &exec_context, executors)
            }))
            .await;
            wave_results.extend(joined);
        } else {
            for &n in &step_numbers {
                let step = workflow.step(n).expect("validated workflow");
                observer.on_step_started(step);
                let result = run_step(step, &exec_context, executors).await;
                wave_results.push(result);
            }
        }

        // Single-writer rule: apply outputs in step-number order only
        // after the whole wave has joined (spec §4.8 step 5 / §5).
        wave_results.sort_by_key(|r| r.step_number);
        for result in wave_results {
            let step = workflow.step(result.step_number).expect("validated workflow");
            match result.status {
                StepStatus::Completed => {
                    exec_context.set_output(step.step_number, &step.output_variable, result.output_data.clone());
                }
                StepStatus::Failed => {
                    if step.error_handling.on_error == OnError::Fail {
                        exec_context.cancel();
                        cancelled_at_step = Some(step.step_number);
                        failure_message = result.error_message.clone();
                    }
                }
                StepStatus::Skipped => {}
            }
            observer.on_step_result(&result);
            observer.on_progress(exec_context.completed(), exec_context.total());
            all_results.push(result);
            if exec_context.is_cancelled() {
                break 'waves;
            }
        }
    }

    all_results.sort_by_key(|r| r.step_number);
    let status = if cancelled_at_step.is_some() {
        ExecutionStatus::Failed
    } else if exec_context.is_cancelled() {
        ExecutionStatus::Cancelled
    } else {
        ExecutionStatus::Completed
    };

    Ok(ParallelExecutionResult {
        status,
        step_results: all_results,
        execution_context: exec_context,
        total_time_ms: start.elapsed().as_millis() as u64,
        parallel_speedup: speedup,
        error_message: failure_message,
        cancelled_at_step,
    })
}

fn failed_result(step: &Step, started_at_ms: u64, completed_at_ms: u64, message: String) -> StepResult {
    StepResult {
        step_number: step.step_number,
        step_name: step.step_name.clone(),
        status: StepStatus::Failed,
        output_data: Value::Null,
        error_message: Some(message),
        retry_metadata: None,
        started_at_ms,
        completed_at_ms,
    }
}

/// Runs one step's full life cycle (spec §4.8, steps 1-7).
async fn run_step(step: &Step, ctx: &SharedContext, executors: &StepExecutorRegistry) -> StepResult {
    let started_at_ms = now_ms();

    if ctx.is_cancelled() {
        return skipped(step, started_at_ms);
    }

    let condition_src = step.condition.as_deref().unwrap_or("");
    match ctx.evaluate_condition(condition_src) {
        Ok(true) => {}
        Ok(false) => return skipped(step, started_at_ms),
        Err(_) => return skipped(step, started_at_ms),
    }

    let resolved_input = match resolve_input_mapping(step, ctx) {
        Ok(value) => value,
        Err(e) => return failed_result(step, started_at_ms, now_ms(), e.to_string()),
    };

    let retry_config = RetryConfig {
        retry_count: step.error_handling.retry_count,
        base_delay: Duration::from_secs_f64(step.error_handling.base_delay_sec),
        max_delay: Duration::from_secs_f64(step.error_handling.max_delay_sec),
        exponential_base: 2.0,
        jitter: step.error_handling.jitter,
        retry_on_timeout: step.error_handling.retry_on_timeout,
        retry_on_transient_only: step.error_handling.retry_on_transient_only,
    };
    let timeout_config = TimeoutConfig {
        timeout: Duration::from_secs_f64(step.error_handling.timeout_sec),
        strategy: match step.error_handling.on_error {
            OnError::Fallback => TimeoutStrategy::Fallback,
            OnError::Skip => TimeoutStrategy::Skip,
            OnError::Fail => TimeoutStrategy::Fail,
        },
        fallback_value: step.error_handling.fallback_value.clone(),
    };

    let retry_outcome = retry::execute_with_retry(
        &retry_config,
        |e: &String| (retry::classify_error(e), e.clone()),
        move || {
            let input = resolved_input.clone();
            async move {
                let outcome = timeout::execute_with_timeout(
                    &timeout_config,
                    async move {
                        executors
                            .get(&step.kind)
                            .ok_or_else(|| format!("no StepExecutor registered for kind: {}", step.kind))?
                            .execute(step, input)
                            .await
                    },
                    None::<fn() -> std::future::Ready<()>>,
                )
                .await;
                if outcome.success {
                    Ok(outcome.result.unwrap_or(Value::Null))
                } else {
                    Err(outcome.error_message.unwrap_or_else(|| "step failed".to_string()))
                }
            }
        },
    )
    .await;

    let (retry_result, retry_meta) = match retry_outcome {
        Ok((value, meta)) => (Ok(value), meta),
        Err((error, meta)) => (Err(error), meta),
    };

    let completed_at_ms = now_ms();
    let ctx_retry_meta = if retry_meta.total_attempts > 1 {
        Some(CtxRetryMetadata {
            attempts: retry_meta.total_attempts,
            total_delay_ms: retry_meta.total_delay_ms,
            final_error_classification: retry_meta.final_error_type.map(|t| format!("{:?}", t)),
        })
    } else {
        None
    };

    match retry_result {
        Ok(output) => {
            if let Some(schema) = step.output_schema.as_ref() {
                let result = validation::validate(&output, schema, false);
                if !result.ok() {
                    tracing::warn!(step = step.step_number, issues = ?result.issues, "output schema warnings");
                }
            }
            StepResult {
                step_number: step.step_number,
                step_name: step.step_name.clone(),
                status: StepStatus::Completed,
                output_data: output,
                error_message: None,
                retry_metadata: ctx_retry_meta,
                started_at_ms,
                completed_at_ms,
            }
        }
        Err(error) => match step.error_handling.on_error {
            OnError::Fallback => StepResult {
                step_number: step.step_number,
                step_name: step.step_name.clone(),
                status: StepStatus::Completed,
                output_data: step.error_handling.fallback_value.clone().unwrap_or(Value::Null),
                error_message: Some(error),
                retry_metadata: ctx_retry_meta,
                started_at_ms,
                completed_at_ms,
            },
            OnError::Skip => StepResult {
                step_number: step.step_number,
                step_name: step.step_name.clone(),
                status: StepStatus::Skipped,
                output_data: Value::Null,
                error_message: Some(error),
                retry_metadata: ctx_retry_meta,
                started_at_ms,
                completed_at_ms,
            },
            OnError::Fail => StepResult {
                step_number: step.step_number,
                step_name: step.step_name.clone(),
                status: StepStatus::Failed,
                output_data: Value::Null,
                error_message: Some(error),
                retry_metadata: ctx_retry_meta,
                started_at_ms,
                completed_at_ms,
            },
        },
    }
}

fn skipped(step: &Step, at_ms: u64) -> StepResult {
    StepResult {
        step_number: step.step_number,
        step_name: step.step_name.clone(),
        status: StepStatus::Skipped,
        output_data: Value::Null,
        error_message: None,
        retry_metadata: None,
        started_at_ms: at_ms,
        completed_at_ms: at_ms,
    }
}

fn resolve_input_mapping(step: &Step, ctx: &SharedContext) -> Result<Value> {
    let mut object = serde_json::Map::new();
    for (param, expr) in &step.input_mapping {
        let value = ctx.resolve_expression(expr).map_err(|e| {
            OrchestratorError::UnresolvedVariable(format!("{}.{}: {}", step.step_name, param, e))
        })?;
        object.insert(param.clone(), value);
    }
    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StepExecutor;
    use crate::workflow::ErrorHandling;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    struct EchoExecutor;
    #[async_trait]
    impl StepExecutor for EchoExecutor {
        fn kind(&self) -> &str {
            "echo"
        }
        async fn execute(&self, _step: &Step, input: Value) -> std::result::Result<Value, String> {
            Ok(input)
        }
    }

    struct AlwaysFailExecutor;
    #[async_trait]
    impl StepExecutor for AlwaysFailExecutor {
        fn kind(&self) -> &str {
            "always_fail"
        }
        async fn execute(&self, _step: &Step, _input: Value) -> std::result::Result<Value, String> {
            Err("connection refused".to_string())
        }
    }

    struct CountingSlowExecutor {
        calls: Arc<AtomicU32>,
    }
    #[async_trait]
    impl StepExecutor for CountingSlowExecutor {
        fn kind(&self) -> &str {
            "slow"
        }
        async fn execute(&self, _step: &Step, _input: Value) -> std::result::Result<Value, String> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!({"done": true}))
        }
    }

    fn step(n: u32, kind: &str, var: &str, mapping: &[(&str, &str)], eh: ErrorHandling) -> Step {
        Step {
            step_number: n,
            step_name: format!("step{}", n),
            kind: kind.to_string(),
            input_mapping: mapping.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            condition: None,
            output_variable: var.to_string(),
            error_handling: eh,
            output_schema: None,
        }
    }

    fn workflow(steps: Vec<Step>) -> WorkflowDefinition {
        WorkflowDefinition {
            schema_key: "test".into(),
            version: "1".into(),
            steps,
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        }
    }

    #[tokio::test]
    async fn waves_execute_and_results_sorted_by_step_number() {
        let wf = workflow(vec![
            step(1, "echo", "a", &[("x", "1")], ErrorHandling::default()),
            step(2, "echo", "b", &[("y", "2")], ErrorHandling::default()),
            step(3, "echo", "c", &[("z", "$step1.x")], ErrorHandling::default()),
        ]);
        let mut registry = StepExecutorRegistry::new();
        registry.register(Box::new(EchoExecutor));
        let result = execute_workflow(&wf, json!({}), json!({}), &registry, true, &NoopObserver)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.step_results.len(), 3);
        assert_eq!(result.step_results[0].step_number, 1);
        assert_eq!(result.step_results[2].step_number, 3);
    }

    #[tokio::test]
    async fn on_error_fail_cancels_remaining_steps() {
        let mut eh = ErrorHandling::default();
        eh.retry_count = 2;
        eh.base_delay_sec = 0.001;
        eh.max_delay_sec = 0.002;
        eh.on_error = OnError::Fail;
        let wf = workflow(vec![
            step(1, "always_fail", "a", &[], eh),
            step(2, "echo", "b", &[], ErrorHandling::default()),
        ]);
        let mut registry = StepExecutorRegistry::new();
        registry.register(Box::new(AlwaysFailExecutor));
        registry.register(Box::new(EchoExecutor));
        let result = execute_workflow(&wf, json!({}), json!({}), &registry, true, &NoopObserver)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.cancelled_at_step, Some(1));
        let step2 = result.step_results.iter().find(|r| r.step_number == 2).unwrap();
        assert_eq!(step2.status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn fallback_on_timeout_returns_completed_with_fallback_value() {
        let mut eh = ErrorHandling::default();
        eh.on_error = OnError::Fallback;
        eh.timeout_sec = 0.01;
        eh.retry_on_timeout = false;
        eh.fallback_value = Some(json!({"ok": true}));
        let wf = workflow(vec![step(1, "slow", "a", &[], eh)]);
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = StepExecutorRegistry::new();
        registry.register(Box::new(CountingSlowExecutor { calls: calls.clone() }));
        let result = execute_workflow(&wf, json!({}), json!({}), &registry, true, &NoopObserver)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.step_results[0].status, StepStatus::Completed);
        assert_eq!(result.step_results[0].output_data, json!({"ok": true}));
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn false_condition_skips_without_recording_output() {
        let mut s = step(1, "echo", "a", &[], ErrorHandling::default());
        s.condition = Some("$input.flag == true".to_string());
        let wf = workflow(vec![s]);
        let mut registry = StepExecutorRegistry::new();
        registry.register(Box::new(EchoExecutor));
        let result = execute_workflow(&wf, json!({"flag": false}), json!({}), &registry, true, &NoopObserver)
            .await
            .unwrap();
        assert_eq!(result.step_results[0].status, StepStatus::Skipped);
    }
}
