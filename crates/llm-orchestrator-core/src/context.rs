// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ExecutionContext`: the single mutable state owned by one workflow run
//! (spec §3/§5). Built once, exclusively owned by the Parallel Executor
//! (H) for the run's lifetime; read-only snapshots are handed to rule
//! evaluation, condition gates, and streaming subscribers.

use crate::condition::{self, Condition, ConditionContext};
use crate::error::Result;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Outcome status of a single step (spec §3 `StepResult.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// Retry bookkeeping attached to a `StepResult` when the step retried.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryMetadata {
    pub attempts: u32,
    pub total_delay_ms: u64,
    pub final_error_classification: Option<String>,
}

/// The recorded outcome of one step execution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_number: u32,
    pub step_name: String,
    pub status: StepStatus,
    pub output_data: Value,
    pub error_message: Option<String>,
    pub retry_metadata: Option<RetryMetadata>,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
}

/// A read-only, cheap-to-take snapshot of the three top-level context maps.
/// Shallow copies suffice: per spec, step outputs are immutable once
/// recorded, so cloning the `steps` map's `Arc`-backed `Value` is enough
/// to guarantee later mutation cannot be observed through this snapshot.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub input: Value,
    pub steps: Value,
    pub context: Value,
}

impl ConditionContext for ContextSnapshot {
    fn resolve(&self, path: &[String]) -> Result<Value> {
        let Some(head) = path.first() else {
            return Err(crate::error::OrchestratorError::UnresolvedVariable(
                "empty variable".to_string(),
            ));
        };
        if head == "input" {
            return condition::walk(&self.input, &path[1..]);
        }
        if head == "context" {
            return condition::walk(&self.context, &path[1..]);
        }
        if head.starts_with("step") && head.len() > 4 && head[4..].chars().all(|c| c.is_ascii_digit()) {
            // `steps` is keyed by outputVariable; resolve stepK by scanning
            // the step-number -> outputVariable index carried alongside.
            return condition::walk(&self.steps, &path[1..]);
        }
        Err(crate::error::OrchestratorError::UnresolvedVariable(format!(
            "unknown variable namespace: {}",
            head
        )))
    }
}

/// The execution context for a single workflow run.
pub struct ExecutionContext {
    /// Immutable after construction.
    input: Value,
    /// Immutable after construction; caller-supplied free-form metadata.
    context: Value,
    /// Monotonic: only appended to, keyed by `outputVariable`.
    steps: RwLock<HashMap<String, Value>>,
    /// `stepNumber -> outputVariable`, so `$stepK.*` can resolve into `steps`.
    step_numbers: RwLock<HashMap<u32, String>>,
    cancelled: AtomicBool,
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl ExecutionContext {
    pub fn new(input: Value, context: Value, total_steps: usize) -> Self {
        Self {
            input,
            context,
            steps: RwLock::new(HashMap::new()),
            step_numbers: RwLock::new(HashMap::new()),
            cancelled: AtomicBool::new(false),
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(total_steps),
        }
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn context_value(&self) -> &Value {
        &self.context
    }

    /// Records a completed step's output. Called exactly once per step,
    /// after that step's wave has fully joined (spec §5 single-writer rule).
    pub fn set_output(&self, step_number: u32, output_variable: &str, value: Value) {
        self.steps.write().insert(output_variable.to_string(), value);
        self.step_numbers.write().insert(step_number, output_variable.to_string());
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// A read-only snapshot: `steps` is re-keyed by step number (`"1"`,
    /// `"2"`, ...) so `$stepK.*` resolves directly, alongside the
    /// by-output-variable view used by `input_mapping` substitution.
    pub fn snapshot(&self) -> ContextSnapshot {
        let steps_by_var = self.steps.read();
        let numbers = self.step_numbers.read();
        let mut by_number = serde_json::Map::new();
        for (number, var) in numbers.iter() {
            if let Some(value) = steps_by_var.get(var) {
                by_number.insert(number.to_string(), value.clone());
            }
        }
        ContextSnapshot {
            input: self.input.clone(),
            steps: Value::Object(by_number),
            context: self.context.clone(),
        }
    }

    /// All recorded step outputs as `(stepNumber, outputVariable, value)`,
    /// sorted by step number — the shape the risk engine and final
    /// response need.
    pub fn step_outputs(&self) -> Vec<(u32, String, Value)> {
        let steps_by_var = self.steps.read();
        let numbers = self.step_numbers.read();
        let mut out: Vec<(u32, String, Value)> = numbers
            .iter()
            .filter_map(|(n, var)| steps_by_var.get(var).map(|v| (*n, var.clone(), v.clone())))
            .collect();
        out.sort_by_key(|(n, _, _)| *n);
        out
    }

    /// Evaluates a step's `condition`/gate expression against a fresh
    /// snapshot. Empty condition is always true.
    pub fn evaluate_condition(&self, condition_src: &str) -> Result<bool> {
        let snapshot = self.snapshot();
        Condition::parse(condition_src)?.evaluate(&snapshot)
    }

    /// Resolves a single `$input.*`/`$stepK.*`/`$context.*` expression
    /// string to a value via the condition grammar's variable parsing,
    /// used for `inputMapping` substitution. Bare literals (no leading
    /// `$`) pass through as JSON strings.
    pub fn resolve_expression(&self, expr: &str) -> Result<Value> {
        let trimmed = expr.trim();
        if !trimmed.starts_with('$') {
            return Ok(Value::String(trimmed.to_string()));
        }
        let path = parse_variable_path(trimmed)?;
        self.snapshot().resolve(&path)
    }
}

fn parse_variable_path(expr: &str) -> Result<Vec<String>> {
    let body = expr.strip_prefix('$').ok_or_else(|| {
        crate::error::OrchestratorError::ParseError(format!("not a variable reference: {}", expr))
    })?;
    Ok(body.split('.').map(|s| s.to_string()).collect())
}

/// Shared, clonable handle to an `ExecutionContext`, the shape the
/// executor and orchestrator pass across `tokio::spawn` task boundaries.
pub type SharedContext = Arc<ExecutionContext>;
