// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow definition: the immutable description of a deliverable run.

use crate::error::{OrchestratorError, Result};
use crate::risk::model::RiskRulesConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// How a step's failure should be handled once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Fail the whole run; subsequent steps are skipped.
    Fail,
    /// Mark the step skipped and continue the run.
    Skip,
    /// Substitute a fallback value and mark the step completed.
    Fallback,
}

/// Per-step error and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default = "default_on_error")]
    pub on_error: OnError,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_sec: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_sec: f64,
    #[serde(default = "default_timeout")]
    pub timeout_sec: f64,
    #[serde(default)]
    pub fallback_value: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub jitter: bool,
    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,
    #[serde(default = "default_true")]
    pub retry_on_transient_only: bool,
}

fn default_on_error() -> OnError {
    OnError::Fail
}
fn default_base_delay() -> f64 {
    1.0
}
fn default_max_delay() -> f64 {
    60.0
}
fn default_timeout() -> f64 {
    30.0
}
fn default_true() -> bool {
    true
}

impl Default for ErrorHandling {
    fn default() -> Self {
        Self {
            on_error: OnError::Fail,
            retry_count: 0,
            base_delay_sec: 1.0,
            max_delay_sec: 60.0,
            timeout_sec: 30.0,
            fallback_value: None,
            jitter: true,
            retry_on_timeout: true,
            retry_on_transient_only: true,
        }
    }
}

/// A single step in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// 1-based, unique, contiguous within the workflow.
    pub step_number: u32,
    pub step_name: String,
    /// Names the `StepExecutor` registered under this key.
    pub kind: String,
    /// Parameter name -> expression string (may reference `$input.*`,
    /// `$stepK.*`, `$context.*`).
    #[serde(default)]
    pub input_mapping: HashMap<String, String>,
    /// Optional boolean gate; step runs only if this evaluates true.
    #[serde(default)]
    pub condition: Option<String>,
    /// Name under which this step's result is keyed in the context.
    pub output_variable: String,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
}

/// Immutable description of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub schema_key: String,
    pub version: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub risk_rules: Option<RiskRulesConfig>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
}

impl WorkflowDefinition {
    /// Validates the workflow's structural invariants (spec §3/§4.5):
    /// contiguous 1..N numbering, unique output variables, all referenced
    /// steps exist, no forward/self reference, no cycle (cycle detection
    /// lives in `dag.rs` since it requires building the graph).
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(OrchestratorError::Validation(
                "workflow must have at least one step".to_string(),
            ));
        }

        let mut numbers: Vec<u32> = self.steps.iter().map(|s| s.step_number).collect();
        numbers.sort_unstable();
        for (idx, n) in numbers.iter().enumerate() {
            if *n != (idx as u32) + 1 {
                return Err(OrchestratorError::Validation(format!(
                    "step numbers must be contiguous starting at 1, got {:?}",
                    numbers
                )));
            }
        }

        let mut seen_vars = HashSet::new();
        for step in &self.steps {
            if !seen_vars.insert(step.output_variable.clone()) {
                return Err(OrchestratorError::Validation(format!(
                    "duplicate output variable: {}",
                    step.output_variable
                )));
            }
        }

        for step in &self.steps {
            let mut refs = crate::dag::extract_step_refs(step.condition.as_deref().unwrap_or(""));
            for expr in step.input_mapping.values() {
                refs.extend(crate::dag::extract_step_refs(expr));
            }
            for referenced in refs {
                if referenced >= step.step_number {
                    return Err(OrchestratorError::ForwardReference {
                        from: step.step_number,
                        to: referenced,
                    });
                }
                if !numbers.contains(&referenced) {
                    return Err(OrchestratorError::Validation(format!(
                        "step {} references nonexistent step {}",
                        step.step_number, referenced
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn step(&self, step_number: u32) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, var: &str, mapping: &[(&str, &str)]) -> Step {
        Step {
            step_number: n,
            step_name: format!("step{}", n),
            kind: "noop".to_string(),
            input_mapping: mapping
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            condition: None,
            output_variable: var.to_string(),
            error_handling: ErrorHandling::default(),
            output_schema: None,
        }
    }

    #[test]
    fn validates_contiguous_numbering() {
        let wf = WorkflowDefinition {
            schema_key: "k".into(),
            version: "1".into(),
            steps: vec![step(1, "a", &[]), step(3, "b", &[])],
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        };
        assert!(wf.validate().is_err());
    }

    #[test]
    fn rejects_forward_reference() {
        let wf = WorkflowDefinition {
            schema_key: "k".into(),
            version: "1".into(),
            steps: vec![
                step(1, "a", &[("x", "$step2.y")]),
                step(2, "b", &[]),
            ],
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        };
        assert!(matches!(
            wf.validate(),
            Err(OrchestratorError::ForwardReference { from: 1, to: 2 })
        ));
    }

    #[test]
    fn rejects_duplicate_output_variable() {
        let wf = WorkflowDefinition {
            schema_key: "k".into(),
            version: "1".into(),
            steps: vec![step(1, "a", &[]), step(2, "a", &[])],
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        };
        assert!(wf.validate().is_err());
    }

    #[test]
    fn accepts_valid_workflow() {
        let wf = WorkflowDefinition {
            schema_key: "k".into(),
            version: "1".into(),
            steps: vec![step(1, "a", &[]), step(2, "b", &[("x", "$step1.a")])],
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        };
        assert!(wf.validate().is_ok());
    }
}
