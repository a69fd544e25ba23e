//! Fluent construction of `WorkflowDefinition`/`Step` values.

use llm_orchestrator_core::workflow::{ErrorHandling, OnError, Step, WorkflowDefinition};
use llm_orchestrator_core::{OrchestratorError, Result};
use std::collections::HashMap;

/// Builds one [`Step`]. Obtained from [`WorkflowBuilder::step`]; call
/// `.add()` to append it to the workflow under construction.
pub struct StepBuilder<'a> {
    workflow: &'a mut WorkflowBuilder,
    step_number: u32,
    step_name: String,
    kind: String,
    input_mapping: HashMap<String, String>,
    condition: Option<String>,
    output_variable: Option<String>,
    error_handling: ErrorHandling,
    output_schema: Option<serde_json::Value>,
}

impl<'a> StepBuilder<'a> {
    fn new(workflow: &'a mut WorkflowBuilder, step_number: u32, step_name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            workflow,
            step_number,
            step_name: step_name.into(),
            kind: kind.into(),
            input_mapping: HashMap::new(),
            condition: None,
            output_variable: None,
            error_handling: ErrorHandling::default(),
            output_schema: None,
        }
    }

    /// Maps `param` to an expression string (e.g. `"$input.amount"` or
    /// `"$step1.total"`).
    pub fn input(mut self, param: impl Into<String>, expr: impl Into<String>) -> Self {
        self.input_mapping.insert(param.into(), expr.into());
        self
    }

    pub fn condition(mut self, expr: impl Into<String>) -> Self {
        self.condition = Some(expr.into());
        self
    }

    /// Names the context variable this step's output is stored under.
    /// Required before `.add()`.
    pub fn output_as(mut self, name: impl Into<String>) -> Self {
        self.output_variable = Some(name.into());
        self
    }

    pub fn on_error(mut self, on_error: OnError) -> Self {
        self.error_handling.on_error = on_error;
        self
    }

    pub fn retry(mut self, count: u32) -> Self {
        self.error_handling.retry_count = count;
        self
    }

    pub fn timeout_sec(mut self, seconds: f64) -> Self {
        self.error_handling.timeout_sec = seconds;
        self
    }

    pub fn fallback_value(mut self, value: serde_json::Value) -> Self {
        self.error_handling.fallback_value = Some(value);
        self.error_handling.on_error = OnError::Fallback;
        self
    }

    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Appends the built step and returns the workflow builder for
    /// further chaining.
    pub fn add(self) -> Result<&'a mut WorkflowBuilder> {
        let output_variable = self.output_variable.ok_or_else(|| {
            OrchestratorError::Validation(format!(
                "step {} ({}) is missing output_as(..)",
                self.step_number, self.step_name
            ))
        })?;
        self.workflow.steps.push(Step {
            step_number: self.step_number,
            step_name: self.step_name,
            kind: self.kind,
            input_mapping: self.input_mapping,
            condition: self.condition,
            output_variable,
            error_handling: self.error_handling,
            output_schema: self.output_schema,
        });
        Ok(self.workflow)
    }
}

/// Fluent builder for a [`WorkflowDefinition`]. Step numbers are assigned
/// automatically in call order (1-based), matching spec §3's contiguous
/// numbering invariant by construction.
#[derive(Default)]
pub struct WorkflowBuilder {
    schema_key: String,
    version: String,
    steps: Vec<Step>,
    risk_rules: Option<llm_orchestrator_core::risk::model::RiskRulesConfig>,
    input_schema: Option<serde_json::Value>,
    output_schema: Option<serde_json::Value>,
}

impl WorkflowBuilder {
    pub fn new(schema_key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            schema_key: schema_key.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Starts a new step; its number is the next sequential position.
    pub fn step(&mut self, step_name: impl Into<String>, kind: impl Into<String>) -> StepBuilder<'_> {
        let step_number = self.steps.len() as u32 + 1;
        StepBuilder::new(self, step_number, step_name, kind)
    }

    pub fn risk_rules(&mut self, rules: llm_orchestrator_core::risk::model::RiskRulesConfig) -> &mut Self {
        self.risk_rules = Some(rules);
        self
    }

    pub fn input_schema(&mut self, schema: serde_json::Value) -> &mut Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn output_schema(&mut self, schema: serde_json::Value) -> &mut Self {
        self.output_schema = Some(schema);
        self
    }

    /// Builds the workflow and validates its structural invariants
    /// (spec §3/§4.5), returning the validation error if any step
    /// reference is malformed.
    pub fn build(self) -> Result<WorkflowDefinition> {
        let workflow = WorkflowDefinition {
            schema_key: self.schema_key,
            version: self.version,
            steps: self.steps,
            risk_rules: self.risk_rules,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
        };
        workflow.validate()?;
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_two_step_workflow_with_sequential_numbering() {
        let mut builder = WorkflowBuilder::new("cost_estimate", "1");
        builder
            .step("gather_inputs", "calc_engine")
            .output_as("inputs")
            .add()
            .unwrap();
        builder
            .step("estimate_cost", "calc_engine")
            .input("lineItems", "$step1.inputs")
            .output_as("estimate")
            .retry(2)
            .timeout_sec(30.0)
            .add()
            .unwrap();

        let workflow = builder.build().unwrap();
        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.steps[1].step_number, 2);
        assert_eq!(workflow.steps[1].error_handling.retry_count, 2);
    }

    #[test]
    fn missing_output_as_is_rejected() {
        let mut builder = WorkflowBuilder::new("k", "1");
        let result = builder.step("a", "calc_engine").add();
        assert!(result.is_err());
    }

    #[test]
    fn forward_reference_fails_validation() {
        let mut builder = WorkflowBuilder::new("k", "1");
        builder
            .step("a", "calc_engine")
            .input("x", "$step2.y")
            .output_as("a_out")
            .add()
            .unwrap();
        builder.step("b", "calc_engine").output_as("b_out").add().unwrap();
        assert!(builder.build().is_err());
    }
}
