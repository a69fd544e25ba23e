// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow Orchestrator (component J): the top-level request handler that
//! wires the Dependency Graph, Parallel Executor, Risk Rule Engine,
//! Streaming Manager, and the audit port together for one
//! `executeWorkflow` call (spec §4.10/§6).

use crate::context::StepResult;
use crate::error::{OrchestratorError, Result};
use crate::executor::{self, ExecutionStatus as RunStatus, StepObserver};
use crate::providers::StepExecutorRegistry;
use crate::risk::engine::RuleContext;
use crate::risk::model::{Assessment, RiskRulesConfig, RoutingDecision};
use crate::risk::RiskEngine;
use crate::streaming::{StreamEvent, StreamEventType, StreamingManager};
use crate::validation;
use crate::workflow::WorkflowDefinition;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// `WorkflowCatalog.load` port (spec §6): resolves a `WorkflowDefinition`
/// by `schemaKey`/`version`.
#[async_trait]
pub trait WorkflowCatalog: Send + Sync {
    async fn load(&self, schema_key: &str, version: &str) -> Result<WorkflowDefinition>;
}

/// `RiskRulesStore.load` port (spec §6): resolves the `RiskRulesConfig`
/// attached to a `schemaKey`. A schema with no rules configured is not an
/// error — callers return `RiskRulesConfig::default()` (no rules ever
/// trigger, every call `continue`s).
#[async_trait]
pub trait RiskRulesStore: Send + Sync {
    async fn load(&self, schema_key: &str) -> Result<RiskRulesConfig>;
}

/// The Safety Audit Logger (I) port (spec §4.9), narrowed to the
/// operations the orchestrator needs. Writes are best-effort: a failure is
/// logged by the implementation and must never fail the run, so this
/// trait reports failure as a plain string rather than `OrchestratorError`.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_rule_evaluation(
        &self,
        execution_id: &str,
        rule_id: &str,
        matched: bool,
        action: Option<&str>,
        context: &Value,
    ) -> std::result::Result<(), String>;

    async fn log_routing_decision(
        &self,
        execution_id: &str,
        decision: &str,
        reason: &str,
        contributing_rules: Vec<String>,
    ) -> std::result::Result<(), String>;
}

/// In-memory `WorkflowCatalog`, keyed by `(schemaKey, version)`. Suitable
/// as the CLI's default wiring and for tests; production deployments
/// implement this port against the relational store spec §6 describes.
#[derive(Default)]
pub struct InMemoryWorkflowCatalog {
    workflows: DashMap<(String, String), WorkflowDefinition>,
}

impl InMemoryWorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, workflow: WorkflowDefinition) {
        self.workflows
            .insert((workflow.schema_key.clone(), workflow.version.clone()), workflow);
    }
}

#[async_trait]
impl WorkflowCatalog for InMemoryWorkflowCatalog {
    async fn load(&self, schema_key: &str, version: &str) -> Result<WorkflowDefinition> {
        self.workflows
            .get(&(schema_key.to_string(), version.to_string()))
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                OrchestratorError::other(format!(
                    "no workflow registered for {}/{}",
                    schema_key, version
                ))
            })
    }
}

/// In-memory `RiskRulesStore`, keyed by `schemaKey`.
#[derive(Default)]
pub struct InMemoryRiskRulesStore {
    rules: DashMap<String, RiskRulesConfig>,
}

impl InMemoryRiskRulesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, schema_key: impl Into<String>, rules: RiskRulesConfig) {
        self.rules.insert(schema_key.into(), rules);
    }
}

#[async_trait]
impl RiskRulesStore for InMemoryRiskRulesStore {
    async fn load(&self, schema_key: &str) -> Result<RiskRulesConfig> {
        Ok(self.rules.get(schema_key).map(|e| e.clone()).unwrap_or_default())
    }
}

/// Response shape for `executeWorkflow` (spec §6).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowResponse {
    pub execution_id: String,
    pub status: RunStatus,
    pub output: Value,
    pub routing_decision: RoutingDecision,
    pub requires_hitl: bool,
    pub escalation_level: Option<u8>,
    pub step_results: Vec<StepResult>,
    pub summary: String,
    pub processing_time_ms: u64,
}

/// Observer that evaluates per-step risk rules as each step completes
/// (spec §4.10 step 6), broadcasts step-level stream events, and fires
/// best-effort audit writes without blocking the executor's hot path.
struct RiskEvaluatingObserver<'a> {
    workflow: &'a WorkflowDefinition,
    risk_rules: &'a RiskRulesConfig,
    risk_engine: RiskEngine,
    input: Value,
    context: Value,
    assessment: Option<Assessment>,
    streaming: Arc<StreamingManager>,
    audit: Arc<dyn AuditSink>,
    execution_id: String,
    accumulated_outputs: Mutex<Vec<(u32, String, Value)>>,
    step_evaluations: Mutex<HashMap<u32, crate::risk::model::StepEvaluationResult>>,
}

impl<'a> RiskEvaluatingObserver<'a> {
    fn new(
        workflow: &'a WorkflowDefinition,
        risk_rules: &'a RiskRulesConfig,
        risk_engine: RiskEngine,
        input: Value,
        context: Value,
        assessment: Option<Assessment>,
        streaming: Arc<StreamingManager>,
        audit: Arc<dyn AuditSink>,
        execution_id: String,
    ) -> Self {
        Self {
            workflow,
            risk_rules,
            risk_engine,
            input,
            context,
            assessment,
            streaming,
            audit,
            execution_id,
            accumulated_outputs: Mutex::new(Vec::new()),
            step_evaluations: Mutex::new(HashMap::new()),
        }
    }

    fn into_results(self) -> Vec<crate::risk::model::StepEvaluationResult> {
        let mut results: Vec<_> = self.step_evaluations.into_inner().into_values().collect();
        results.sort_by_key(|r| r.step_number);
        results
    }
}

impl<'a> StepObserver for RiskEvaluatingObserver<'a> {
    fn on_step_started(&self, step: &crate::workflow::Step) {
        self.streaming.broadcast(StreamEvent::new(
            StreamEventType::StepStarted,
            self.execution_id.clone(),
            serde_json::json!({"stepNumber": step.step_number, "stepName": step.step_name}),
        ));
    }

    fn on_step_result(&self, result: &StepResult) {
        let Some(step) = self.workflow.step(result.step_number) else {
            return;
        };

        let event_type = match result.status {
            crate::context::StepStatus::Completed => {
                self.accumulated_outputs.lock().push((
                    step.step_number,
                    step.output_variable.clone(),
                    result.output_data.clone(),
                ));
                StreamEventType::StepCompleted
            }
            crate::context::StepStatus::Failed => StreamEventType::StepFailed,
            crate::context::StepStatus::Skipped => StreamEventType::StepSkipped,
        };
        self.streaming.broadcast(StreamEvent::new(
            event_type,
            self.execution_id.clone(),
            serde_json::json!({
                "stepNumber": result.step_number,
                "stepName": result.step_name,
                "errorMessage": result.error_message,
            }),
        ));

        let snapshot: Vec<(u32, String, Value)> = self.accumulated_outputs.lock().clone();
        let mut ctx = RuleContext::new(&self.input, &self.context).with_steps(&snapshot);
        if let Some(a) = self.assessment.as_ref() {
            ctx = ctx.with_assessment(a);
        }
        let eval = self
            .risk_engine
            .evaluate_step_rules(self.risk_rules, step.step_number, &step.step_name, &ctx);
        let context_snapshot = serde_json::json!({
            "input": &self.input,
            "context": &self.context,
            "steps": snapshot
                .iter()
                .map(|(n, var, v)| (var.clone(), serde_json::json!({"stepNumber": n, "value": v})))
                .collect::<HashMap<_, _>>(),
            "assessment": self.assessment.as_ref().map(Assessment::as_json),
        });
        spawn_rule_evaluation_logging(
            self.audit.clone(),
            self.execution_id.clone(),
            &eval,
            context_snapshot,
        );
        self.step_evaluations.lock().insert(step.step_number, eval);
    }

    fn on_progress(&self, completed: usize, total: usize) {
        self.streaming.broadcast(StreamEvent::new(
            StreamEventType::ProgressUpdate,
            self.execution_id.clone(),
            serde_json::json!({"completed": completed, "total": total}),
        ));
    }
}

/// Wires components E/F/G/H/I together behind the single
/// `executeWorkflow` entrypoint (spec §4.10). Constructed explicitly by
/// the caller (CLI, service boundary, test harness) rather than reached
/// for as a global singleton — see the "explicit wiring" design note.
pub struct WorkflowOrchestrator {
    catalog: Arc<dyn WorkflowCatalog>,
    risk_rules_store: Arc<dyn RiskRulesStore>,
    audit: Arc<dyn AuditSink>,
    streaming: Arc<StreamingManager>,
    executors: Arc<StepExecutorRegistry>,
    risk_engine: RiskEngine,
    running: DashMap<String, crate::context::SharedContext>,
}

impl WorkflowOrchestrator {
    pub fn new(
        catalog: Arc<dyn WorkflowCatalog>,
        risk_rules_store: Arc<dyn RiskRulesStore>,
        audit: Arc<dyn AuditSink>,
        streaming: Arc<StreamingManager>,
        executors: Arc<StepExecutorRegistry>,
    ) -> Self {
        Self {
            catalog,
            risk_rules_store,
            audit,
            streaming,
            executors,
            risk_engine: RiskEngine::new(),
            running: DashMap::new(),
        }
    }

    /// Access to the streaming registry, so a caller can subscribe to
    /// `execution_id` before or while the run is in flight.
    pub fn streaming(&self) -> &Arc<StreamingManager> {
        &self.streaming
    }

    /// Cooperative cancellation (spec §6 `cancelExecution`). A no-op if
    /// the execution is unknown or has already finished.
    pub fn cancel_execution(&self, execution_id: &str) -> bool {
        match self.running.get(execution_id) {
            Some(ctx) => {
                ctx.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs the 9-step responsibility list in spec §4.10.
    pub async fn execute_workflow(
        &self,
        schema_key: &str,
        version: &str,
        input: Value,
        context: Value,
        assessment: Option<Assessment>,
    ) -> Result<ExecuteWorkflowResponse> {
        let start = Instant::now();
        let execution_id = uuid::Uuid::new_v4().to_string();

        // 1. Load workflow + risk rules.
        let workflow = self.catalog.load(schema_key, version).await?;
        workflow.validate()?;
        let risk_rules = self.risk_rules_store.load(schema_key).await?;

        // 2. Validate input against the input schema (strict).
        if let Some(schema) = workflow.input_schema.as_ref() {
            let result = validation::validate(&input, schema, true);
            if !result.valid {
                return Err(OrchestratorError::SchemaViolation(format!(
                    "{:?}",
                    result.issues
                )));
            }
        }

        // 3. evaluateGlobal; short-circuit on block.
        let mut global_ctx = RuleContext::new(&input, &context);
        if let Some(a) = assessment.as_ref() {
            global_ctx = global_ctx.with_assessment(a);
        }
        let global_eval = self.risk_engine.evaluate_global(&risk_rules, &global_ctx);
        spawn_rule_evaluation_logging(
            self.audit.clone(),
            execution_id.clone(),
            &global_eval,
            serde_json::json!({
                "input": &input,
                "context": &context,
                "assessment": assessment.as_ref().map(Assessment::as_json),
            }),
        );

        if global_eval.decision == RoutingDecision::Block {
            let reason = global_eval
                .triggered
                .iter()
                .map(|r| r.message.clone())
                .collect::<Vec<_>>()
                .join("; ");
            let rule_ids = global_eval.triggered.iter().map(|r| r.rule_id.clone()).collect();
            let _ = self
                .audit
                .log_routing_decision(&execution_id, "block", &reason, rule_ids)
                .await;
            self.streaming.broadcast(StreamEvent::new(
                StreamEventType::ExecutionFailed,
                execution_id.clone(),
                serde_json::json!({"reason": "blocked by global rule", "message": reason}),
            ));
            return Ok(ExecuteWorkflowResponse {
                execution_id,
                status: RunStatus::Failed,
                output: Value::Null,
                routing_decision: RoutingDecision::Block,
                requires_hitl: true,
                escalation_level: None,
                step_results: Vec::new(),
                summary: if reason.is_empty() {
                    "blocked by global rule".to_string()
                } else {
                    reason
                },
                processing_time_ms: start.elapsed().as_millis() as u64,
            });
        }

        // 4. Create the streaming session and emit execution_started.
        self.streaming.broadcast(StreamEvent::new(
            StreamEventType::ExecutionStarted,
            execution_id.clone(),
            serde_json::json!({"schemaKey": schema_key, "version": version}),
        ));

        // 5/6. Run the Parallel Executor with a risk-evaluating observer.
        let exec_context: crate::context::SharedContext = Arc::new(
            crate::context::ExecutionContext::new(input.clone(), context.clone(), workflow.steps.len()),
        );
        self.running.insert(execution_id.clone(), exec_context.clone());

        let observer = RiskEvaluatingObserver::new(
            &workflow,
            &risk_rules,
            self.risk_engine,
            input.clone(),
            context.clone(),
            assessment.clone(),
            self.streaming.clone(),
            self.audit.clone(),
            execution_id.clone(),
        );

        let run_result = executor::execute_workflow_with_context(
            &workflow,
            exec_context,
            &self.executors,
            true,
            &observer,
        )
        .await;

        self.running.remove(&execution_id);

        let run_result = match run_result {
            Ok(r) => r,
            Err(e) => {
                self.streaming.broadcast(StreamEvent::new(
                    StreamEventType::ExecutionFailed,
                    execution_id.clone(),
                    serde_json::json!({"error": e.to_string()}),
                ));
                return Err(e);
            }
        };

        let step_names: HashMap<u32, String> = workflow
            .steps
            .iter()
            .map(|s| (s.step_number, s.step_name.clone()))
            .collect();
        let step_outputs = run_result.execution_context.step_outputs();

        // 7. evaluateWorkflow over the accumulated context.
        let workflow_eval = self.risk_engine.evaluate_workflow(
            &risk_rules,
            &input,
            &step_names,
            &step_outputs,
            &context,
            global_eval.aggregate_risk_factor,
            assessment.as_ref(),
        );

        // 8. Persist rule-evaluation + routing records; emit terminal event.
        let _ = observer.into_results();
        let workflow_context_snapshot = serde_json::json!({
            "input": &input,
            "context": &context,
            "steps": &step_outputs,
            "assessment": assessment.as_ref().map(Assessment::as_json),
        });
        for step_result in &workflow_eval.step_results {
            spawn_rule_evaluation_logging(
                self.audit.clone(),
                execution_id.clone(),
                step_result,
                workflow_context_snapshot.clone(),
            );
        }
        let contributing: Vec<String> = std::iter::once(&workflow_eval.global)
            .chain(workflow_eval.step_results.iter())
            .flat_map(|r| r.triggered.iter().map(|t| t.rule_id.clone()))
            .collect();
        let _ = self
            .audit
            .log_routing_decision(
                &execution_id,
                &format!("{:?}", workflow_eval.final_routing_decision),
                &workflow_eval.summary_message,
                contributing,
            )
            .await;

        let terminal = if run_result.status == RunStatus::Completed {
            StreamEventType::ExecutionCompleted
        } else {
            StreamEventType::ExecutionFailed
        };
        self.streaming.broadcast(StreamEvent::new(
            terminal,
            execution_id.clone(),
            serde_json::json!({"status": run_result.status, "routingDecision": workflow_eval.final_routing_decision}),
        ));

        // 9. Return output + routing decision + summary.
        let output = step_outputs
            .last()
            .map(|(_, _, value)| value.clone())
            .unwrap_or(Value::Null);

        Ok(ExecuteWorkflowResponse {
            execution_id,
            status: run_result.status,
            output,
            routing_decision: workflow_eval.final_routing_decision,
            requires_hitl: workflow_eval.requires_hitl,
            escalation_level: workflow_eval.escalation_level,
            step_results: run_result.step_results,
            summary: workflow_eval.summary_message,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

}

/// Logs every rule triggered by one evaluation, fire-and-forget (spec
/// §4.9 "all writes are best-effort"). Spawned so audit persistence never
/// sits on the executor's hot path.
fn spawn_rule_evaluation_logging(
    audit: Arc<dyn AuditSink>,
    execution_id: String,
    eval: &crate::risk::model::StepEvaluationResult,
    context_snapshot: Value,
) {
    let triggered = eval.triggered.clone();
    tokio::spawn(async move {
        for rule in &triggered {
            let action = format!("{:?}", rule.action);
            let _ = audit
                .log_rule_evaluation(
                    &execution_id,
                    &rule.rule_id,
                    rule.condition_result,
                    Some(action.as_str()),
                    &context_snapshot,
                )
                .await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StepExecutor;
    use crate::workflow::{ErrorHandling, Step};
    use async_trait::async_trait as async_trait_attr;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct EchoExecutor;
    #[async_trait_attr]
    impl StepExecutor for EchoExecutor {
        fn kind(&self) -> &str {
            "echo"
        }
        async fn execute(&self, _step: &Step, input: Value) -> std::result::Result<Value, String> {
            Ok(input)
        }
    }

    #[derive(Default)]
    struct RecordingAuditSink {
        rule_evaluations: StdMutex<Vec<String>>,
        routing_decisions: StdMutex<Vec<String>>,
    }

    #[async_trait_attr]
    impl AuditSink for RecordingAuditSink {
        async fn log_rule_evaluation(
            &self,
            _execution_id: &str,
            rule_id: &str,
            _matched: bool,
            _action: Option<&str>,
            _context: &Value,
        ) -> std::result::Result<(), String> {
            self.rule_evaluations.lock().unwrap().push(rule_id.to_string());
            Ok(())
        }

        async fn log_routing_decision(
            &self,
            _execution_id: &str,
            decision: &str,
            _reason: &str,
            _contributing_rules: Vec<String>,
        ) -> std::result::Result<(), String> {
            self.routing_decisions.lock().unwrap().push(decision.to_string());
            Ok(())
        }
    }

    fn step(n: u32, var: &str, mapping: &[(&str, &str)]) -> Step {
        Step {
            step_number: n,
            step_name: format!("step{}", n),
            kind: "echo".to_string(),
            input_mapping: mapping.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            condition: None,
            output_variable: var.to_string(),
            error_handling: ErrorHandling::default(),
            output_schema: None,
        }
    }

    fn orchestrator_with(
        workflow: WorkflowDefinition,
        risk_rules: RiskRulesConfig,
    ) -> (WorkflowOrchestrator, Arc<RecordingAuditSink>) {
        let catalog = Arc::new(InMemoryWorkflowCatalog::new());
        catalog.insert(workflow);
        let risk_store = Arc::new(InMemoryRiskRulesStore::new());
        risk_store.insert("test-schema", risk_rules);
        let audit = Arc::new(RecordingAuditSink::default());
        let streaming = Arc::new(StreamingManager::new());
        let mut registry = StepExecutorRegistry::new();
        registry.register(Box::new(EchoExecutor));
        let orchestrator = WorkflowOrchestrator::new(
            catalog,
            risk_store,
            audit.clone(),
            streaming,
            Arc::new(registry),
        );
        (orchestrator, audit)
    }

    #[tokio::test]
    async fn happy_path_runs_to_completion_and_continues() {
        let workflow = WorkflowDefinition {
            schema_key: "test-schema".to_string(),
            version: "1".to_string(),
            steps: vec![step(1, "a", &[("x", "1")])],
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        };
        let (orchestrator, _audit) = orchestrator_with(workflow, RiskRulesConfig::default());
        let response = orchestrator
            .execute_workflow("test-schema", "1", json!({}), json!({}), None)
            .await
            .unwrap();
        assert_eq!(response.status, RunStatus::Completed);
        assert_eq!(response.routing_decision, RoutingDecision::Continue);
        assert!(!response.requires_hitl);
        assert_eq!(response.step_results.len(), 1);
    }

    #[tokio::test]
    async fn global_block_rule_short_circuits_with_no_steps_run() {
        let workflow = WorkflowDefinition {
            schema_key: "test-schema".to_string(),
            version: "1".to_string(),
            steps: vec![step(1, "a", &[])],
            risk_rules: None,
            input_schema: None,
            output_schema: None,
        };
        let rules = RiskRulesConfig {
            global_rules: vec![crate::risk::model::GlobalRule {
                rule_id: "g1".to_string(),
                condition: "$input.danger == true".to_string(),
                risk_factor: 1.0,
                action_if_triggered: crate::risk::model::Action::Block,
                message: "dangerous input".to_string(),
                enabled: true,
            }],
            ..Default::default()
        };
        let (orchestrator, audit) = orchestrator_with(workflow, rules);
        let response = orchestrator
            .execute_workflow("test-schema", "1", json!({"danger": true}), json!({}), None)
            .await
            .unwrap();
        assert_eq!(response.routing_decision, RoutingDecision::Block);
        assert!(response.requires_hitl);
        assert!(response.step_results.is_empty());
        assert_eq!(audit.routing_decisions.lock().unwrap().as_slice(), ["block"]);
    }

    #[tokio::test]
    async fn unknown_workflow_errors() {
        let catalog = Arc::new(InMemoryWorkflowCatalog::new());
        let risk_store = Arc::new(InMemoryRiskRulesStore::new());
        let audit = Arc::new(RecordingAuditSink::default());
        let streaming = Arc::new(StreamingManager::new());
        let orchestrator = WorkflowOrchestrator::new(
            catalog,
            risk_store,
            audit,
            streaming,
            Arc::new(StepExecutorRegistry::new()),
        );
        let result = orchestrator
            .execute_workflow("missing", "1", json!({}), json!({}), None)
            .await;
        assert!(result.is_err());
    }
}
