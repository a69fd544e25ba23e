//! A batteries-included client for running workflows in-process, backed
//! by the in-memory catalog/rules-store the core crate ships for exactly
//! this purpose.

use llm_orchestrator_core::orchestrator::{
    AuditSink, ExecuteWorkflowResponse, InMemoryRiskRulesStore, InMemoryWorkflowCatalog,
    WorkflowOrchestrator,
};
use llm_orchestrator_core::risk::model::{Assessment, RiskRulesConfig};
use llm_orchestrator_core::streaming::StreamingManager;
use llm_orchestrator_core::workflow::WorkflowDefinition;
use llm_orchestrator_core::{Result, StepExecutor, StepExecutorRegistry};
use std::sync::Arc;

/// Audit sink that discards every write. The right default for
/// short-lived SDK usage (scripts, tests, notebooks) where nothing reads
/// the audit trail back; production callers should supply a real
/// `AuditSink` implementation (e.g. `llm-orchestrator-audit`'s logger,
/// adapted to this port) via [`OrchestratorClientBuilder::audit_sink`].
#[derive(Default)]
struct NullAuditSink;

#[async_trait::async_trait]
impl AuditSink for NullAuditSink {
    async fn log_rule_evaluation(
        &self,
        _execution_id: &str,
        _rule_id: &str,
        _matched: bool,
        _action: Option<&str>,
        _context: &serde_json::Value,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    async fn log_routing_decision(
        &self,
        _execution_id: &str,
        _decision: &str,
        _reason: &str,
        _contributing_rules: Vec<String>,
    ) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Consuming builder for [`OrchestratorClient`]. `StepExecutor`
/// registration needs exclusive access to the registry being built, so
/// (unlike [`super::builder::WorkflowBuilder`]) this builder is consumed
/// by each call rather than mutated in place.
pub struct OrchestratorClientBuilder {
    catalog: InMemoryWorkflowCatalog,
    rules_store: InMemoryRiskRulesStore,
    executors: StepExecutorRegistry,
    audit: Option<Arc<dyn AuditSink>>,
}

impl OrchestratorClientBuilder {
    fn new() -> Self {
        Self {
            catalog: InMemoryWorkflowCatalog::new(),
            rules_store: InMemoryRiskRulesStore::new(),
            executors: StepExecutorRegistry::new(),
            audit: None,
        }
    }

    /// Registers a workflow (and its risk rules, if any) so later `run`
    /// calls can address it by `schema_key`/`version`.
    pub fn register_workflow(self, workflow: WorkflowDefinition) -> Self {
        if let Some(rules) = workflow.risk_rules.clone() {
            self.rules_store.insert(workflow.schema_key.clone(), rules);
        }
        self.catalog.insert(workflow);
        self
    }

    /// Attaches a risk-rules document to a schema independently of the
    /// workflow that declares it (e.g. shared across versions).
    pub fn register_risk_rules(self, schema_key: impl Into<String>, rules: RiskRulesConfig) -> Self {
        self.rules_store.insert(schema_key, rules);
        self
    }

    /// Registers a `StepExecutor`, keyed by its own `kind()`.
    pub fn register_executor(mut self, executor: Box<dyn StepExecutor>) -> Self {
        self.executors.register(executor);
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> OrchestratorClient {
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(self.catalog),
            Arc::new(self.rules_store),
            self.audit.unwrap_or_else(|| Arc::new(NullAuditSink)),
            Arc::new(StreamingManager::new()),
            Arc::new(self.executors),
        );
        OrchestratorClient { orchestrator }
    }
}

/// Thin ergonomic wrapper over [`WorkflowOrchestrator`]. Assembled via
/// [`OrchestratorClient::builder`]; once built, `run` calls
/// `executeWorkflow` (spec §4.10/§6) for a registered workflow.
pub struct OrchestratorClient {
    orchestrator: WorkflowOrchestrator,
}

impl OrchestratorClient {
    pub fn builder() -> OrchestratorClientBuilder {
        OrchestratorClientBuilder::new()
    }

    pub async fn run(
        &self,
        schema_key: &str,
        version: &str,
        input: serde_json::Value,
        context: serde_json::Value,
        assessment: Option<Assessment>,
    ) -> Result<ExecuteWorkflowResponse> {
        self.orchestrator
            .execute_workflow(schema_key, version, input, context, assessment)
            .await
    }

    /// Access to the streaming registry, so a caller can subscribe to
    /// `execution_id` before or while a run is in flight (spec §6
    /// `streamEvents`).
    pub fn streaming(&self) -> &Arc<StreamingManager> {
        self.orchestrator.streaming()
    }

    /// Cooperative cancellation (spec §6 `cancelExecution`).
    pub fn cancel(&self, execution_id: &str) -> bool {
        self.orchestrator.cancel_execution(execution_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use async_trait::async_trait;
    use llm_orchestrator_core::workflow::Step;
    use serde_json::{json, Value};

    struct EchoExecutor;

    #[async_trait]
    impl StepExecutor for EchoExecutor {
        fn kind(&self) -> &str {
            "echo"
        }

        async fn execute(&self, _step: &Step, resolved_input: Value) -> std::result::Result<Value, String> {
            Ok(resolved_input)
        }
    }

    #[tokio::test]
    async fn runs_a_registered_workflow_end_to_end() {
        let mut builder = WorkflowBuilder::new("greet", "1");
        builder
            .step("say_hello", "echo")
            .input("message", "$input.name")
            .output_as("greeting")
            .add()
            .unwrap();
        let workflow = builder.build().unwrap();

        let client = OrchestratorClient::builder()
            .register_workflow(workflow)
            .register_executor(Box::new(EchoExecutor))
            .build();

        let response = client
            .run("greet", "1", json!({"name": "Ada"}), json!({}), None)
            .await
            .unwrap();

        assert_eq!(response.step_results.len(), 1);
        assert_eq!(
            response.step_results[0].status,
            llm_orchestrator_core::StepStatus::Completed
        );
    }

    #[tokio::test]
    async fn running_an_unregistered_schema_fails() {
        let client = OrchestratorClient::builder().build();
        let result = client.run("missing", "1", json!({}), json!({}), None).await;
        assert!(result.is_err());
    }
}
