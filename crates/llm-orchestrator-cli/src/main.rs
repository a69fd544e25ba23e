// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! LLM Orchestrator CLI.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use llm_orchestrator_audit::{AuditEventType, AuditFilter, AuditLogger, FileAuditStorage, ResourceType, RotationPolicy};
use llm_orchestrator_benchmarks::{
    benchmarks::io::{write_raw_results, write_summary},
    run_all_benchmarks,
};
use llm_orchestrator_core::orchestrator::{
    AuditSink, InMemoryRiskRulesStore, InMemoryWorkflowCatalog, WorkflowOrchestrator,
};
use llm_orchestrator_core::providers::{LLMProvider, LLMStepExecutor, StepExecutor, StepExecutorRegistry};
use llm_orchestrator_core::risk::model::RiskRulesConfig;
use llm_orchestrator_core::streaming::StreamingManager;
use llm_orchestrator_core::workflow::WorkflowDefinition;
use llm_orchestrator_providers::{AnthropicProvider, OpenAIProvider};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "llm-orchestrator")]
#[command(version, about = "LLM Workflow Orchestrator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition
    Validate {
        /// Path to workflow file
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Execute a workflow through the full orchestrator: risk rules,
    /// the parallel executor, and audit logging
    ExecuteWorkflow {
        /// Path to workflow file (JSON or YAML)
        #[arg(value_name = "FILE")]
        file: String,

        /// Input JSON string or file
        #[arg(short, long)]
        input: Option<String>,

        /// Path to a risk rules file (JSON or YAML) for this workflow
        #[arg(long)]
        risk_rules: Option<String>,

        /// Directory to persist stream events to, for later replay with
        /// `stream-events`
        #[arg(long)]
        log_events: Option<String>,

        /// Directory to append audit records to
        #[arg(long, default_value = "audit-log")]
        audit_store: String,
    },

    /// Replay the stream events recorded for a past execution
    StreamEvents {
        /// Execution ID to replay
        execution_id: String,

        /// Directory passed as `--log-events` to `execute-workflow`
        #[arg(long, default_value = "stream-events")]
        store: String,
    },

    /// Replay the audit trail recorded for a past execution
    ReplayAudit {
        /// Execution ID to replay
        execution_id: String,

        /// Directory passed as `--audit-store` to `execute-workflow`
        #[arg(long, default_value = "audit-log")]
        store: String,
    },

    /// Run the canonical benchmark suite
    Benchmark {
        /// Output directory for benchmark results
        #[arg(short, long, default_value = "benchmarks/output")]
        output: String,

        /// Output format: json, markdown, or both
        #[arg(short, long, default_value = "both")]
        format: String,

        /// Run benchmarks quietly (no progress output)
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llm_orchestrator={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Validate { file } => validate_workflow(&file),
        Commands::ExecuteWorkflow { file, input, risk_rules, log_events, audit_store } => {
            execute_workflow_command(&file, input.as_deref(), risk_rules.as_deref(), log_events.as_deref(), &audit_store)
                .await
        }
        Commands::StreamEvents { execution_id, store } => replay_stream_events(&execution_id, &store),
        Commands::ReplayAudit { execution_id, store } => replay_audit(&execution_id, &store).await,
        Commands::Benchmark { output, format, quiet } => run_benchmarks(&output, &format, quiet).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_workflow(file_path: &str) -> Result<WorkflowDefinition> {
    let content =
        fs::read_to_string(file_path).with_context(|| format!("Failed to read workflow file: {}", file_path))?;
    let workflow: WorkflowDefinition = if file_path.ends_with(".json") {
        serde_json::from_str(&content).with_context(|| format!("Failed to parse workflow JSON: {}", file_path))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse workflow YAML: {}", file_path))?
    };
    Ok(workflow)
}

fn validate_workflow(file_path: &str) -> Result<()> {
    info!("Validating workflow: {}", file_path);
    println!("{} {}", "Validating workflow:".cyan().bold(), file_path);

    let workflow = load_workflow(file_path)?;
    workflow.validate().with_context(|| "Workflow validation failed")?;
    let dag = llm_orchestrator_core::dag::WorkflowDAG::from_workflow(&workflow)
        .with_context(|| "Failed to build workflow DAG (possible cycle detected)")?;

    println!("{}", "\u{2713} Workflow is valid".green().bold());
    println!("  Schema: {} v{}", workflow.schema_key, workflow.version);
    println!("  Steps: {}", workflow.steps.len());
    println!("  Waves: {}", dag.execution_order().len());

    Ok(())
}

fn parse_input(input_str: &str) -> Result<Value> {
    if Path::new(input_str).exists() {
        let content = fs::read_to_string(input_str)
            .with_context(|| format!("Failed to read input file: {}", input_str))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse input JSON from file: {}", input_str))
    } else {
        serde_json::from_str(input_str).with_context(|| "Failed to parse input JSON string")
    }
}

fn load_risk_rules(path: Option<&str>) -> Result<RiskRulesConfig> {
    let Some(path) = path else { return Ok(RiskRulesConfig::default()) };
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read risk rules file: {}", path))?;
    if path.ends_with(".json") {
        serde_json::from_str(&content).with_context(|| format!("Failed to parse risk rules JSON: {}", path))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse risk rules YAML: {}", path))
    }
}

/// Adapts [`AuditLogger`] to the orchestrator's narrow [`AuditSink`] port.
struct AuditLoggerSink(AuditLogger);

#[async_trait]
impl AuditSink for AuditLoggerSink {
    async fn log_rule_evaluation(
        &self,
        execution_id: &str,
        rule_id: &str,
        matched: bool,
        action: Option<&str>,
        context: &Value,
    ) -> std::result::Result<(), String> {
        self.0
            .log_rule_evaluation(execution_id, rule_id, matched, action, context)
            .await
            .map_err(|e| e.to_string())
    }

    async fn log_routing_decision(
        &self,
        execution_id: &str,
        decision: &str,
        reason: &str,
        contributing_rules: Vec<String>,
    ) -> std::result::Result<(), String> {
        self.0
            .log_routing_decision(execution_id, decision, reason, contributing_rules)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Picks whichever LLM provider is available from the environment and
/// registers it as the `"llm_call"` step executor. Only one provider can
/// back a given `Step.kind` at a time, so Anthropic is preferred when both
/// are configured.
fn register_llm_executor(registry: &mut StepExecutorRegistry) -> Result<()> {
    if let Ok(anthropic) = AnthropicProvider::from_env() {
        info!("Registered Anthropic provider for llm_call steps");
        registry.register(Box::new(LLMStepExecutor::new(anthropic)));
        return Ok(());
    }
    if let Ok(openai) = OpenAIProvider::from_env() {
        info!("Registered OpenAI provider for llm_call steps");
        registry.register(Box::new(LLMStepExecutor::new(openai)));
        return Ok(());
    }
    info!("No LLM provider available (set ANTHROPIC_API_KEY or OPENAI_API_KEY); llm_call steps will fail to resolve");
    Ok(())
}

async fn execute_workflow_command(
    file_path: &str,
    input: Option<&str>,
    risk_rules_path: Option<&str>,
    log_events_dir: Option<&str>,
    audit_store_dir: &str,
) -> Result<()> {
    info!("Executing workflow: {}", file_path);
    println!("{} {}", "Executing workflow:".cyan().bold(), file_path);

    let workflow = load_workflow(file_path)?;
    workflow.validate().with_context(|| "Workflow validation failed")?;

    let input_value = match input {
        Some(s) => parse_input(s)?,
        None => Value::Object(Default::default()),
    };
    let risk_rules = load_risk_rules(risk_rules_path)?;

    let catalog = Arc::new(InMemoryWorkflowCatalog::new());
    let schema_key = workflow.schema_key.clone();
    let version = workflow.version.clone();
    catalog.insert(workflow);

    let risk_store = Arc::new(InMemoryRiskRulesStore::new());
    risk_store.insert(schema_key.clone(), risk_rules);

    let storage = Arc::new(
        FileAuditStorage::new(PathBuf::from(audit_store_dir).join("audit.log"), RotationPolicy::Never)
            .with_context(|| format!("Failed to open audit store at {}", audit_store_dir))?,
    );
    let audit: Arc<dyn AuditSink> = Arc::new(AuditLoggerSink(AuditLogger::new(storage)));

    let streaming = Arc::new(StreamingManager::new());

    let mut registry = StepExecutorRegistry::new();
    register_llm_executor(&mut registry)?;

    let orchestrator =
        WorkflowOrchestrator::new(catalog, risk_store, audit, streaming.clone(), Arc::new(registry));

    println!("{}", "Running...".cyan());
    let response = orchestrator
        .execute_workflow(&schema_key, &version, input_value, Value::Object(Default::default()), None)
        .await
        .with_context(|| "Workflow execution failed")?;

    if let Some(dir) = log_events_dir {
        persist_stream_events(&streaming, &response.execution_id, dir)?;
    }

    println!("{}", "\u{2713} Workflow completed".green().bold());
    println!("  Execution ID: {}", response.execution_id);
    println!("  Status: {:?}", response.status);
    println!("  Routing decision: {:?}", response.routing_decision);
    println!("  Requires human review: {}", response.requires_hitl);
    println!("\n{}", "Result:".cyan().bold());
    println!("{}", serde_json::to_string_pretty(&response).unwrap_or_else(|_| format!("{:?}", response)));

    Ok(())
}

/// Drains a now-terminal execution's full event backlog (the Streaming
/// Manager replays the buffer then closes the channel once an execution
/// has finished) and appends it to `<dir>/<execution_id>.jsonl`.
fn persist_stream_events(streaming: &StreamingManager, execution_id: &str, dir: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create stream event directory: {}", dir))?;
    let path = PathBuf::from(dir).join(format!("{}.jsonl", execution_id));
    let mut rx = streaming.subscribe(execution_id);
    let mut lines = Vec::new();
    while let Ok(event) = rx.try_recv() {
        lines.push(serde_json::to_string(&event)?);
    }
    fs::write(&path, lines.join("\n") + "\n").with_context(|| format!("Failed to write {}", path.display()))?;
    println!("  Stream events written: {}", path.display().to_string().dimmed());
    Ok(())
}

fn replay_stream_events(execution_id: &str, store: &str) -> Result<()> {
    let path = PathBuf::from(store).join(format!("{}.jsonl", execution_id));
    let content = fs::read_to_string(&path)
        .with_context(|| format!("No recorded stream events at {} (run execute-workflow with --log-events first)", path.display()))?;

    println!("{} {}", "Stream events for".cyan().bold(), execution_id);
    for line in content.lines().filter(|l| !l.is_empty()) {
        let event: llm_orchestrator_core::streaming::StreamEvent =
            serde_json::from_str(line).with_context(|| "Failed to parse a recorded stream event")?;
        println!("  [{}] {:?} {}", event.timestamp.to_rfc3339(), event.event, event.data);
    }
    Ok(())
}

async fn replay_audit(execution_id: &str, store: &str) -> Result<()> {
    let storage = FileAuditStorage::new(PathBuf::from(store).join("audit.log"), RotationPolicy::Never)
        .with_context(|| format!("Failed to open audit store at {}", store))?;

    let filter = AuditFilter { resource_type: Some(ResourceType::Execution), resource_id: Some(execution_id.to_string()), limit: 10_000, ..AuditFilter::new() };
    let events = llm_orchestrator_audit::AuditStorage::query(&storage, filter)
        .await
        .with_context(|| "Failed to query the audit store")?;

    if events.is_empty() {
        println!("{}", "No audit records found for this execution.".yellow());
        return Ok(());
    }

    println!("{} {}", "Audit trail for".cyan().bold(), execution_id);
    for event in &events {
        let label = match event.event_type {
            AuditEventType::RuleEvaluation => "rule".cyan(),
            AuditEventType::RoutingDecision => "routing".magenta(),
            _ => "event".dimmed(),
        };
        println!("  [{}] {} {} — {}", event.timestamp.to_rfc3339(), label, event.action, event.details);
    }

    Ok(())
}

/// Runs the canonical benchmark suite.
async fn run_benchmarks(output_dir: &str, format: &str, quiet: bool) -> Result<()> {
    if !quiet {
        println!("{}", "Running LLM Orchestrator Benchmarks...".cyan().bold());
        println!();
    }

    info!("Starting benchmark suite");

    let results = run_all_benchmarks().await;

    if !quiet {
        println!("{} {} benchmarks", "\u{2713} Completed".green().bold(), results.len());
        println!();

        for result in &results {
            let duration = result
                .metrics
                .get("duration_ms")
                .and_then(|v| v.as_f64())
                .map(|d| format!("{:.2}ms", d))
                .unwrap_or_else(|| "N/A".to_string());

            let ops = result
                .metrics
                .get("ops_per_sec")
                .and_then(|v| v.as_f64())
                .map(|o| format!("{:.0} ops/sec", o))
                .unwrap_or_else(|| "".to_string());

            println!("  {} {} - {} {}", "\u{25cf}".green(), result.target_id.cyan(), duration, ops.dimmed());
        }
        println!();
    }

    fs::create_dir_all(output_dir).with_context(|| format!("Failed to create output directory: {}", output_dir))?;

    let write_json = format == "json" || format == "both";
    let write_md = format == "markdown" || format == "both";

    if write_json {
        let paths = write_raw_results(&results, output_dir).with_context(|| "Failed to write raw benchmark results")?;

        if !quiet {
            println!("{} JSON results written:", "\u{2713}".green().bold());
            for path in &paths {
                println!("  {}", path.dimmed());
            }
        }
    }

    if write_md {
        let summary_path = write_summary(&results, output_dir).with_context(|| "Failed to write benchmark summary")?;

        if !quiet {
            println!("{} Summary written: {}", "\u{2713}".green().bold(), summary_path.dimmed());
        }
    }

    if !quiet {
        println!();
        println!("{}", "Benchmark suite completed successfully!".green().bold());
    }

    info!("Benchmark suite completed with {} results", results.len());

    Ok(())
}
