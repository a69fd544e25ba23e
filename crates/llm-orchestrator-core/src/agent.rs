// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent Orchestrator (component K): a specialization of the Parallel
//! Executor (H) for fanning out to *independent* analysis tasks with no
//! mutual dependencies — no waves, every task launches at once, each with
//! its own timeout and error isolation (spec §4.11).
//!
//! Grounded on `AgentOrchestrator`/`_execute_parallel`/`_execute_single_agent`
//! in the source this spec was distilled from
//! (`original_source/.../strategic_partner/agent_orchestrator.py`), ported
//! to the Timeout Manager (D) rather than a bare `asyncio.wait_for` call.

use crate::timeout::{self, TimeoutConfig, TimeoutStrategy};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// One independent unit of work dispatched to an analyzer.
#[derive(Debug, Clone)]
pub struct AgentTask {
    pub task_id: String,
    pub agent_type: String,
    pub input: Value,
    pub timeout: Duration,
}

/// Outcome of running a single `AgentTask`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub task_id: String,
    pub agent_type: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
    pub duration_ms: u64,
    pub output: Option<Value>,
}

/// Aggregate outcome of one `run_agents` call (spec §4.11
/// `(success, partialSuccess)` plus per-agent breakdown).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelProcessingResult {
    pub success: bool,
    pub partial_success: bool,
    pub agent_results: Vec<AgentResult>,
    pub total_time_ms: u64,
    pub parallel_speedup: f64,
    pub agents_completed: usize,
    pub agents_failed: usize,
}

/// An independent analysis operation, looked up by `AgentTask.agent_type`.
/// Mirrors `StepExecutor` but carries no dependency on a shared
/// `ExecutionContext`: every task's input is fully self-contained (spec
/// §4.11 — "no mutual dependencies").
#[async_trait::async_trait]
pub trait AnalysisAgent: Send + Sync {
    fn agent_type(&self) -> &str;
    async fn analyze(&self, input: Value) -> Result<Value, String>;
}

/// Looks up an [`AnalysisAgent`] by `agent_type`, the fan-out counterpart
/// of `StepExecutorRegistry`.
#[derive(Default)]
pub struct AgentRegistry {
    agents: std::collections::HashMap<String, Box<dyn AnalysisAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self { agents: std::collections::HashMap::new() }
    }

    pub fn register(&mut self, agent: Box<dyn AnalysisAgent>) -> &mut Self {
        self.agents.insert(agent.agent_type().to_string(), agent);
        self
    }

    pub fn get(&self, agent_type: &str) -> Option<&dyn AnalysisAgent> {
        self.agents.get(agent_type).map(|a| a.as_ref())
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Independent fan-out execution (spec §4.11/§5 "multi-agent path").
/// `enable_parallel=false` runs every task sequentially, for debugging,
/// mirroring the Parallel Executor's own `enableParallel` knob.
pub struct AgentOrchestrator {
    enable_parallel: bool,
    default_timeout: Duration,
    total_orchestrations: AtomicU64,
    total_agent_runs: AtomicU64,
    successful_runs: AtomicU64,
    failed_runs: AtomicU64,
    timeouts: AtomicU64,
}

impl AgentOrchestrator {
    pub fn new(default_timeout: Duration, enable_parallel: bool) -> Self {
        Self {
            enable_parallel,
            default_timeout,
            total_orchestrations: AtomicU64::new(0),
            total_agent_runs: AtomicU64::new(0),
            successful_runs: AtomicU64::new(0),
            failed_runs: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    /// Runs `tasks` against `registry`. Every task is fully independent:
    /// one agent's failure or timeout never blocks or cancels another
    /// (spec §4.11 "per-agent error isolation").
    pub async fn run_agents(&self, tasks: Vec<AgentTask>, registry: &AgentRegistry) -> ParallelProcessingResult {
        self.total_orchestrations.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();

        let results = if self.enable_parallel && tasks.len() > 1 {
            futures::future::join_all(tasks.iter().map(|t| self.run_single(t, registry))).await
        } else {
            let mut out = Vec::with_capacity(tasks.len());
            for t in &tasks {
                out.push(self.run_single(t, registry).await);
            }
            out
        };

        let total_time_ms = start.elapsed().as_millis() as u64;
        let sequential_time_ms: u64 = results.iter().map(|r| r.duration_ms).sum();
        let parallel_speedup = if total_time_ms > 0 {
            sequential_time_ms as f64 / total_time_ms as f64
        } else {
            1.0
        };

        let completed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - completed;

        ParallelProcessingResult {
            success: failed == 0,
            partial_success: completed > 0 && failed > 0,
            agent_results: results,
            total_time_ms,
            parallel_speedup,
            agents_completed: completed,
            agents_failed: failed,
        }
    }

    async fn run_single(&self, task: &AgentTask, registry: &AgentRegistry) -> AgentResult {
        self.total_agent_runs.fetch_add(1, Ordering::SeqCst);
        let started_at_ms = now_ms();
        let start = Instant::now();

        let timeout_cfg = TimeoutConfig {
            timeout: if task.timeout.is_zero() { self.default_timeout } else { task.timeout },
            strategy: TimeoutStrategy::Fail,
            fallback_value: None,
        };

        let Some(agent) = registry.get(&task.agent_type) else {
            self.failed_runs.fetch_add(1, Ordering::SeqCst);
            let completed_at_ms = now_ms();
            return AgentResult {
                task_id: task.task_id.clone(),
                agent_type: task.agent_type.clone(),
                success: false,
                error_message: Some(format!("no agent registered for type: {}", task.agent_type)),
                started_at_ms,
                completed_at_ms,
                duration_ms: completed_at_ms.saturating_sub(started_at_ms),
                output: None,
            };
        };

        let input = task.input.clone();
        let outcome = timeout::execute_with_timeout(
            &timeout_cfg,
            async move { agent.analyze(input).await },
            None::<fn() -> std::future::Ready<()>>,
        )
        .await;

        let completed_at_ms = now_ms();
        let duration_ms = start.elapsed().as_millis() as u64;

        if outcome.timed_out {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
        }
        if outcome.success {
            self.successful_runs.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed_runs.fetch_add(1, Ordering::SeqCst);
        }

        AgentResult {
            task_id: task.task_id.clone(),
            agent_type: task.agent_type.clone(),
            success: outcome.success,
            error_message: outcome.error_message,
            started_at_ms,
            completed_at_ms,
            duration_ms,
            output: outcome.result,
        }
    }
}

#[allow(dead_code)]
fn _assert_future_bound<F: Future<Output = ()>>(_: F) {}
