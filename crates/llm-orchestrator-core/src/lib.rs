// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core workflow execution engine: dependency graph and scheduler,
//! parallel executor, retry/timeout/condition/validation subsystems, the
//! dynamic risk rule engine, and the workflow/agent orchestrators that tie
//! them together behind a single `executeWorkflow` entrypoint.
//!
//! Module map (component letters match the design doc):
//!
//! - [`condition`] — Condition Evaluator (A)
//! - [`validation`] — Validation Engine (B)
//! - [`retry`] — Retry Manager (C)
//! - [`timeout`] — Timeout Manager (D)
//! - [`dag`] — Dependency Graph (E)
//! - [`streaming`] — Streaming Manager (F)
//! - [`risk`] — Risk Rule Parser & Engine (G)
//! - [`executor`] — Parallel Executor (H)
//! - [`orchestrator`] — Workflow Orchestrator (J)
//! - [`agent`] — Agent Orchestrator (K)
//! - [`learning`] — Correction/Preference learners (L)

pub mod agent;
pub mod condition;
pub mod context;
pub mod dag;
pub mod error;
pub mod executor;
pub mod learning;
pub mod orchestrator;
pub mod providers;
pub mod retry;
pub mod risk;
pub mod streaming;
pub mod timeout;
pub mod validation;
pub mod workflow;

pub use context::{ExecutionContext, SharedContext, StepResult, StepStatus};
pub use dag::WorkflowDAG;
pub use error::{OrchestratorError, Result};
pub use executor::{execute_workflow, ExecutionStatus, ParallelExecutionResult};
pub use orchestrator::{ExecuteWorkflowResponse, WorkflowOrchestrator};
pub use providers::{LLMProvider, StepExecutor, StepExecutorRegistry};
pub use workflow::{Step, WorkflowDefinition};

/// Library version, exposed for diagnostics and `/version` endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
