// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ergonomic Rust SDK for building and running deliverable workflows
//! programmatically, without hand-assembling `WorkflowDefinition`/`Step`
//! structs or wiring the orchestrator's ports by hand.
//!
//! [`WorkflowBuilder`] constructs a validated [`WorkflowDefinition`]
//! fluently; [`OrchestratorClient`] wraps [`WorkflowOrchestrator`] with
//! sensible in-memory defaults for the catalog, risk-rules store, and
//! audit sink, so a caller can register a workflow and step executors and
//! call `run` in a handful of lines.

pub mod builder;
pub mod client;

pub use builder::{StepBuilder, WorkflowBuilder};
pub use client::{OrchestratorClient, OrchestratorClientBuilder};

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
