// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the workflow execution engine.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the orchestrator core.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Referenced step does not exist.
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// A step's configuration doesn't match its declared kind.
    #[error("invalid step config for '{step_id}': {reason}")]
    InvalidStepConfig { step_id: String, reason: String },

    /// Workflow definition failed structural validation.
    #[error("workflow validation failed: {0}")]
    Validation(String),

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {0}")]
    CyclicDependency(String),

    /// A step referenced a step number that doesn't precede it.
    #[error("forward or self reference: step {from} references step {to}")]
    ForwardReference { from: u32, to: u32 },

    /// Condition or expression parsing failed.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A variable referenced in an expression could not be resolved.
    #[error("unresolved variable: {0}")]
    UnresolvedVariable(String),

    /// An operator was applied to operands of incompatible types.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// An operator is not supported by the grammar.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A call exceeded its deadline.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The execution was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// Schema or custom-rule validation failed.
    #[error("validation issue: {0}")]
    SchemaViolation(String),

    /// Underlying JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying YAML (de)serialization failure.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Catch-all for provider/adapter errors and anything not otherwise classified.
    #[error("{0}")]
    Other(String),
}

impl OrchestratorError {
    /// Convenience constructor for an ad-hoc error message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
