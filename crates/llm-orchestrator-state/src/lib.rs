// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional execution-state persistence for the orchestrator.
//!
//! The core workflow engine is explicitly best-effort on in-flight
//! execution (spec §1 Non-goals: no durable step resumption after a
//! crash). This crate is the opt-in persistence port a deployment wires
//! in when it wants to snapshot [`llm_orchestrator_core::context::StepResult`]s
//! as they land, so an operator can inspect or replay a partially
//! completed run after a restart — it does not resume execution itself.
//!
//! Two backends are provided behind [`StateStore`], both via `sqlx`:
//! [`SqliteStateStore`] for local/single-node deployments and
//! [`PostgresStateStore`] for a shared cluster. Both use the same
//! append-only `execution_steps` table shape keyed by `execution_id`.

pub mod models;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use models::{ExecutionSnapshot, StepRecord};
use thiserror::Error;

pub use postgres::PostgresStateStore;
pub use sqlite::SqliteStateStore;

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("execution not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Append-only persistence port for workflow execution state. Mirrors
/// spec §6's description of the relational store: tables keyed by
/// `execution_id`, append-only writes, no in-place mutation of a step
/// once recorded.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Records that an execution started, with its full step count known
    /// up front so a reader can tell "in progress" from "not started".
    async fn record_execution_started(&self, execution_id: &str, schema_key: &str, total_steps: u32) -> Result<()>;

    /// Appends one completed/failed/skipped step. Called once per step,
    /// never updated afterward — matches the core's `steps` map, which is
    /// monotonic (spec §3).
    async fn record_step(&self, execution_id: &str, step: &StepRecord) -> Result<()>;

    /// Marks the execution's terminal state (`completed` or `failed`).
    async fn record_execution_finished(&self, execution_id: &str, status: &str) -> Result<()>;

    /// Reads back everything recorded for one execution, for operator
    /// inspection or offline replay. Returns `NotFound` if no
    /// `record_execution_started` call was ever made for this id.
    async fn load_snapshot(&self, execution_id: &str) -> Result<ExecutionSnapshot>;

    /// Lists execution ids that never reached a terminal status — the
    /// candidates an operator might want to inspect after a crash.
    async fn list_incomplete(&self) -> Result<Vec<String>>;
}
