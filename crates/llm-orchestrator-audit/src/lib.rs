// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tamper-evident audit logging for the orchestrator.
//!
//! Every [`AuditEvent`] carries a SHA-256 hash of its own content chained
//! to the previous event's hash ([`AuditEvent::compute_hash`]), so a
//! storage backend (file, database, or a test double) can be checked for
//! silent edits after the fact. [`AuditLogger`] is the write path; the
//! safety-audit methods (`log_rule_evaluation`, `log_routing_decision`,
//! `record_human_override`, `record_human_decision`) additionally cover
//! the risk-rule engine and human-in-the-loop decisions.

pub mod database;
pub mod file;
pub mod logger;
pub mod models;
pub mod retention;
pub mod storage;

pub use file::{FileAuditStorage, RotationPolicy};
pub use logger::{sanitize_context, AuditLogger, ComplianceReport, RuleEffectivenessSummary};
pub use models::{AuditEvent, AuditEventType, AuditFilter, AuditResult, ResourceType};
pub use retention::AuditRetentionManager;
pub use storage::{AuditStorage, AuditStorageRef, StorageError};

#[cfg(feature = "database")]
pub use database::DatabaseAuditStorage;

/// Crate version, exposed for diagnostics and `/version` endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
