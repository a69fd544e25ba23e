use crate::models::{AuditEvent, AuditEventType, AuditResult, ResourceType};
use crate::storage::{AuditStorage, AuditStorageRef, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Audit logger for recording security and operational events
pub struct AuditLogger {
    storage: AuditStorageRef,
    enabled: bool,
    previous_hash: Arc<RwLock<Option<String>>>,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(storage: AuditStorageRef) -> Self {
        Self {
            storage,
            enabled: true,
            previous_hash: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a disabled audit logger (for testing)
    pub fn disabled() -> Self {
        Self {
            storage: Arc::new(NoOpStorage),
            enabled: false,
            previous_hash: Arc::new(RwLock::new(None)),
        }
    }

    /// Check if the audit logger is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Log an authentication attempt
    pub async fn log_auth_attempt(
        &self,
        user_id: &str,
        success: bool,
        ip_address: Option<String>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let result = if success {
            AuditResult::Success
        } else {
            AuditResult::Failure("Authentication failed".to_string())
        };

        let event = AuditEvent::new(
            AuditEventType::Authentication,
            "User authentication attempt".to_string(),
            ResourceType::User,
            user_id.to_string(),
            result,
        )
        .with_user_id(user_id.to_string())
        .with_ip_address(ip_address.unwrap_or_default());

        self.log_event(event).await
    }

    /// Log an authorization check
    pub async fn log_authorization(
        &self,
        user_id: &str,
        permission: &str,
        resource_id: &str,
        allowed: bool,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let result = if allowed {
            AuditResult::Success
        } else {
            AuditResult::Failure(format!("Permission denied: {}", permission))
        };

        let event = AuditEvent::new(
            AuditEventType::Authorization,
            format!("Authorization check: {}", permission),
            ResourceType::User,
            resource_id.to_string(),
            result,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "permission": permission,
            "allowed": allowed,
        }));

        self.log_event(event).await
    }

    /// Log a workflow execution
    pub async fn log_workflow_execution(
        &self,
        workflow_id: &str,
        user_id: &str,
        result: AuditResult,
        duration: Duration,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::WorkflowExecution,
            "Workflow executed".to_string(),
            ResourceType::Workflow,
            workflow_id.to_string(),
            result,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "duration_ms": duration.as_millis() as u64,
        }));

        self.log_event(event).await
    }

    /// Log a workflow creation
    pub async fn log_workflow_create(
        &self,
        workflow_id: &str,
        workflow_name: &str,
        user_id: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::WorkflowCreate,
            "Workflow created".to_string(),
            ResourceType::Workflow,
            workflow_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "workflow_name": workflow_name,
        }));

        self.log_event(event).await
    }

    /// Log a workflow update
    pub async fn log_workflow_update(
        &self,
        workflow_id: &str,
        user_id: &str,
        changes: serde_json::Value,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::WorkflowUpdate,
            "Workflow updated".to_string(),
            ResourceType::Workflow,
            workflow_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string())
        .with_details(changes);

        self.log_event(event).await
    }

    /// Log a workflow deletion
    pub async fn log_workflow_delete(
        &self,
        workflow_id: &str,
        user_id: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::WorkflowDelete,
            "Workflow deleted".to_string(),
            ResourceType::Workflow,
            workflow_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string());

        self.log_event(event).await
    }

    /// Log secret access
    pub async fn log_secret_access(
        &self,
        secret_key: &str,
        user_id: &str,
        accessed_at: DateTime<Utc>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::SecretAccess,
            "Secret accessed".to_string(),
            ResourceType::Secret,
            secret_key.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "accessed_at": accessed_at.to_rfc3339(),
        }));

        self.log_event(event).await
    }

    /// Log configuration change
    pub async fn log_config_change(
        &self,
        config_key: &str,
        old_value: Option<&str>,
        new_value: &str,
        changed_by: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::ConfigChange,
            "Configuration changed".to_string(),
            ResourceType::Configuration,
            config_key.to_string(),
            AuditResult::Success,
        )
        .with_user_id(changed_by.to_string())
        .with_details(serde_json::json!({
            "old_value": old_value,
            "new_value": new_value,
        }));

        self.log_event(event).await
    }

    /// Log API key creation
    pub async fn log_api_key_create(
        &self,
        key_id: &str,
        user_id: &str,
        scopes: Vec<String>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::ApiKeyCreate,
            "API key created".to_string(),
            ResourceType::ApiKey,
            key_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "scopes": scopes,
        }));

        self.log_event(event).await
    }

    /// Log API key revocation
    pub async fn log_api_key_revoke(
        &self,
        key_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::ApiKeyRevoke,
            "API key revoked".to_string(),
            ResourceType::ApiKey,
            key_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "reason": reason,
        }));

        self.log_event(event).await
    }

    /// Log a step execution
    pub async fn log_step_execution(
        &self,
        workflow_id: &str,
        step_id: &str,
        user_id: &str,
        result: AuditResult,
        duration: Duration,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::StepExecution,
            format!("Step executed: {}", step_id),
            ResourceType::Step,
            step_id.to_string(),
            result,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "workflow_id": workflow_id,
            "duration_ms": duration.as_millis() as u64,
        }));

        self.log_event(event).await
    }

    /// Log a generic audit event
    pub async fn log_event(&self, mut event: AuditEvent) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        // Add hash chain for tamper detection
        let prev_hash = self.previous_hash.read().clone();
        event.previous_hash = prev_hash;
        event.event_hash = Some(event.compute_hash());

        // Store the event
        self.storage.store(&event).await?;

        // Update previous hash
        *self.previous_hash.write() = event.event_hash.clone();

        tracing::debug!(
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            user_id = ?event.user_id,
            "Audit event logged"
        );

        Ok(())
    }

    /// Get the storage backend
    pub fn storage(&self) -> &AuditStorageRef {
        &self.storage
    }

    /// Log a single risk-rule evaluation (global, step, exception, or
    /// escalation rule) against an execution.
    pub async fn log_rule_evaluation(
        &self,
        execution_id: &str,
        rule_id: &str,
        matched: bool,
        action: Option<&str>,
        context: &serde_json::Value,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::RuleEvaluation,
            format!("Rule evaluated: {}", rule_id),
            ResourceType::Execution,
            execution_id.to_string(),
            AuditResult::Success,
        )
        .with_details(serde_json::json!({
            "rule_id": rule_id,
            "matched": matched,
            "action": action,
            "context": sanitize_context(context, 0),
        }));

        self.log_event(event).await
    }

    /// Log the final routing decision reached for an execution.
    pub async fn log_routing_decision(
        &self,
        execution_id: &str,
        decision: &str,
        reason: &str,
        contributing_rules: Vec<String>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::RoutingDecision,
            format!("Routing decision: {}", decision),
            ResourceType::Execution,
            execution_id.to_string(),
            AuditResult::Success,
        )
        .with_details(serde_json::json!({
            "decision": decision,
            "reason": reason,
            "contributing_rules": contributing_rules,
        }));

        self.log_event(event).await
    }

    /// Record that a rule's observed effectiveness changed (e.g. a rule
    /// that keeps firing but whose routing decision is consistently
    /// overridden by a human).
    pub async fn update_rule_effectiveness(
        &self,
        rule_id: &str,
        true_positive: bool,
        notes: Option<&str>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let result = if true_positive {
            AuditResult::Success
        } else {
            AuditResult::PartialSuccess
        };

        let event = AuditEvent::new(
            AuditEventType::RuleEvaluation,
            format!("Rule effectiveness recorded: {}", rule_id),
            ResourceType::System,
            rule_id.to_string(),
            result,
        )
        .with_details(serde_json::json!({
            "rule_id": rule_id,
            "true_positive": true_positive,
            "notes": notes,
        }));

        self.log_event(event).await
    }

    /// Record that a human overrode an automated routing decision.
    pub async fn record_human_override(
        &self,
        execution_id: &str,
        user_id: &str,
        original_decision: &str,
        overridden_decision: &str,
        reason: &str,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::HumanOverride,
            format!(
                "Human override: {} -> {}",
                original_decision, overridden_decision
            ),
            ResourceType::Execution,
            execution_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "original_decision": original_decision,
            "overridden_decision": overridden_decision,
            "reason": reason,
        }));

        self.log_event(event).await
    }

    /// Record a human's HITL decision (approve/reject/escalate) for an
    /// execution routed for review.
    pub async fn record_human_decision(
        &self,
        execution_id: &str,
        user_id: &str,
        decision: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let event = AuditEvent::new(
            AuditEventType::HumanDecision,
            format!("Human decision: {}", decision),
            ResourceType::Execution,
            execution_id.to_string(),
            AuditResult::Success,
        )
        .with_user_id(user_id.to_string())
        .with_details(serde_json::json!({
            "decision": decision,
            "reason": reason,
        }));

        self.log_event(event).await
    }

    /// Fetch the full audit trail for one execution, oldest first.
    pub async fn get_audit_trail(&self, execution_id: &str) -> Result<Vec<AuditEvent>> {
        let filter = crate::models::AuditFilter::new()
            .with_resource_id(execution_id.to_string())
            .with_resource_type(ResourceType::Execution)
            .with_limit(usize::MAX);
        let mut events = self.storage.query(filter).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// Fetch the routing-decision history for one execution, oldest
    /// first.
    pub async fn get_routing_history(&self, execution_id: &str) -> Result<Vec<AuditEvent>> {
        let filter = crate::models::AuditFilter::new()
            .with_resource_id(execution_id.to_string())
            .with_resource_type(ResourceType::Execution)
            .with_event_type(AuditEventType::RoutingDecision)
            .with_limit(usize::MAX);
        let mut events = self.storage.query(filter).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// Summarize recorded rule-effectiveness events: total observations,
    /// true positives, and the resulting precision (0.0 when there are
    /// no observations yet).
    pub async fn get_rule_effectiveness_summary(&self) -> Result<RuleEffectivenessSummary> {
        let filter = crate::models::AuditFilter::new()
            .with_event_type(AuditEventType::RuleEvaluation)
            .with_limit(usize::MAX);
        let events = self.storage.query(filter).await?;

        let mut total = 0u64;
        let mut true_positives = 0u64;
        for event in &events {
            if event.details.get("true_positive").is_none() {
                continue;
            }
            total += 1;
            if event
                .details
                .get("true_positive")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                true_positives += 1;
            }
        }

        let precision = if total == 0 {
            0.0
        } else {
            true_positives as f64 / total as f64
        };

        Ok(RuleEffectivenessSummary {
            total_observations: total,
            true_positives,
            precision,
        })
    }

    /// Build a compliance report covering `start`..=`end`: event counts
    /// by type, failure count, and the full set of routing decisions
    /// made in the window.
    pub async fn generate_compliance_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ComplianceReport> {
        let filter = crate::models::AuditFilter::new()
            .with_time_range(start, end)
            .with_limit(usize::MAX);
        let events = self.storage.query(filter).await?;

        let mut events_by_type: std::collections::BTreeMap<String, u64> =
            std::collections::BTreeMap::new();
        let mut failures = 0u64;
        let mut routing_decisions = Vec::new();

        for event in &events {
            *events_by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
            if matches!(event.result, AuditResult::Failure(_)) {
                failures += 1;
            }
            if event.event_type == AuditEventType::RoutingDecision {
                routing_decisions.push(event.clone());
            }
        }

        Ok(ComplianceReport {
            period_start: start,
            period_end: end,
            total_events: events.len() as u64,
            events_by_type,
            failure_count: failures,
            routing_decisions,
        })
    }
}

/// Aggregate precision of the risk-rule engine, computed from recorded
/// `update_rule_effectiveness` observations.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleEffectivenessSummary {
    pub total_observations: u64,
    pub true_positives: u64,
    pub precision: f64,
}

/// A compliance report covering one time window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComplianceReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_events: u64,
    pub events_by_type: std::collections::BTreeMap<String, u64>,
    pub failure_count: u64,
    pub routing_decisions: Vec<AuditEvent>,
}

/// Recursively redacts a context value before it is persisted in an
/// audit event's `details`: caps nesting depth, truncates long strings
/// and long arrays, and renders byte-like blobs as a placeholder rather
/// than inlining them.
const MAX_SANITIZE_DEPTH: usize = 5;
const MAX_STRING_LEN: usize = 10_000;
const MAX_LIST_LEN: usize = 100;

pub fn sanitize_context(value: &serde_json::Value, depth: usize) -> serde_json::Value {
    if depth >= MAX_SANITIZE_DEPTH {
        return serde_json::Value::String("<max-depth-exceeded>".to_string());
    }

    match value {
        serde_json::Value::String(s) => {
            if s.len() > MAX_STRING_LEN {
                serde_json::Value::String(format!(
                    "{}...<truncated:{}>",
                    &s[..MAX_STRING_LEN],
                    s.len()
                ))
            } else {
                serde_json::Value::String(s.clone())
            }
        }
        serde_json::Value::Array(items) => {
            let truncated = items.len() > MAX_LIST_LEN;
            let mut out: Vec<serde_json::Value> = items
                .iter()
                .take(MAX_LIST_LEN)
                .map(|v| sanitize_context(v, depth + 1))
                .collect();
            if truncated {
                out.push(serde_json::Value::String(format!(
                    "<truncated:{}>",
                    items.len() - MAX_LIST_LEN
                )));
            }
            serde_json::Value::Array(out)
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), sanitize_context(v, depth + 1));
            }
            serde_json::Value::Object(out)
        }
        other => other.clone(),
    }
}

/// No-op storage for disabled audit logger
struct NoOpStorage;

#[async_trait::async_trait]
impl AuditStorage for NoOpStorage {
    async fn store(&self, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _filter: crate::models::AuditFilter) -> Result<Vec<AuditEvent>> {
        Ok(vec![])
    }

    async fn get(&self, _id: uuid::Uuid) -> Result<Option<AuditEvent>> {
        Ok(None)
    }

    async fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(0)
    }

    async fn count(&self, _filter: crate::models::AuditFilter) -> Result<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileAuditStorage, RotationPolicy};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_audit_logger_workflow_execution() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_workflow_execution(
                "workflow-123",
                "user-456",
                AuditResult::Success,
                Duration::from_millis(500),
            )
            .await
            .unwrap();

        let filter = crate::models::AuditFilter::new();
        let events = storage.query(filter).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::WorkflowExecution);
        assert_eq!(events[0].resource_id, "workflow-123");
    }

    #[tokio::test]
    async fn test_audit_logger_hash_chain() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        // Log first event
        logger
            .log_auth_attempt("user-1", true, Some("192.168.1.1".to_string()))
            .await
            .unwrap();

        // Log second event
        logger
            .log_auth_attempt("user-2", true, Some("192.168.1.2".to_string()))
            .await
            .unwrap();

        let filter = crate::models::AuditFilter::new();
        let events = storage.query(filter).await.unwrap();

        assert_eq!(events.len(), 2);

        // Second event should reference first event's hash
        assert!(events[0].previous_hash.is_some());
        assert!(events[1].previous_hash.is_none()); // First event has no previous
    }

    #[tokio::test]
    async fn test_disabled_logger() {
        let logger = AuditLogger::disabled();

        assert!(!logger.is_enabled());

        // Should not error when disabled
        logger
            .log_workflow_execution(
                "workflow-123",
                "user-456",
                AuditResult::Success,
                Duration::from_millis(500),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rule_evaluation_and_routing_decision_round_trip() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_rule_evaluation(
                "exec-1",
                "global-high-cost",
                true,
                Some("flag"),
                &serde_json::json!({"cost": 42}),
            )
            .await
            .unwrap();
        logger
            .log_routing_decision(
                "exec-1",
                "review",
                "cost exceeded threshold",
                vec!["global-high-cost".to_string()],
            )
            .await
            .unwrap();

        let trail = logger.get_audit_trail("exec-1").await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event_type, AuditEventType::RuleEvaluation);
        assert_eq!(trail[1].event_type, AuditEventType::RoutingDecision);

        let routing = logger.get_routing_history("exec-1").await.unwrap();
        assert_eq!(routing.len(), 1);
        assert_eq!(routing[0].details["decision"], "review");
    }

    #[tokio::test]
    async fn test_rule_effectiveness_summary() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        logger
            .update_rule_effectiveness("global-high-cost", true, None)
            .await
            .unwrap();
        logger
            .update_rule_effectiveness("global-high-cost", false, Some("false alarm"))
            .await
            .unwrap();

        let summary = logger.get_rule_effectiveness_summary().await.unwrap();
        assert_eq!(summary.total_observations, 2);
        assert_eq!(summary.true_positives, 1);
        assert!((summary.precision - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sanitize_context_truncates_long_strings_and_lists() {
        let long_string = "x".repeat(20_000);
        let long_list: Vec<serde_json::Value> =
            (0..200).map(|i| serde_json::json!(i)).collect();
        let value = serde_json::json!({
            "s": long_string,
            "l": long_list,
        });

        let sanitized = sanitize_context(&value, 0);
        let s = sanitized["s"].as_str().unwrap();
        assert!(s.len() < 20_000);
        assert!(s.contains("truncated"));
        let l = sanitized["l"].as_array().unwrap();
        assert_eq!(l.len(), 101); // 100 kept + one truncation marker
    }

    #[test]
    fn test_sanitize_context_caps_nesting_depth() {
        let mut value = serde_json::json!("leaf");
        for _ in 0..10 {
            value = serde_json::json!({ "nested": value });
        }
        let sanitized = sanitize_context(&value, 0);
        // Walk down; at MAX_SANITIZE_DEPTH the placeholder string appears.
        let mut cursor = &sanitized;
        for _ in 0..MAX_SANITIZE_DEPTH {
            cursor = &cursor["nested"];
        }
        assert_eq!(cursor.as_str(), Some("<max-depth-exceeded>"));
    }

    #[tokio::test]
    async fn test_audit_logger_secret_access() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Arc::new(
            FileAuditStorage::new(temp_file.path().to_path_buf(), RotationPolicy::Never).unwrap(),
        );
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_secret_access("api_key", "user-123", Utc::now())
            .await
            .unwrap();

        let filter = crate::models::AuditFilter::new();
        let events = storage.query(filter).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::SecretAccess);
        assert_eq!(events[0].resource_type, ResourceType::Secret);
    }
}
