// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire-format data model for the configurable risk rule engine (spec §3/§6):
//! `RiskRulesConfig` and its four rule kinds.

use serde::{Deserialize, Serialize};

/// The action a triggered rule requests. Ordered by `ACTION_PRIORITY`
/// (component G): `auto_approve(0) < continue(1) < warn(2) <
/// require_review(3) < pause(4) < require_hitl(5) < escalate(6) < block(7)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AutoApprove,
    Continue,
    Warn,
    RequireReview,
    Pause,
    RequireHitl,
    Escalate,
    Block,
}

impl Action {
    /// The `ACTION_PRIORITY` total order, lowest first.
    pub fn priority(self) -> u8 {
        match self {
            Action::AutoApprove => 0,
            Action::Continue => 1,
            Action::Warn => 2,
            Action::RequireReview => 3,
            Action::Pause => 4,
            Action::RequireHitl => 5,
            Action::Escalate => 6,
            Action::Block => 7,
        }
    }

    /// `action -> decision` mapping used for a single evaluation call's
    /// result (spec §4.7): `auto_approve->approve`, `continue->continue`,
    /// `warn->warn`, `{require_review,pause,require_hitl}->pause`,
    /// `escalate->escalate`, `block->block`.
    pub fn to_decision(self) -> RoutingDecision {
        match self {
            Action::AutoApprove => RoutingDecision::Approve,
            Action::Continue => RoutingDecision::Continue,
            Action::Warn => RoutingDecision::Warn,
            Action::RequireReview | Action::Pause | Action::RequireHitl => RoutingDecision::Pause,
            Action::Escalate => RoutingDecision::Escalate,
            Action::Block => RoutingDecision::Block,
        }
    }
}

/// Final or per-call routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    Approve,
    Continue,
    Warn,
    Pause,
    Escalate,
    Block,
}

/// A rule evaluated against every step (not attached to a specific step).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRule {
    pub rule_id: String,
    pub condition: String,
    pub risk_factor: f64,
    pub action_if_triggered: Action,
    pub message: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A rule attached to a specific step by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRule {
    pub rule_id: String,
    pub step_name: String,
    pub condition: String,
    pub risk_factor: f64,
    pub action_if_triggered: Action,
    pub message: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A rule that can relax the final decision (allow auto-approval or raise
/// the risk ceiling under which auto-approval remains valid).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRule {
    pub rule_id: String,
    pub condition: String,
    pub auto_approve_override: bool,
    pub max_risk_override: f64,
    pub message: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// A rule that requests human escalation at a given severity level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRule {
    pub rule_id: String,
    pub condition: String,
    /// 1..=5.
    pub escalation_level: u8,
    pub message: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The complete set of risk rules attached to a workflow schema/version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRulesConfig {
    #[serde(default)]
    pub global_rules: Vec<GlobalRule>,
    #[serde(default)]
    pub step_rules: Vec<StepRule>,
    #[serde(default)]
    pub exception_rules: Vec<ExceptionRule>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
}

/// Caller-supplied six-field risk vector made available to rule conditions
/// as `$assessment.*` (spec §3/§9 decision 7 — always caller-supplied, never
/// zero-filled internally).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub safety_risk: f64,
    pub technical_risk: f64,
    pub compliance_risk: f64,
    pub financial_risk: f64,
    pub execution_risk: f64,
    pub anomaly_risk: f64,
}

impl Assessment {
    /// Context representation for `$assessment.*` condition resolution.
    /// Keys are snake_case to match the condition language and the
    /// caller-supplied risk vector's field names, not the camelCase wire
    /// format `Serialize` produces for the rest of the API.
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "safety_risk": self.safety_risk,
            "technical_risk": self.technical_risk,
            "compliance_risk": self.compliance_risk,
            "financial_risk": self.financial_risk,
            "execution_risk": self.execution_risk,
            "anomaly_risk": self.anomaly_risk,
        })
    }
}

/// Outcome of a single rule's evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEvaluationResult {
    pub rule_id: String,
    pub condition_result: bool,
    pub risk_factor: f64,
    pub action: Action,
    pub message: String,
}

/// Aggregate outcome of one `evaluateGlobal`/`evaluateStepRules` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvaluationResult {
    pub step_number: u32,
    pub step_name: String,
    pub triggered: Vec<RuleEvaluationResult>,
    pub aggregate_risk_factor: f64,
    pub highest_action: Option<Action>,
    pub decision: RoutingDecision,
}

/// Outcome of `evaluateWorkflow`: the end-of-run decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvaluationResult {
    pub global: StepEvaluationResult,
    pub step_results: Vec<StepEvaluationResult>,
    pub can_auto_approve: bool,
    pub max_risk_override: f64,
    pub exceptions_triggered: Vec<RuleEvaluationResult>,
    pub escalation_level: Option<u8>,
    pub escalations_triggered: Vec<RuleEvaluationResult>,
    pub final_risk_score: f64,
    pub final_routing_decision: RoutingDecision,
    pub requires_hitl: bool,
    pub summary_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_priority_is_total_order() {
        let ordered = [
            Action::AutoApprove,
            Action::Continue,
            Action::Warn,
            Action::RequireReview,
            Action::Pause,
            Action::RequireHitl,
            Action::Escalate,
            Action::Block,
        ];
        for w in ordered.windows(2) {
            assert!(w[0].priority() < w[1].priority());
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn action_to_decision_mapping() {
        assert_eq!(Action::AutoApprove.to_decision(), RoutingDecision::Approve);
        assert_eq!(Action::RequireReview.to_decision(), RoutingDecision::Pause);
        assert_eq!(Action::Pause.to_decision(), RoutingDecision::Pause);
        assert_eq!(Action::RequireHitl.to_decision(), RoutingDecision::Pause);
        assert_eq!(Action::Escalate.to_decision(), RoutingDecision::Escalate);
        assert_eq!(Action::Block.to_decision(), RoutingDecision::Block);
    }

    #[test]
    fn config_deserializes_from_yaml() {
        let yaml = r#"
globalRules:
  - ruleId: g1
    condition: "$input.amount > 10000"
    riskFactor: 0.4
    actionIfTriggered: require_review
    message: "large amount"
stepRules: []
exceptionRules: []
escalationRules: []
"#;
        let cfg: RiskRulesConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.global_rules.len(), 1);
        assert_eq!(cfg.global_rules[0].action_if_triggered, Action::RequireReview);
    }
}
