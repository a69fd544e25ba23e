// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Risk Rule Engine (component G): evaluates global/step/exception/
//! escalation rules and resolves the final routing decision.
//!
//! Grounded on the dynamic risk engine in the source this spec was
//! distilled from; reuses `condition.rs` for the rule grammar, which is a
//! superset of the step-condition grammar adding `$assessment.*` and
//! `$steps.<outputVariable>.*`.

use crate::condition::{self, Condition, ConditionContext};
use crate::error::Result;
use crate::risk::model::{
    Action, Assessment, EscalationRule, ExceptionRule, GlobalRule, RiskRulesConfig,
    RuleEvaluationResult, StepEvaluationResult, StepRule, WorkflowEvaluationResult,
};
use serde_json::Value;
use std::collections::HashMap;

/// A read-only snapshot of everything rule conditions may reference.
pub struct RuleContext<'a> {
    pub input: &'a Value,
    pub context: &'a Value,
    /// Keyed by step number as a string (`"1"`, `"2"`, ...): same
    /// `$stepN.*` namespace step conditions use.
    pub steps_by_number: Value,
    /// Keyed by output variable name: the `$steps.<outputVariable>.*`
    /// namespace unique to risk-rule evaluation.
    pub steps_by_var: Value,
    pub assessment: Option<&'a Assessment>,
}

impl<'a> RuleContext<'a> {
    pub fn new(input: &'a Value, context: &'a Value) -> Self {
        Self {
            input,
            context,
            steps_by_number: Value::Object(Default::default()),
            steps_by_var: Value::Object(Default::default()),
            assessment: None,
        }
    }

    pub fn with_assessment(mut self, assessment: &'a Assessment) -> Self {
        self.assessment = Some(assessment);
        self
    }

    pub fn with_steps(mut self, step_outputs: &[(u32, String, Value)]) -> Self {
        let mut by_number = serde_json::Map::new();
        let mut by_var = serde_json::Map::new();
        for (number, var, output) in step_outputs {
            by_number.insert(number.to_string(), output.clone());
            by_var.insert(var.clone(), output.clone());
        }
        self.steps_by_number = Value::Object(by_number);
        self.steps_by_var = Value::Object(by_var);
        self
    }
}

impl<'a> ConditionContext for RuleContext<'a> {
    fn resolve(&self, path: &[String]) -> Result<Value> {
        let Some(head) = path.first() else {
            return Err(crate::error::OrchestratorError::UnresolvedVariable(
                "empty variable".to_string(),
            ));
        };
        if head == "input" {
            return condition::walk(self.input, &path[1..]);
        }
        if head == "context" {
            return condition::walk(self.context, &path[1..]);
        }
        if head == "assessment" {
            let assessment = self.assessment.ok_or_else(|| {
                crate::error::OrchestratorError::UnresolvedVariable(
                    "no assessment supplied for this evaluation".to_string(),
                )
            })?;
            return condition::walk(&assessment.as_json(), &path[1..]);
        }
        if head == "steps" {
            return condition::walk(&self.steps_by_var, &path[1..]);
        }
        if head.starts_with("step") && head.len() > 4 && head[4..].chars().all(|c| c.is_ascii_digit()) {
            let number = &head[4..];
            let value = self.steps_by_number.get(number).cloned().ok_or_else(|| {
                crate::error::OrchestratorError::UnresolvedVariable(format!(
                    "no output recorded for step {}",
                    number
                ))
            })?;
            return condition::walk(&value, &path[1..]);
        }
        Err(crate::error::OrchestratorError::UnresolvedVariable(format!(
            "unknown variable namespace: {}",
            head
        )))
    }
}

/// Stateless evaluator: parses and runs rule conditions, aggregates risk,
/// and resolves routing decisions. Owned explicitly by the workflow
/// orchestrator (spec §9 decision 5) rather than reached for as a
/// singleton.
#[derive(Debug, Default, Clone, Copy)]
pub struct RiskEngine;

impl RiskEngine {
    pub fn new() -> Self {
        Self
    }

    fn evaluate_condition(condition_src: &str, ctx: &dyn ConditionContext) -> bool {
        match Condition::parse(condition_src).and_then(|c| c.evaluate(ctx)) {
            Ok(result) => result,
            Err(_) => false,
        }
    }

    fn aggregate(triggered: &[RuleEvaluationResult]) -> (f64, Option<Action>) {
        let sum: f64 = triggered.iter().map(|r| r.risk_factor).sum();
        let aggregate_risk_factor = sum.min(1.0);
        let highest_action = triggered.iter().map(|r| r.action).max_by_key(|a| a.priority());
        (aggregate_risk_factor, highest_action)
    }

    /// Evaluates every enabled global rule once. Result is keyed as the
    /// synthetic `"global"` step with `stepNumber=0`.
    pub fn evaluate_global(&self, rules: &RiskRulesConfig, ctx: &RuleContext<'_>) -> StepEvaluationResult {
        let triggered: Vec<RuleEvaluationResult> = rules
            .global_rules
            .iter()
            .filter(|r| r.enabled)
            .filter_map(|r| evaluate_global_rule(r, ctx))
            .collect();
        let (aggregate_risk_factor, highest_action) = Self::aggregate(&triggered);
        StepEvaluationResult {
            step_number: 0,
            step_name: "global".to_string(),
            decision: highest_action.map(Action::to_decision).unwrap_or(crate::risk::model::RoutingDecision::Continue),
            triggered,
            aggregate_risk_factor,
            highest_action,
        }
    }

    /// Evaluates only the enabled step rules attached to `step_name`.
    pub fn evaluate_step_rules(
        &self,
        rules: &RiskRulesConfig,
        step_number: u32,
        step_name: &str,
        ctx: &RuleContext<'_>,
    ) -> StepEvaluationResult {
        let triggered: Vec<RuleEvaluationResult> = rules
            .step_rules
            .iter()
            .filter(|r| r.enabled && r.step_name == step_name)
            .filter_map(|r| evaluate_step_rule(r, ctx))
            .collect();
        let (aggregate_risk_factor, highest_action) = Self::aggregate(&triggered);
        StepEvaluationResult {
            step_number,
            step_name: step_name.to_string(),
            decision: highest_action.map(Action::to_decision).unwrap_or(crate::risk::model::RoutingDecision::Continue),
            triggered,
            aggregate_risk_factor,
            highest_action,
        }
    }

    /// Returns `(canAutoApprove, maxRiskOverride, triggered)`.
    pub fn evaluate_exception_rules(
        &self,
        rules: &RiskRulesConfig,
        current_risk_score: f64,
        ctx: &RuleContext<'_>,
    ) -> (bool, f64, Vec<RuleEvaluationResult>) {
        let mut triggered = Vec::new();
        let mut max_risk_override = 0.0_f64;
        let mut any_auto_approve = false;
        for rule in rules.exception_rules.iter().filter(|r| r.enabled) {
            if Self::evaluate_condition(&rule.condition, ctx) {
                max_risk_override = max_risk_override.max(rule.max_risk_override);
                any_auto_approve = any_auto_approve || rule.auto_approve_override;
                triggered.push(RuleEvaluationResult {
                    rule_id: rule.rule_id.clone(),
                    condition_result: true,
                    risk_factor: 0.0,
                    action: if rule.auto_approve_override {
                        Action::AutoApprove
                    } else {
                        Action::Continue
                    },
                    message: rule.message.clone(),
                });
            }
        }

        let mut can_auto_approve = any_auto_approve;
        if can_auto_approve && current_risk_score > max_risk_override {
            can_auto_approve = false;
        }

        (can_auto_approve, max_risk_override, triggered)
    }

    /// Returns the maximum triggered `escalationLevel`, or `None`.
    pub fn evaluate_escalation_rules(
        &self,
        rules: &RiskRulesConfig,
        ctx: &RuleContext<'_>,
    ) -> (Option<u8>, Vec<RuleEvaluationResult>) {
        let mut triggered = Vec::new();
        let mut max_level = None;
        for rule in rules.escalation_rules.iter().filter(|r| r.enabled) {
            if Self::evaluate_condition(&rule.condition, ctx) {
                triggered.push(RuleEvaluationResult {
                    rule_id: rule.rule_id.clone(),
                    condition_result: true,
                    risk_factor: 0.0,
                    action: Action::Escalate,
                    message: rule.message.clone(),
                });
                max_level = Some(max_level.unwrap_or(0).max(rule.escalation_level));
            }
        }
        (max_level, triggered)
    }

    /// The end-of-run decision (spec §4.7): re-runs global, evaluates every
    /// step's step rules, then exceptions and escalations, and resolves the
    /// final routing decision by the fixed precedence chain.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_workflow(
        &self,
        rules: &RiskRulesConfig,
        input: &Value,
        step_names: &HashMap<u32, String>,
        step_outputs: &[(u32, String, Value)],
        context: &Value,
        base_risk_score: f64,
        assessment: Option<&Assessment>,
    ) -> WorkflowEvaluationResult {
        let mut ctx = RuleContext::new(input, context).with_steps(step_outputs);
        if let Some(a) = assessment {
            ctx = ctx.with_assessment(a);
        }

        let global = self.evaluate_global(rules, &ctx);

        let mut step_results = Vec::new();
        let mut combined_risk = base_risk_score + global.aggregate_risk_factor;
        for (number, var, _) in step_outputs {
            let step_name = step_names.get(number).cloned().unwrap_or_else(|| var.clone());
            let result = self.evaluate_step_rules(rules, *number, &step_name, &ctx);
            combined_risk += result.aggregate_risk_factor;
            step_results.push(result);
        }
        combined_risk = combined_risk.min(1.0);

        let (can_auto_approve, max_risk_override, exceptions_triggered) =
            self.evaluate_exception_rules(rules, combined_risk, &ctx);
        let (escalation_level, escalations_triggered) = self.evaluate_escalation_rules(rules, &ctx);

        let highest_action = std::iter::once(&global)
            .chain(step_results.iter())
            .filter_map(|r| r.highest_action)
            .max_by_key(|a| a.priority());

        let any_escalation = !escalations_triggered.is_empty();

        let (final_routing_decision, requires_hitl) = resolve_routing_decision(
            highest_action,
            any_escalation,
            can_auto_approve,
        );

        let summary_message = summarize(
            highest_action,
            any_escalation,
            can_auto_approve,
            final_routing_decision,
            combined_risk,
        );

        WorkflowEvaluationResult {
            global,
            step_results,
            can_auto_approve,
            max_risk_override,
            exceptions_triggered,
            escalation_level,
            escalations_triggered,
            final_risk_score: combined_risk,
            final_routing_decision,
            requires_hitl,
            summary_message,
        }
    }
}

fn evaluate_global_rule(rule: &GlobalRule, ctx: &RuleContext<'_>) -> Option<RuleEvaluationResult> {
    if RiskEngine::evaluate_condition(&rule.condition, ctx) {
        Some(RuleEvaluationResult {
            rule_id: rule.rule_id.clone(),
            condition_result: true,
            risk_factor: rule.risk_factor,
            action: rule.action_if_triggered,
            message: rule.message.clone(),
        })
    } else {
        None
    }
}

fn evaluate_step_rule(rule: &StepRule, ctx: &RuleContext<'_>) -> Option<RuleEvaluationResult> {
    if RiskEngine::evaluate_condition(&rule.condition, ctx) {
        Some(RuleEvaluationResult {
            rule_id: rule.rule_id.clone(),
            condition_result: true,
            risk_factor: rule.risk_factor,
            action: rule.action_if_triggered,
            message: rule.message.clone(),
        })
    } else {
        None
    }
}

/// The fixed precedence chain from spec §4.7-6.
fn resolve_routing_decision(
    highest_action: Option<Action>,
    any_escalation: bool,
    can_auto_approve: bool,
) -> (crate::risk::model::RoutingDecision, bool) {
    use crate::risk::model::RoutingDecision as D;

    if highest_action == Some(Action::Block) {
        return (D::Block, true);
    }
    if any_escalation {
        return (D::Escalate, true);
    }
    if matches!(highest_action, Some(Action::RequireHitl) | Some(Action::Escalate)) {
        return (D::Pause, true);
    }
    if highest_action == Some(Action::Pause) {
        return (D::Pause, true);
    }
    if highest_action == Some(Action::RequireReview) {
        return if can_auto_approve { (D::Approve, false) } else { (D::Pause, true) };
    }
    if can_auto_approve {
        return (D::Approve, false);
    }
    (D::Continue, false)
}

fn summarize(
    highest_action: Option<Action>,
    any_escalation: bool,
    can_auto_approve: bool,
    decision: crate::risk::model::RoutingDecision,
    risk_score: f64,
) -> String {
    format!(
        "decision={:?} highestAction={:?} escalationTriggered={} autoApprovable={} riskScore={:.3}",
        decision, highest_action, any_escalation, can_auto_approve, risk_score
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::model::{Action, EscalationRule, ExceptionRule, GlobalRule, StepRule};
    use serde_json::json;

    fn global_rule(id: &str, condition: &str, risk_factor: f64, action: Action) -> GlobalRule {
        GlobalRule {
            rule_id: id.to_string(),
            condition: condition.to_string(),
            risk_factor,
            action_if_triggered: action,
            message: "triggered".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn global_rule_triggers_and_aggregates() {
        let engine = RiskEngine::new();
        let rules = RiskRulesConfig {
            global_rules: vec![global_rule("g1", "$input.amount > 1000", 0.5, Action::RequireReview)],
            ..Default::default()
        };
        let input = json!({"amount": 5000});
        let ctx = RuleContext::new(&input, &json!({}));
        let result = engine.evaluate_global(&rules, &ctx);
        assert_eq!(result.triggered.len(), 1);
        assert_eq!(result.aggregate_risk_factor, 0.5);
        assert_eq!(result.highest_action, Some(Action::RequireReview));
    }

    #[test]
    fn block_always_wins_precedence() {
        let (decision, hitl) = resolve_routing_decision(Some(Action::Block), true, true);
        assert_eq!(decision, crate::risk::model::RoutingDecision::Block);
        assert!(hitl);
    }

    #[test]
    fn require_review_auto_approves_when_allowed() {
        let (decision, hitl) = resolve_routing_decision(Some(Action::RequireReview), false, true);
        assert_eq!(decision, crate::risk::model::RoutingDecision::Approve);
        assert!(!hitl);
    }

    #[test]
    fn require_review_pauses_when_not_auto_approvable() {
        let (decision, hitl) = resolve_routing_decision(Some(Action::RequireReview), false, false);
        assert_eq!(decision, crate::risk::model::RoutingDecision::Pause);
        assert!(hitl);
    }

    #[test]
    fn no_triggered_rules_continues() {
        let (decision, hitl) = resolve_routing_decision(None, false, false);
        assert_eq!(decision, crate::risk::model::RoutingDecision::Continue);
        assert!(!hitl);
    }

    #[test]
    fn exception_rule_clears_auto_approve_over_risk_ceiling() {
        let engine = RiskEngine::new();
        let rules = RiskRulesConfig {
            exception_rules: vec![ExceptionRule {
                rule_id: "e1".to_string(),
                condition: "$input.trusted == true".to_string(),
                auto_approve_override: true,
                max_risk_override: 0.3,
                message: "trusted source".to_string(),
                enabled: true,
            }],
            ..Default::default()
        };
        let input = json!({"trusted": true});
        let ctx = RuleContext::new(&input, &json!({}));
        let (can_auto_approve, max_override, triggered) =
            engine.evaluate_exception_rules(&rules, 0.5, &ctx);
        assert_eq!(triggered.len(), 1);
        assert_eq!(max_override, 0.3);
        assert!(!can_auto_approve); // 0.5 > 0.3 clears it

        let (can_auto_approve_low, _, _) = engine.evaluate_exception_rules(&rules, 0.1, &ctx);
        assert!(can_auto_approve_low);
    }

    #[test]
    fn escalation_rules_report_max_level() {
        let engine = RiskEngine::new();
        let rules = RiskRulesConfig {
            escalation_rules: vec![
                EscalationRule {
                    rule_id: "e1".to_string(),
                    condition: "$input.severity == 'high'".to_string(),
                    escalation_level: 3,
                    message: "high severity".to_string(),
                    enabled: true,
                },
                EscalationRule {
                    rule_id: "e2".to_string(),
                    condition: "$input.severity == 'high'".to_string(),
                    escalation_level: 5,
                    message: "critical".to_string(),
                    enabled: true,
                },
            ],
            ..Default::default()
        };
        let input = json!({"severity": "high"});
        let ctx = RuleContext::new(&input, &json!({}));
        let (level, triggered) = engine.evaluate_escalation_rules(&rules, &ctx);
        assert_eq!(level, Some(5));
        assert_eq!(triggered.len(), 2);
    }

    #[test]
    fn rule_condition_error_never_propagates() {
        // References a namespace that doesn't resolve; must count as
        // not-triggered rather than erroring the evaluation.
        assert!(!RiskEngine::evaluate_condition(
            "$input.missing == 1",
            &RuleContext::new(&json!({}), &json!({}))
        ));
    }

    #[test]
    fn assessment_namespace_resolves() {
        let assessment = Assessment {
            safety_risk: 0.9,
            technical_risk: 0.1,
            compliance_risk: 0.1,
            financial_risk: 0.1,
            execution_risk: 0.1,
            anomaly_risk: 0.1,
        };
        let input = json!({});
        let ctx = RuleContext::new(&input, &json!({})).with_assessment(&assessment);
        assert!(RiskEngine::evaluate_condition("$assessment.safety_risk > 0.8", &ctx));
    }

    #[test]
    fn steps_namespace_resolves_by_output_variable() {
        let step_outputs = vec![(1u32, "cost_estimate".to_string(), json!({"total": 42000}))];
        let input = json!({});
        let ctx = RuleContext::new(&input, &json!({})).with_steps(&step_outputs);
        assert!(RiskEngine::evaluate_condition("$steps.cost_estimate.total > 40000", &ctx));
    }
}
