// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Risk Rule Parser & Engine (component G): configurable, condition-based
//! risk scoring and routing decisions layered on top of `condition.rs`.

pub mod engine;
pub mod model;

pub use engine::RiskEngine;
pub use model::{
    Action, Assessment, EscalationRule, ExceptionRule, GlobalRule, RiskRulesConfig,
    RoutingDecision, RuleEvaluationResult, StepEvaluationResult, StepRule,
    WorkflowEvaluationResult,
};
