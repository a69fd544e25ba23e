// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validation Engine (component B): a hand-rolled JSON-Schema draft-7
//! subset plus three custom rule kinds.
//!
//! Grounded on the validation engine in the source this spec was
//! distilled from (`ValidationEngine._validate`/`_format_error_message`
//! and the custom-rule dispatch). The schema subset covers `type`,
//! `required`, `properties`, `minimum`/`maximum`/`multipleOf`,
//! `minLength`/`maxLength`/`pattern`, `enum`, `minItems`/`maxItems`/
//! `uniqueItems`, and `additionalProperties` — the constraints the
//! original engine's docstring enumerates.

use crate::condition::{Condition, ConditionContext};
use crate::error::Result;
use regex::Regex;
use serde_json::Value;

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single validation finding.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { valid: true, issues: Vec::new() }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }
}

/// Validates `data` against `schema`. `strict=true` (input validation)
/// treats every issue as an error; `strict=false` (output validation)
/// downgrades `additionalProperties`/`minProperties` issues to warnings.
pub fn validate(data: &Value, schema: &Value, strict: bool) -> ValidationResult {
    let mut issues = Vec::new();
    check_node(data, schema, "", strict, &mut issues);
    let valid = !issues.iter().any(|i| i.severity == Severity::Error);
    ValidationResult { valid, issues }
}

fn path_join(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", base, segment)
    }
}

fn severity_for(validator: &str, strict: bool) -> Severity {
    if !strict && matches!(validator, "additionalProperties" | "minProperties") {
        Severity::Warning
    } else {
        Severity::Error
    }
}

fn push(issues: &mut Vec<ValidationIssue>, validator: &str, path: &str, strict: bool, message: String) {
    issues.push(ValidationIssue {
        severity: severity_for(validator, strict),
        path: path.to_string(),
        message,
    });
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "integer" => matches!(value, Value::Number(n) if n.is_i64() || n.is_u64()),
        "number" => value.is_number(),
        other => json_type_name(value) == other,
    }
}

fn check_node(data: &Value, schema: &Value, path: &str, strict: bool, issues: &mut Vec<ValidationIssue>) {
    let Some(schema) = schema.as_object() else { return };

    if let Some(type_decl) = schema.get("type") {
        let ok = match type_decl {
            Value::String(t) => matches_type(data, t),
            Value::Array(types) => types.iter().any(|t| t.as_str().is_some_and(|t| matches_type(data, t))),
            _ => true,
        };
        if !ok {
            push(
                issues,
                "type",
                path,
                strict,
                format!(
                    "{}: expected type '{}', got '{}'",
                    display_path(path),
                    type_decl,
                    json_type_name(data)
                ),
            );
            return;
        }
    }

    if let Some(enum_values) = schema.get("enum").and_then(|v| v.as_array()) {
        if !enum_values.contains(data) {
            push(
                issues,
                "enum",
                path,
                strict,
                format!(
                    "{}: value {} is not one of allowed values {:?}",
                    display_path(path),
                    data,
                    enum_values
                ),
            );
        }
    }

    if let Value::Number(_) = data {
        let n = data.as_f64().unwrap_or(0.0);
        if let Some(min) = schema.get("minimum").and_then(|v| v.as_f64()) {
            if n < min {
                push(issues, "minimum", path, strict, format!("{}: value {} is less than minimum {}", display_path(path), n, min));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(|v| v.as_f64()) {
            if n > max {
                push(issues, "maximum", path, strict, format!("{}: value {} exceeds maximum {}", display_path(path), n, max));
            }
        }
        if let Some(multiple) = schema.get("multipleOf").and_then(|v| v.as_f64()) {
            if multiple > 0.0 && (n / multiple).fract().abs() > 1e-9 {
                push(issues, "multipleOf", path, strict, format!("{}: value {} is not a multiple of {}", display_path(path), n, multiple));
            }
        }
    }

    if let Value::String(s) = data {
        if let Some(min_len) = schema.get("minLength").and_then(|v| v.as_u64()) {
            if (s.chars().count() as u64) < min_len {
                push(issues, "minLength", path, strict, format!("{}: string length {} is less than minimum {}", display_path(path), s.chars().count(), min_len));
            }
        }
        if let Some(max_len) = schema.get("maxLength").and_then(|v| v.as_u64()) {
            if (s.chars().count() as u64) > max_len {
                push(issues, "maxLength", path, strict, format!("{}: string length {} exceeds maximum {}", display_path(path), s.chars().count(), max_len));
            }
        }
        if let Some(pattern) = schema.get("pattern").and_then(|v| v.as_str()) {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    push(issues, "pattern", path, strict, format!("{}: value '{}' does not match pattern '{}'", display_path(path), s, pattern));
                }
                Err(e) => {
                    push(issues, "pattern", path, strict, format!("{}: invalid pattern '{}': {}", display_path(path), pattern, e));
                }
                _ => {}
            }
        }
    }

    if let Value::Array(items) = data {
        if let Some(min_items) = schema.get("minItems").and_then(|v| v.as_u64()) {
            if (items.len() as u64) < min_items {
                push(issues, "minItems", path, strict, format!("{}: array has {} items, minimum is {}", display_path(path), items.len(), min_items));
            }
        }
        if let Some(max_items) = schema.get("maxItems").and_then(|v| v.as_u64()) {
            if (items.len() as u64) > max_items {
                push(issues, "maxItems", path, strict, format!("{}: array has {} items, maximum is {}", display_path(path), items.len(), max_items));
            }
        }
        if schema.get("uniqueItems").and_then(|v| v.as_bool()) == Some(true) {
            let mut seen: Vec<&Value> = Vec::new();
            for item in items {
                if seen.contains(&item) {
                    push(issues, "uniqueItems", path, strict, format!("{}: array contains duplicate items", display_path(path)));
                    break;
                }
                seen.push(item);
            }
        }
        if let Some(item_schema) = schema.get("items") {
            for (idx, item) in items.iter().enumerate() {
                check_node(item, item_schema, &path_join(path, &idx.to_string()), strict, issues);
            }
        }
    }

    if let Value::Object(map) = data {
        if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
            for field in required {
                if let Some(name) = field.as_str() {
                    if !map.contains_key(name) {
                        push(issues, "required", path, strict, format!("{}: field '{}' is required", display_path(path), name));
                    }
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
            for (name, sub_schema) in properties {
                if let Some(value) = map.get(name) {
                    check_node(value, sub_schema, &path_join(path, name), strict, issues);
                }
            }
        }
        if schema.get("additionalProperties").and_then(|v| v.as_bool()) == Some(false) {
            let known: Vec<&String> = schema
                .get("properties")
                .and_then(|v| v.as_object())
                .map(|p| p.keys().collect())
                .unwrap_or_default();
            for name in map.keys() {
                if !known.contains(&name) {
                    push(issues, "additionalProperties", path, strict, format!("{}: additional property '{}' is not allowed", display_path(path), name));
                }
            }
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

/// One custom validation rule (spec §4.2/§9 decision 4 for `expression`).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CustomRule {
    RangeCheck {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
        message: Option<String>,
    },
    Dependency {
        field: String,
        depends_on: String,
        message: Option<String>,
    },
    Expression {
        expression: String,
        message: Option<String>,
    },
}

struct DataOnlyContext<'a>(&'a Value);

impl<'a> ConditionContext for DataOnlyContext<'a> {
    fn resolve(&self, path: &[String]) -> Result<Value> {
        // Custom rule expressions address fields directly, e.g. `$field_a`,
        // rather than through the `$input`/`$context`/`$stepN` namespaces.
        crate::condition::walk(self.0, path)
    }
}

/// Evaluates a batch of custom rules (range/dependency/expression) against
/// a flat data object. Unlike JSON-Schema validation, a field simply
/// absent from `data` is not itself an error here — only explicit rule
/// violations are reported.
pub fn validate_custom_rules(data: &Value, rules: &[CustomRule]) -> ValidationResult {
    let mut issues = Vec::new();
    for rule in rules {
        match rule {
            CustomRule::RangeCheck { field, min, max, message } => {
                if let Some(value) = data.get(field).and_then(|v| v.as_f64()) {
                    let default_message = format!("{} out of range", field);
                    let message = message.as_deref().unwrap_or(&default_message);
                    if let Some(min) = min {
                        if value < *min {
                            issues.push(ValidationIssue { severity: Severity::Error, path: field.clone(), message: message.to_string() });
                            continue;
                        }
                    }
                    if let Some(max) = max {
                        if value > *max {
                            issues.push(ValidationIssue { severity: Severity::Error, path: field.clone(), message: message.to_string() });
                        }
                    }
                }
            }
            CustomRule::Dependency { field, depends_on, message } => {
                let has_field = data.get(field).is_some();
                let has_dependency = data.get(depends_on).is_some();
                if has_field && !has_dependency {
                    let default_message = format!("{} requires {}", field, depends_on);
                    issues.push(ValidationIssue {
                        severity: Severity::Error,
                        path: field.clone(),
                        message: message.clone().unwrap_or(default_message),
                    });
                }
            }
            CustomRule::Expression { expression, message } => {
                let ctx = DataOnlyContext(data);
                match Condition::parse(expression).and_then(|c| c.evaluate(&ctx)) {
                    Ok(true) => {}
                    Ok(false) => {
                        let default_message = format!("expression failed: {}", expression);
                        issues.push(ValidationIssue {
                            severity: Severity::Error,
                            path: "expression".to_string(),
                            message: message.clone().unwrap_or(default_message),
                        });
                    }
                    Err(e) => {
                        issues.push(ValidationIssue {
                            severity: Severity::Warning,
                            path: "expression".to_string(),
                            message: format!("could not evaluate expression '{}': {}", expression, e),
                        });
                    }
                }
            }
        }
    }
    let valid = !issues.iter().any(|i| i.severity == Severity::Error);
    ValidationResult { valid, issues }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_mismatch_reports_error() {
        let schema = json!({"type": "number"});
        let result = validate(&json!("not a number"), &schema, true);
        assert!(!result.valid);
    }

    #[test]
    fn required_field_missing() {
        let schema = json!({
            "type": "object",
            "required": ["amount"],
            "properties": {"amount": {"type": "number"}}
        });
        let result = validate(&json!({}), &schema, true);
        assert!(!result.valid);
        assert!(result.issues[0].message.contains("amount"));
    }

    #[test]
    fn numeric_range_constraints() {
        let schema = json!({"type": "number", "minimum": 0, "maximum": 100});
        assert!(validate(&json!(50), &schema, true).valid);
        assert!(!validate(&json!(-1), &schema, true).valid);
        assert!(!validate(&json!(101), &schema, true).valid);
    }

    #[test]
    fn enum_constraint() {
        let schema = json!({"enum": ["M20", "M25", "M30"]});
        assert!(validate(&json!("M25"), &schema, true).valid);
        assert!(!validate(&json!("M40"), &schema, true).valid);
    }

    #[test]
    fn lax_mode_downgrades_additional_properties_to_warning() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "number"}},
            "additionalProperties": false
        });
        let lax = validate(&json!({"a": 1, "b": 2}), &schema, false);
        assert!(lax.valid); // only a warning, not an error
        let strict = validate(&json!({"a": 1, "b": 2}), &schema, true);
        assert!(!strict.valid);
    }

    #[test]
    fn range_check_custom_rule() {
        let rules = vec![CustomRule::RangeCheck {
            field: "axial_load_dead".to_string(),
            min: Some(0.0),
            max: Some(10000.0),
            message: None,
        }];
        let result = validate_custom_rules(&json!({"axial_load_dead": 20000}), &rules);
        assert!(!result.valid);
    }

    #[test]
    fn dependency_custom_rule() {
        let rules = vec![CustomRule::Dependency {
            field: "steel_grade".to_string(),
            depends_on: "concrete_grade".to_string(),
            message: None,
        }];
        let result = validate_custom_rules(&json!({"steel_grade": "Fe500"}), &rules);
        assert!(!result.valid);
        let ok = validate_custom_rules(&json!({"steel_grade": "Fe500", "concrete_grade": "M25"}), &rules);
        assert!(ok.valid);
    }

    #[test]
    fn expression_custom_rule_real_implementation() {
        let rules = vec![CustomRule::Expression {
            expression: "$field_a > $field_b".to_string(),
            message: None,
        }];
        let ok = validate_custom_rules(&json!({"field_a": 10, "field_b": 5}), &rules);
        assert!(ok.valid);
        let bad = validate_custom_rules(&json!({"field_a": 1, "field_b": 5}), &rules);
        assert!(!bad.valid);
    }
}
