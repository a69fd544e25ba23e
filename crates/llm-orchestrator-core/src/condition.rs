// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Condition Evaluator (component A): parses and evaluates boolean
//! expressions over an execution context. Grammar (spec §4.1):
//!
//! ```text
//! expression := or_expr
//! or_expr     := and_expr ("OR" and_expr)*
//! and_expr    := not_expr ("AND" not_expr)*
//! not_expr    := "NOT"? comparison
//! comparison  := value OP value
//! OP          := "==" | "!=" | "<" | ">" | "<=" | ">=" | "IN" | "NOT IN"
//! value       := variable | number | string | bool | list
//! variable    := "$" name ( "." name )*
//! ```
//!
//! Reused by the risk rule engine (`risk::engine`), which extends the
//! variable namespaces resolvable here with `$assessment.*` and
//! `$steps.<var>.<path>`.

use crate::error::{OrchestratorError, Result};
use serde_json::Value;

/// Supplies variable values by dotted path. `path[0]` names the namespace
/// (`input`, `context`, `stepN`, and — for risk-rule evaluation —
/// `assessment`, `steps`); the remaining segments walk nested objects.
pub trait ConditionContext {
    fn resolve(&self, path: &[String]) -> Result<Value>;
}

#[derive(Debug, Clone, PartialEq)]
enum CompOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
enum ValueExpr {
    Number(f64),
    Str(String),
    Bool(bool),
    List(Vec<ValueExpr>),
    Variable(Vec<String>),
}

#[derive(Debug, Clone)]
enum Expr {
    True,
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare(ValueExpr, CompOp, ValueExpr),
}

/// A parsed, reusable condition expression.
#[derive(Debug, Clone)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    /// Parses a condition string. Whitespace around the two-token `NOT IN`
    /// operator is canonicalized to a single space (spec §9 open question).
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self { expr: Expr::True });
        }
        let tokens = lex(trimmed)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        parser.expect_eof()?;
        Ok(Self { expr })
    }

    /// Evaluates the condition against a context. Pure and side-effect
    /// free: the same `(expr, context)` always yields the same result.
    pub fn evaluate(&self, ctx: &dyn ConditionContext) -> Result<bool> {
        eval_expr(&self.expr, ctx)
    }
}

/// Convenience one-shot parse + evaluate.
pub fn evaluate(source: &str, ctx: &dyn ConditionContext) -> Result<bool> {
    Condition::parse(source)?.evaluate(ctx)
}

fn eval_expr(expr: &Expr, ctx: &dyn ConditionContext) -> Result<bool> {
    match expr {
        Expr::True => Ok(true),
        Expr::Not(inner) => Ok(!eval_expr(inner, ctx)?),
        Expr::And(l, r) => Ok(eval_expr(l, ctx)? && eval_expr(r, ctx)?),
        Expr::Or(l, r) => Ok(eval_expr(l, ctx)? || eval_expr(r, ctx)?),
        Expr::Compare(lhs, op, rhs) => {
            let lv = eval_value(lhs, ctx)?;
            let rv = eval_value(rhs, ctx)?;
            eval_comparison(&lv, op, &rv)
        }
    }
}

fn eval_value(v: &ValueExpr, ctx: &dyn ConditionContext) -> Result<Value> {
    match v {
        ValueExpr::Number(n) => Ok(serde_json::json!(n)),
        ValueExpr::Str(s) => Ok(Value::String(s.clone())),
        ValueExpr::Bool(b) => Ok(Value::Bool(*b)),
        ValueExpr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_value(item, ctx)?);
            }
            Ok(Value::Array(out))
        }
        ValueExpr::Variable(path) => ctx.resolve(path),
    }
}

fn eval_comparison(lhs: &Value, op: &CompOp, rhs: &Value) -> Result<bool> {
    match op {
        CompOp::Eq => Ok(values_equal(lhs, rhs)),
        CompOp::Ne => Ok(!values_equal(lhs, rhs)),
        CompOp::Lt | CompOp::Gt | CompOp::Le | CompOp::Ge => {
            let l = as_number(lhs)?;
            let r = as_number(rhs)?;
            Ok(match op {
                CompOp::Lt => l < r,
                CompOp::Gt => l > r,
                CompOp::Le => l <= r,
                CompOp::Ge => l >= r,
                _ => unreachable!(),
            })
        }
        CompOp::In | CompOp::NotIn => {
            let Value::Array(items) = rhs else {
                return Err(OrchestratorError::TypeMismatch(
                    "right-hand side of IN/NOT IN must be a list".to_string(),
                ));
            };
            let contains = items.iter().any(|item| values_equal(item, lhs));
            Ok(if *op == CompOp::In { contains } else { !contains })
        }
    }
}

fn as_number(v: &Value) -> Result<f64> {
    v.as_f64().ok_or_else(|| {
        OrchestratorError::TypeMismatch(format!("expected a number, got {}", v))
    })
}

/// Structural equality with numbers normalized to `f64` first, so `3`
/// (parsed as an integer from JSON input/step data) and `3.0` (every
/// numeric literal in a condition source, see `eval_value`) compare
/// equal. Spec §4.1 treats int/real as one `number` type; cross-type
/// (e.g. number vs. string) is always not-equal.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(_), Value::Number(_)) => lhs.as_f64() == rhs.as_f64(),
        _ => lhs == rhs,
    }
}

// ---------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dollar,
    Dot,
    Comma,
    LBracket,
    RBracket,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Ident(String),
    Number(f64),
    Str(String),
}

fn lex(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '$' => {
                tokens.push(Token::Dollar);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(OrchestratorError::ParseError(
                        "unterminated string literal".to_string(),
                    ));
                }
                i += 1; // closing quote
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let mut s = String::new();
                s.push(c);
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    s.push(chars[i]);
                    i += 1;
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| OrchestratorError::ParseError(format!("invalid number: {}", s)))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    s.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Ident(s));
            }
            other => {
                return Err(OrchestratorError::ParseError(format!(
                    "unexpected character: {}",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_eof(&self) -> Result<()> {
        if self.pos != self.tokens.len() {
            return Err(OrchestratorError::ParseError(format!(
                "unexpected trailing tokens at position {}",
                self.pos
            )));
        }
        Ok(())
    }

    fn peek_ident_ci(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(word))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_ident_ci("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek_ident_ci("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek_ident_ci("not") && !self.peek_is_not_in() {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    /// Disambiguates a leading `NOT` (unary) from the `NOT IN` operator,
    /// which is only valid mid-comparison and is consumed there instead.
    fn peek_is_not_in(&self) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Ident(s)) if s.eq_ignore_ascii_case("not"))
            && matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(s)) if s.eq_ignore_ascii_case("in"))
            && self.pos > 0
            && !self.is_comparison_start_here()
    }

    /// `NOT` starts a unary-not expression unless we're immediately after a
    /// value (i.e. parsing a comparison operator), in which case `NOT IN`
    /// is an operator consumed by `parse_comparison`. Since `parse_not` is
    /// only ever invoked where a fresh sub-expression begins, a leading
    /// `NOT IN` here is always the unary case; `parse_comparison` handles
    /// the operator case directly by looking ahead after the left value.
    fn is_comparison_start_here(&self) -> bool {
        false
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_value()?;
        let op = self.parse_comp_op()?;
        let rhs = self.parse_value()?;
        Ok(Expr::Compare(lhs, op, rhs))
    }

    fn parse_comp_op(&mut self) -> Result<CompOp> {
        match self.advance() {
            Some(Token::Eq) => Ok(CompOp::Eq),
            Some(Token::Ne) => Ok(CompOp::Ne),
            Some(Token::Lt) => Ok(CompOp::Lt),
            Some(Token::Gt) => Ok(CompOp::Gt),
            Some(Token::Le) => Ok(CompOp::Le),
            Some(Token::Ge) => Ok(CompOp::Ge),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("in") => Ok(CompOp::In),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("not") => {
                match self.advance() {
                    Some(Token::Ident(s2)) if s2.eq_ignore_ascii_case("in") => Ok(CompOp::NotIn),
                    other => Err(OrchestratorError::ParseError(format!(
                        "expected IN after NOT, got {:?}",
                        other
                    ))),
                }
            }
            other => Err(OrchestratorError::UnsupportedOperator(format!("{:?}", other))),
        }
    }

    fn parse_value(&mut self) -> Result<ValueExpr> {
        match self.peek().cloned() {
            Some(Token::Dollar) => {
                self.advance();
                self.parse_variable()
            }
            Some(Token::Number(n)) => {
                self.advance();
                Ok(ValueExpr::Number(n))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(ValueExpr::Str(s))
            }
            Some(Token::LBracket) => self.parse_list(),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("true") => {
                self.advance();
                Ok(ValueExpr::Bool(true))
            }
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("false") => {
                self.advance();
                Ok(ValueExpr::Bool(false))
            }
            other => Err(OrchestratorError::ParseError(format!(
                "expected a value, got {:?}",
                other
            ))),
        }
    }

    fn parse_variable(&mut self) -> Result<ValueExpr> {
        let mut segments = Vec::new();
        match self.advance() {
            Some(Token::Ident(name)) => segments.push(name),
            other => {
                return Err(OrchestratorError::ParseError(format!(
                    "expected variable name after '$', got {:?}",
                    other
                )))
            }
        }
        while matches!(self.peek(), Some(Token::Dot)) {
            self.advance();
            match self.advance() {
                Some(Token::Ident(name)) => segments.push(name),
                other => {
                    return Err(OrchestratorError::ParseError(format!(
                        "expected path segment after '.', got {:?}",
                        other
                    )))
                }
            }
        }
        Ok(ValueExpr::Variable(segments))
    }

    fn parse_list(&mut self) -> Result<ValueExpr> {
        self.advance(); // consume '['
        let mut items = Vec::new();
        if matches!(self.peek(), Some(Token::RBracket)) {
            self.advance();
            return Ok(ValueExpr::List(items));
        }
        loop {
            items.push(self.parse_value()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                other => {
                    return Err(OrchestratorError::ParseError(format!(
                        "expected ',' or ']' in list, got {:?}",
                        other
                    )))
                }
            }
        }
        Ok(ValueExpr::List(items))
    }
}

/// Resolves `$input.*`/`$context.*`/`$stepN.*` against a plain JSON
/// document map, as used by `ExecutionContext`.
pub struct MapResolver<'a> {
    pub input: &'a Value,
    pub context: &'a Value,
    pub steps: &'a Value,
}

impl<'a> ConditionContext for MapResolver<'a> {
    fn resolve(&self, path: &[String]) -> Result<Value> {
        let Some(head) = path.first() else {
            return Err(OrchestratorError::UnresolvedVariable("empty variable".to_string()));
        };
        let (root, rest): (&Value, &[String]) = if head == "input" {
            (self.input, &path[1..])
        } else if head == "context" {
            (self.context, &path[1..])
        } else if head.starts_with("step") && head[4..].chars().all(|c| c.is_ascii_digit()) && head.len() > 4 {
            (self.steps, &path[1..])
        } else {
            return Err(OrchestratorError::UnresolvedVariable(format!(
                "unknown variable namespace: {}",
                head
            )));
        };
        walk(root, rest)
    }
}

pub fn walk(root: &Value, path: &[String]) -> Result<Value> {
    let mut cur = root;
    for segment in path {
        cur = cur.get(segment).ok_or_else(|| {
            OrchestratorError::UnresolvedVariable(format!("missing key: {}", segment))
        })?;
    }
    Ok(cur.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(input: &Value, context: &Value, steps: &Value) -> MapResolver<'_> {
        MapResolver { input, context, steps }
    }

    #[test]
    fn empty_expression_is_true() {
        assert!(evaluate("", &ctx(&json!({}), &json!({}), &json!({}))).unwrap());
    }

    #[test]
    fn simple_numeric_comparison() {
        let input = json!({"load": 1500});
        assert!(evaluate("$input.load > 1000", &ctx(&input, &json!({}), &json!({}))).unwrap());
        assert!(!evaluate("$input.load < 1000", &ctx(&input, &json!({}), &json!({}))).unwrap());
    }

    #[test]
    fn and_or_not_precedence() {
        // NOT binds tighter than AND, which binds tighter than OR.
        let input = json!({"a": true, "b": false, "c": true});
        let ctx = ctx(&input, &json!({}), &json!({}));
        assert!(evaluate("$input.a == true AND NOT $input.b == true OR $input.c == false", &ctx).unwrap());
    }

    #[test]
    fn in_and_not_in() {
        let input = json!({"x": 2});
        let c = ctx(&input, &json!({}), &json!({}));
        assert!(evaluate("$input.x IN [1, 2, 3]", &c).unwrap());
        assert!(evaluate("$input.x NOT IN [5, 6]", &c).unwrap());
        assert!(!evaluate("$input.x IN []", &c).unwrap());
        assert!(evaluate("$input.x NOT IN []", &c).unwrap());
    }

    #[test]
    fn unresolved_variable_errors() {
        let input = json!({});
        let c = ctx(&input, &json!({}), &json!({}));
        assert!(evaluate("$input.missing == 1", &c).is_err());
    }

    #[test]
    fn integer_and_float_equality_across_representations() {
        // `count` comes from JSON input as an integer; every numeric
        // literal in a condition is parsed as a float (`eval_value`).
        // Per spec §4.1, int/real are one `number` type, so `3 == 3`
        // must hold even though the two sides started as different
        // `serde_json::Number` variants.
        let input = json!({"count": 3});
        let c = ctx(&input, &json!({}), &json!({}));
        assert!(evaluate("$input.count == 3", &c).unwrap());
        assert!(!evaluate("$input.count != 3", &c).unwrap());
        assert!(!evaluate("$input.count == 4", &c).unwrap());
    }

    #[test]
    fn cross_type_equality_is_always_not_equal() {
        let input = json!({"x": "1"});
        let c = ctx(&input, &json!({}), &json!({}));
        assert!(!evaluate("$input.x == 1", &c).unwrap());
        assert!(evaluate("$input.x != 1", &c).unwrap());
    }

    #[test]
    fn step_namespace_resolution() {
        let steps = json!({"risk_assessment": {"level": "high"}});
        let c = ctx(&json!({}), &json!({}), &steps);
        assert!(evaluate("$step1.risk_assessment.level == 'high'", &c).unwrap());
    }
}
