// Interpreter for parsed rule conditions

use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::ast::{BoolOp, CompareOp, Expr};
use super::parser::{parse, ParseError};
use super::value::{EvalContext, Value};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("expected a boolean, found {0}")]
    NotBoolean(&'static str),
    #[error("condition does not parse: {0}")]
    Parse(#[from] ParseError),
    #[error("unknown rule '{0}'")]
    UnknownRule(String),
}

/// Evaluate a condition to a boolean. The expression must itself produce a boolean.
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<bool, EvalError> {
    match eval(expr, ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::NotBoolean(other.type_name())),
    }
}

fn eval(expr: &Expr, ctx: &EvalContext) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownField(name.clone())),
        Expr::Lookup { field, key, default } => {
            let container = ctx
                .get(field)
                .ok_or_else(|| EvalError::UnknownField(field.clone()))?;
            let key = eval(key, ctx)?;
            match (container, &key) {
                (Value::Map(entries), Value::Str(k)) => match entries.get(k) {
                    Some(found) => Ok(found.clone()),
                    None => eval(default, ctx),
                },
                (container, key) => Err(EvalError::TypeMismatch {
                    op: "get".to_string(),
                    lhs: container.type_name(),
                    rhs: key.type_name(),
                }),
            }
        }
        Expr::Not(inner) => Ok(Value::Bool(!evaluate(inner, ctx)?)),
        Expr::Bool { op, operands } => {
            // `and` stops at the first false, `or` at the first true
            let stop_at = matches!(op, BoolOp::Or);
            for operand in operands {
                if evaluate(operand, ctx)? == stop_at {
                    return Ok(Value::Bool(stop_at));
                }
            }
            Ok(Value::Bool(!stop_at))
        }
        Expr::Compare { op, lhs, rhs } => {
            let lhs = eval(lhs, ctx)?;
            let rhs = eval(rhs, ctx)?;
            compare(*op, &lhs, &rhs).map(Value::Bool)
        }
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        op: op.symbol().to_string(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    };

    match op {
        CompareOp::Eq => Ok(lhs == rhs),
        CompareOp::Ne => Ok(lhs != rhs),
        CompareOp::In => contains(rhs, lhs).ok_or_else(mismatch),
        CompareOp::NotIn => contains(rhs, lhs).map(|found| !found).ok_or_else(mismatch),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => return Err(mismatch()),
            };
            // NaN compares false against everything
            let Some(ordering) = ordering else {
                return Ok(false);
            };
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Membership of `needle` in `haystack`; `None` when the pair is not comparable
fn contains(haystack: &Value, needle: &Value) -> Option<bool> {
    match (haystack, needle) {
        (Value::Map(entries), Value::Str(key)) => Some(entries.contains_key(key)),
        (Value::List(items), needle) => Some(items.contains(needle)),
        (Value::Str(text), Value::Str(part)) => Some(text.contains(part.as_str())),
        _ => None,
    }
}

/// Result of evaluating one named rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub satisfied: bool,
    /// Why the rule could not be evaluated, if it could not
    pub error: Option<EvalError>,
}

/// Rules compiled once from the catalog and evaluated by id.
///
/// A rule whose condition fails to parse stays registered and always evaluates to
/// "not satisfied" with the parse error attached.
#[derive(Debug, Default)]
pub struct RuleEvaluator {
    compiled: BTreeMap<String, Result<Expr, ParseError>>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a set of `(rule_id, condition)` pairs
    pub fn compile<'a, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut evaluator = Self::new();
        for (rule_id, condition) in rules {
            evaluator.insert(rule_id, condition);
        }
        evaluator
    }

    pub fn insert(&mut self, rule_id: &str, condition: &str) {
        let compiled = parse(condition);
        if let Err(e) = &compiled {
            warn!(rule_id = %rule_id, condition = %condition, error = %e, "Rule condition does not parse");
        }
        self.compiled.insert(rule_id.to_string(), compiled);
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Rule ids whose conditions failed to parse
    pub fn invalid_rules(&self) -> Vec<(&str, &ParseError)> {
        self.compiled
            .iter()
            .filter_map(|(id, compiled)| compiled.as_ref().err().map(|e| (id.as_str(), e)))
            .collect()
    }

    /// Evaluate one rule. Any failure reads as "not satisfied".
    pub fn evaluate(&self, rule_id: &str, ctx: &EvalContext) -> RuleOutcome {
        let result = match self.compiled.get(rule_id) {
            None => Err(EvalError::UnknownRule(rule_id.to_string())),
            Some(Err(parse_error)) => Err(EvalError::Parse(parse_error.clone())),
            Some(Ok(expr)) => evaluate(expr, ctx),
        };

        match result {
            Ok(satisfied) => {
                debug!(rule_id = %rule_id, satisfied, "Rule evaluated");
                RuleOutcome {
                    rule_id: rule_id.to_string(),
                    satisfied,
                    error: None,
                }
            }
            Err(error) => {
                debug!(rule_id = %rule_id, error = %error, "Rule evaluation failed");
                RuleOutcome {
                    rule_id: rule_id.to_string(),
                    satisfied: false,
                    error: Some(error),
                }
            }
        }
    }

    /// Evaluate rules in order; every rule is evaluated even after a failure
    pub fn evaluate_all<'a, I>(&self, rule_ids: I, ctx: &EvalContext) -> Vec<RuleOutcome>
    where
        I: IntoIterator<Item = &'a str>,
    {
        rule_ids.into_iter().map(|id| self.evaluate(id, ctx)).collect()
    }
}
