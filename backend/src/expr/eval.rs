//! Expression evaluation
//!
//! Evaluates a parsed [`Expr`] against a read-only [`Scope`]. Evaluation is
//! side-effect free: a scope is only ever borrowed immutably.

use super::ast::{BinaryOp, Expr, Function, LogicalOp, UnaryOp};
use super::parser::parse;
use super::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Epsilon for floating point equality comparison
const FLOAT_EPSILON: f64 = 1e-9;

// ============================================================================
// SCOPES
// ============================================================================

/// Named variable source for formula evaluation
pub trait Scope {
    /// Resolve a (possibly dotted) identifier to a number
    fn lookup(&self, name: &str) -> Option<f64>;
}

/// Scope value: a number or a nested object of further values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    Number(f64),
    Object(BTreeMap<String, ScopeValue>),
}

/// Resolve a dotted name inside one object level
///
/// Tries the full name as a flat key first, then every split point so that
/// `target.def.physical` resolves whether stored flat or nested.
fn lookup_in(values: &BTreeMap<String, ScopeValue>, name: &str) -> Option<f64> {
    if let Some(ScopeValue::Number(n)) = values.get(name) {
        return Some(*n);
    }
    for (idx, _) in name.match_indices('.') {
        let (head, tail) = (&name[..idx], &name[idx + 1..]);
        if let Some(ScopeValue::Object(inner)) = values.get(head) {
            if let Some(n) = lookup_in(inner, tail) {
                return Some(n);
            }
        }
    }
    None
}

/// Mapping scope of numbers and nested objects
///
/// A dotted name first matches a flat key (stat paths such as `hp.current`
/// are stored flat), then walks nested objects segment by segment.
///
/// # Example
///
/// ```rust
/// use battle_sim_core_rs::expr::{MapScope, Scope};
///
/// let target = MapScope::new().with("x", 3.0).with("def.physical", 40.0);
/// let scope = MapScope::new().with("atk", 120.0).with_object("target", target);
///
/// assert_eq!(scope.lookup("atk"), Some(120.0));
/// assert_eq!(scope.lookup("target.x"), Some(3.0));
/// assert_eq!(scope.lookup("target.def.physical"), Some(40.0));
/// assert_eq!(scope.lookup("target"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapScope {
    values: BTreeMap<String, ScopeValue>,
}

impl MapScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style numeric insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style nested object insert
    pub fn with_object(mut self, name: impl Into<String>, object: MapScope) -> Self {
        self.insert_object(name, object);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), ScopeValue::Number(value));
    }

    pub fn insert_object(&mut self, name: impl Into<String>, object: MapScope) {
        self.values
            .insert(name.into(), ScopeValue::Object(object.values));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Scope for MapScope {
    fn lookup(&self, name: &str) -> Option<f64> {
        lookup_in(&self.values, name)
    }
}

impl Scope for BTreeMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Scope for HashMap<String, f64> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

/// Two scopes layered: `primary` shadows `fallback`
pub struct ChainScope<'a> {
    primary: &'a dyn Scope,
    fallback: &'a dyn Scope,
}

impl<'a> ChainScope<'a> {
    pub fn new(primary: &'a dyn Scope, fallback: &'a dyn Scope) -> Self {
        Self { primary, fallback }
    }
}

impl Scope for ChainScope<'_> {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.primary
            .lookup(name)
            .or_else(|| self.fallback.lookup(name))
    }
}

/// Scope with nothing in it
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _name: &str) -> Option<f64> {
        None
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

fn truthy(value: f64) -> bool {
    value.abs() >= FLOAT_EPSILON
}

fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Evaluate a parsed expression
pub fn evaluate_expr(expr: &Expr, scope: &dyn Scope) -> Result<f64, EvalError> {
    let value = eval_node(expr, scope)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite)
    }
}

fn eval_node(expr: &Expr, scope: &dyn Scope) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(n) => Ok(*n),

        Expr::Ident(name) => scope
            .lookup(name)
            .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),

        Expr::Unary { op, operand } => {
            let value = eval_node(operand, scope)?;
            Ok(match op {
                UnaryOp::Negate => -value,
                UnaryOp::Not => bool_value(!truthy(value)),
            })
        }

        Expr::Binary { op, left, right } => {
            let l = eval_node(left, scope)?;
            let r = eval_node(right, scope)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Subtract => Ok(l - r),
                BinaryOp::Multiply => Ok(l * r),
                BinaryOp::Divide => {
                    if r.abs() < f64::EPSILON {
                        return Err(EvalError::DivisionByZero);
                    }
                    Ok(l / r)
                }
                BinaryOp::Modulo => {
                    if r.abs() < f64::EPSILON {
                        return Err(EvalError::DivisionByZero);
                    }
                    Ok(l % r)
                }
                BinaryOp::Power => Ok(l.powf(r)),
                BinaryOp::Less => Ok(bool_value(l < r)),
                BinaryOp::LessOrEqual => Ok(bool_value(l <= r)),
                BinaryOp::Greater => Ok(bool_value(l > r)),
                BinaryOp::GreaterOrEqual => Ok(bool_value(l >= r)),
                BinaryOp::Equal => Ok(bool_value((l - r).abs() < FLOAT_EPSILON)),
                BinaryOp::NotEqual => Ok(bool_value((l - r).abs() >= FLOAT_EPSILON)),
            }
        }

        Expr::Logical { op, left, right } => {
            let l = truthy(eval_node(left, scope)?);
            match op {
                LogicalOp::And if !l => Ok(0.0),
                LogicalOp::Or if l => Ok(1.0),
                _ => Ok(bool_value(truthy(eval_node(right, scope)?))),
            }
        }

        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if truthy(eval_node(condition, scope)?) {
                eval_node(then_branch, scope)
            } else {
                eval_node(else_branch, scope)
            }
        }

        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| eval_node(arg, scope))
                .collect::<Result<Vec<f64>, EvalError>>()?;
            Ok(apply_function(*function, &values))
        }
    }
}

/// Arity is validated by the parser, so indexing here is safe
fn apply_function(function: Function, values: &[f64]) -> f64 {
    match function {
        Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Function::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Function::Abs => values[0].abs(),
        Function::Floor => values[0].floor(),
        Function::Ceil => values[0].ceil(),
        Function::Round => values[0].round(),
        Function::Sqrt => values[0].sqrt(),
        Function::Pow => values[0].powf(values[1]),
        Function::Clamp => values[0].max(values[1]).min(values[2]),
    }
}

/// Parse and evaluate formula text in one step (no caching)
///
/// # Example
///
/// ```rust
/// use battle_sim_core_rs::expr::{evaluate, EvalError, MapScope};
///
/// let scope = MapScope::new().with("mp", 300.0);
/// assert_eq!(evaluate("mp >= 100 ? 1 : 0", &scope), Ok(1.0));
/// assert_eq!(evaluate("mp / 0", &scope), Err(EvalError::DivisionByZero));
/// ```
pub fn evaluate(source: &str, scope: &dyn Scope) -> Result<f64, EvalError> {
    let expr = parse(source)?;
    evaluate_expr(&expr, scope)
}

/// Evaluate a numeric formula, substituting `fallback` on failure
pub fn evaluate_or(source: &str, scope: &dyn Scope, fallback: f64) -> f64 {
    match evaluate(source, scope) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(formula = source, error = %e, fallback, "formula evaluation failed");
            fallback
        }
    }
}

/// Evaluate a condition formula; any failure counts as `false`
pub fn evaluate_condition(source: &str, scope: &dyn Scope) -> bool {
    match evaluate(source, scope) {
        Ok(value) => truthy(value),
        Err(e) => {
            tracing::warn!(formula = source, error = %e, "condition evaluation failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> MapScope {
        MapScope::new()
            .with("atk", 120.0)
            .with("def", 40.0)
            .with("zero", 0.0)
            .with("hp.current", 500.0)
    }

    #[test]
    fn test_arithmetic() {
        let s = scope();
        assert_eq!(evaluate("atk + 50", &s), Ok(170.0));
        assert_eq!(evaluate("atk - def * 2", &s), Ok(40.0));
        assert_eq!(evaluate("(atk - def) * 2", &s), Ok(160.0));
        assert_eq!(evaluate("7 % 4", &s), Ok(3.0));
        assert_eq!(evaluate("2 ^ 3 ^ 2", &s), Ok(512.0));
        assert_eq!(evaluate("-2 ^ 2", &s), Ok(-4.0));
    }

    #[test]
    fn test_comparison_and_logic() {
        let s = scope();
        assert_eq!(evaluate("atk > def", &s), Ok(1.0));
        assert_eq!(evaluate("atk == 120", &s), Ok(1.0));
        assert_eq!(evaluate("atk != 120", &s), Ok(0.0));
        assert_eq!(evaluate("!(atk < def)", &s), Ok(1.0));
        assert_eq!(evaluate("atk > 0 && def > 100", &s), Ok(0.0));
        assert_eq!(evaluate("atk > 0 || def > 100", &s), Ok(1.0));
    }

    #[test]
    fn test_short_circuit_skips_unknown_identifiers() {
        let s = scope();
        assert_eq!(evaluate("zero && missing", &s), Ok(0.0));
        assert_eq!(evaluate("atk || missing", &s), Ok(1.0));
        assert_eq!(
            evaluate("atk && missing", &s),
            Err(EvalError::UnknownIdentifier("missing".to_string()))
        );
    }

    #[test]
    fn test_conditional_only_evaluates_taken_branch() {
        let s = scope();
        assert_eq!(evaluate("atk > 100 ? 1 : missing", &s), Ok(1.0));
    }

    #[test]
    fn test_functions() {
        let s = scope();
        assert_eq!(evaluate("max(atk, def, 7)", &s), Ok(120.0));
        assert_eq!(evaluate("min(atk, def)", &s), Ok(40.0));
        assert_eq!(evaluate("clamp(atk, 0, 100)", &s), Ok(100.0));
        assert_eq!(evaluate("floor(2.7) + ceil(2.1) + round(2.5)", &s), Ok(8.0));
        assert_eq!(evaluate("sqrt(16) + abs(-1) + pow(2, 4)", &s), Ok(21.0));
    }

    #[test]
    fn test_division_by_zero_is_error() {
        let s = scope();
        assert_eq!(evaluate("atk / zero", &s), Err(EvalError::DivisionByZero));
        assert_eq!(evaluate("atk % zero", &s), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_non_finite_is_error() {
        let s = scope();
        assert_eq!(evaluate("sqrt(-1)", &s), Err(EvalError::NonFinite));
    }

    #[test]
    fn test_flat_dotted_key() {
        assert_eq!(evaluate("hp.current / 5", &scope()), Ok(100.0));
    }

    #[test]
    fn test_nested_object_lookup() {
        let inner = MapScope::new()
            .with("x", 2.0)
            .with_object("def", MapScope::new().with("physical", 30.0));
        let s = MapScope::new().with_object("target", inner);
        assert_eq!(evaluate("target.x + target.def.physical", &s), Ok(32.0));
        assert!(evaluate("target.def", &s).is_err());
    }

    #[test]
    fn test_fallback_helpers() {
        let s = scope();
        assert_eq!(evaluate_or("missing + 1", &s, 0.0), 0.0);
        assert_eq!(evaluate_or("atk", &s, 0.0), 120.0);
        assert!(!evaluate_condition("missing > 1", &s));
        assert!(!evaluate_condition("atk >", &s));
        assert!(evaluate_condition("atk > 1", &s));
    }

    #[test]
    fn test_chain_scope_shadowing() {
        let primary = MapScope::new().with("atk", 1.0);
        let fallback = scope();
        let chained = ChainScope::new(&primary, &fallback);
        assert_eq!(evaluate("atk + def", &chained), Ok(41.0));
    }

    #[test]
    fn test_scope_is_not_mutated() {
        let s = scope();
        let before = s.clone();
        let _ = evaluate("atk * 2 + def", &s);
        assert_eq!(s, before);
    }
}
