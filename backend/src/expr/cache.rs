//! Parse-once expression cache
//!
//! Formulas are authored as text and evaluated many times per match.
//! Identical source text always reuses the same parsed form.

use super::ast::Expr;
use super::eval::{evaluate_expr, Scope};
use super::parser::parse;
use super::EvalError;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache of parsed expressions keyed by source string
///
/// # Example
///
/// ```rust
/// use battle_sim_core_rs::expr::{ExpressionCache, MapScope};
///
/// let mut cache = ExpressionCache::new();
/// let scope = MapScope::new().with("atk", 120.0);
///
/// assert_eq!(cache.evaluate("atk + 50", &scope).unwrap(), 170.0);
/// assert_eq!(cache.evaluate("atk + 50", &scope).unwrap(), 170.0);
/// assert_eq!(cache.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: HashMap<String, Arc<Expr>>,
    parses: u64,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the parsed form of `source`, parsing it on first use
    ///
    /// Parse failures are not cached; the error is returned every time.
    pub fn get_or_parse(&mut self, source: &str) -> Result<Arc<Expr>, EvalError> {
        if let Some(expr) = self.entries.get(source) {
            return Ok(Arc::clone(expr));
        }
        self.parses += 1;
        let expr = Arc::new(parse(source)?);
        self.entries.insert(source.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn evaluate(&mut self, source: &str, scope: &dyn Scope) -> Result<f64, EvalError> {
        let expr = self.get_or_parse(source)?;
        evaluate_expr(&expr, scope)
    }

    /// Numeric evaluation with a caller-defined fallback on failure
    pub fn evaluate_or(&mut self, source: &str, scope: &dyn Scope, fallback: f64) -> f64 {
        match self.evaluate(source, scope) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(formula = source, error = %e, fallback, "formula evaluation failed");
                fallback
            }
        }
    }

    /// Condition evaluation; failure counts as `false`
    pub fn evaluate_condition(&mut self, source: &str, scope: &dyn Scope) -> bool {
        match self.evaluate(source, scope) {
            Ok(value) => value.abs() >= 1e-9,
            Err(e) => {
                tracing::warn!(formula = source, error = %e, "condition evaluation failed");
                false
            }
        }
    }

    /// How many times source text was handed to the parser
    pub fn parse_count(&self) -> u64 {
        self.parses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::MapScope;

    #[test]
    fn test_identical_text_reuses_parsed_form() {
        let mut cache = ExpressionCache::new();
        let a = cache.get_or_parse("atk * 2").unwrap();
        let b = cache.get_or_parse("atk * 2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.parse_count(), 1);
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let mut cache = ExpressionCache::new();
        assert!(cache.get_or_parse("atk *").is_err());
        assert!(cache.get_or_parse("atk *").is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.parse_count(), 2);
    }

    #[test]
    fn test_fallbacks() {
        let mut cache = ExpressionCache::new();
        let scope = MapScope::new().with("mp", 50.0);
        assert_eq!(cache.evaluate_or("mp - missing", &scope, 0.0), 0.0);
        assert!(!cache.evaluate_condition("mp >", &scope));
        assert!(cache.evaluate_condition("mp >= 50", &scope));
    }
}
