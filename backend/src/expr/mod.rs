//! Expression Evaluator
//!
//! Scalar formula language shared by every other component: derived stat
//! formulas, pipeline stages, skill conditions, costs, ranges and damage.
//!
//! # Architecture
//!
//! - **ast**: Closed expression tree (`Expr`) produced by the parser
//! - **parser**: Tokenizer + recursive-descent parser (`parse`)
//! - **eval**: Evaluation against a read-only `Scope`
//! - **cache**: Parse-once cache keyed by source text
//!
//! # Failure Model
//!
//! Every failure is an `EvalError`. Callers never let one escape into the
//! simulation loop: conditions fall back to `false`, numeric formulas to `0`
//! (see [`evaluate_or`] and [`evaluate_condition`]).
//!
//! # Example
//!
//! ```rust
//! use battle_sim_core_rs::expr::{evaluate, MapScope};
//!
//! let scope = MapScope::new().with("atk", 120.0);
//! assert_eq!(evaluate("atk + 50", &scope).unwrap(), 170.0);
//! ```

pub mod ast;
pub mod cache;
pub mod eval;
pub mod parser;

pub use ast::{BinaryOp, Expr, Function, LogicalOp, UnaryOp};
pub use cache::ExpressionCache;
pub use eval::{
    evaluate, evaluate_condition, evaluate_expr, evaluate_or, ChainScope, EmptyScope, MapScope,
    Scope, ScopeValue,
};
pub use parser::parse;

use thiserror::Error;

/// Errors raised while parsing or evaluating a formula
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("Syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {function} expects {expected} arguments, got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Expression produced a non-finite result")]
    NonFinite,
}
