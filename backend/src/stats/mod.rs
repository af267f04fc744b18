//! Reactive Stat Graph
//!
//! Per-member store of base and derived numeric attributes. Derived
//! attributes carry a formula; the graph records which paths each formula
//! reads and keeps cached results until a source changes.
//!
//! # Architecture
//!
//! - **schema**: Declared attribute paths and their default base values
//! - **graph**: Arena of attribute entries, dependency edges and caches
//!
//! # Cache Invariant
//!
//! An entry that is not dirty holds exactly the value its formula (plus
//! modifiers) yields for the current dependency values. Every write marks
//! the written path and all transitive dependents dirty; a dirty read
//! recomputes before returning.
//!
//! # Example
//!
//! ```rust
//! use battle_sim_core_rs::stats::{AttributeSchema, StatGraph};
//!
//! let mut schema = AttributeSchema::new();
//! schema.declare("str", 10.0).unwrap();
//! schema.declare("atk", 0.0).unwrap();
//!
//! let mut graph = StatGraph::new(&schema);
//! graph.define_derived("atk", "str * 12").unwrap();
//! assert_eq!(graph.get("atk").unwrap(), 120.0);
//!
//! graph.set("str", 11.0).unwrap();
//! assert_eq!(graph.get("atk").unwrap(), 132.0);
//! ```

pub mod graph;
pub mod schema;

pub use graph::{ModifierKind, StatGraph, StatModifier, StatReader, BASE_IDENT};
pub use schema::AttributeSchema;

use crate::expr::EvalError;
use thiserror::Error;

/// Errors raised by the stat graph
///
/// All of these are configuration errors; a failed call leaves the graph
/// unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatError {
    #[error("Unknown attribute path: {0}")]
    UnknownPath(String),

    #[error("Attribute path declared twice: {0}")]
    DuplicatePath(String),

    #[error("Invalid attribute path: {0:?}")]
    InvalidPath(String),

    #[error("Formula for {path} references unknown attribute {dependency}")]
    UnknownDependency { path: String, dependency: String },

    #[error("Formula for {path} creates a dependency cycle: {}", cycle.join(" -> "))]
    CyclicDependency { path: String, cycle: Vec<String> },

    #[error("Formula for {path} failed to parse: {source}")]
    Formula { path: String, source: EvalError },
}
