//! Stat graph: attribute arena, dependency edges and memoized values
//!
//! Entries live in a `Vec` and reference each other by index. A derived
//! entry lists the indices its formula reads (`dependencies`); the graph
//! keeps the reverse edges (`dependents`) so a write can dirty everything
//! downstream without scanning formulas.
//!
//! Caches sit in `Cell`s: reading through `&StatGraph` may recompute a dirty
//! entry, which lets other members read this graph through a shared
//! reference without being able to write to it.

use super::schema::AttributeSchema;
use super::StatError;
use crate::core::ids::EffectId;
use crate::expr::{evaluate_expr, parse, Expr, Scope};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reserved formula identifier for an entry's own base value
pub const BASE_IDENT: &str = "base";

// ============================================================================
// MODIFIERS
// ============================================================================

/// How a modifier combines with the raw attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    /// Added to the raw value
    Add,
    /// Scales by `1 + value`
    Multiply,
}

/// Effect-owned adjustment to one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatModifier {
    pub source: EffectId,
    pub kind: ModifierKind,
    pub value: f64,
}

fn apply_modifiers(raw: f64, modifiers: &[StatModifier]) -> f64 {
    let (add, mul) = modifiers
        .iter()
        .fold((0.0, 1.0), |(add, mul), m| match m.kind {
            ModifierKind::Add => (add + m.value, mul),
            ModifierKind::Multiply => (add, mul * (1.0 + m.value)),
        });
    (raw + add) * mul
}

// ============================================================================
// ENTRIES
// ============================================================================

#[derive(Debug, Clone)]
struct DerivedFormula {
    source: String,
    expr: Arc<Expr>,
    dependencies: Vec<usize>,
}

#[derive(Debug, Clone)]
struct AttributeEntry {
    path: String,
    base_value: f64,
    formula: Option<DerivedFormula>,
    modifiers: Vec<StatModifier>,
    cached_value: Cell<f64>,
    cache_version: Cell<u64>,
    dirty: Cell<bool>,
}

/// Read-only access to another member's attributes
///
/// Cross-member reads (a damage formula reading the target's defense) go
/// through this trait; it offers no way to write.
pub trait StatReader {
    fn stat(&self, path: &str) -> Option<f64>;
}

// ============================================================================
// GRAPH
// ============================================================================

/// Per-member reactive attribute store
#[derive(Debug, Clone)]
pub struct StatGraph {
    entries: Vec<AttributeEntry>,
    index: BTreeMap<String, usize>,
    /// Reverse edges: `dependents[i]` lists entries whose formula reads `i`
    dependents: Vec<Vec<usize>>,
    recomputations: Cell<u64>,
}

/// Scope handed to a derived formula while it is recomputed
struct FormulaScope<'g> {
    graph: &'g StatGraph,
    base: f64,
}

impl Scope for FormulaScope<'_> {
    fn lookup(&self, name: &str) -> Option<f64> {
        if name == BASE_IDENT {
            return Some(self.base);
        }
        self.graph
            .index
            .get(name)
            .map(|&idx| self.graph.resolve(idx))
    }
}

impl StatGraph {
    /// Create a graph holding every schema path at its default base value
    pub fn new(schema: &AttributeSchema) -> Self {
        let mut graph = Self {
            entries: Vec::with_capacity(schema.len()),
            index: BTreeMap::new(),
            dependents: Vec::with_capacity(schema.len()),
            recomputations: Cell::new(0),
        };
        for (path, base) in schema.iter() {
            graph.index.insert(path.to_string(), graph.entries.len());
            graph.entries.push(AttributeEntry {
                path: path.to_string(),
                base_value: base,
                formula: None,
                modifiers: Vec::new(),
                cached_value: Cell::new(0.0),
                cache_version: Cell::new(0),
                dirty: Cell::new(true),
            });
            graph.dependents.push(Vec::new());
        }
        graph
    }

    fn index_of(&self, path: &str) -> Result<usize, StatError> {
        self.index
            .get(path)
            .copied()
            .ok_or_else(|| StatError::UnknownPath(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Declared paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current value of `path`, recomputing first if dirty
    ///
    /// A clean read returns the cache without touching any other entry.
    pub fn get(&self, path: &str) -> Result<f64, StatError> {
        let idx = self.index_of(path)?;
        Ok(self.resolve(idx))
    }

    /// Stored base value (ignores formula and modifiers)
    pub fn base(&self, path: &str) -> Result<f64, StatError> {
        let idx = self.index_of(path)?;
        Ok(self.entries[idx].base_value)
    }

    /// Write a base value and dirty the path plus all transitive dependents
    pub fn set(&mut self, path: &str, value: f64) -> Result<(), StatError> {
        let idx = self.index_of(path)?;
        self.entries[idx].base_value = value;
        self.mark_dirty(idx);
        Ok(())
    }

    /// Add `delta` to the base value, returning the new base
    pub fn adjust(&mut self, path: &str, delta: f64) -> Result<f64, StatError> {
        let idx = self.index_of(path)?;
        let value = self.entries[idx].base_value + delta;
        self.entries[idx].base_value = value;
        self.mark_dirty(idx);
        Ok(value)
    }

    /// Attach a formula to `path`, replacing any previous one
    ///
    /// The formula may read any declared path plus `base` (the entry's own
    /// base value).
    ///
    /// # Errors
    /// * `UnknownPath` if `path` is not declared
    /// * `Formula` if the text does not parse
    /// * `UnknownDependency` if the formula reads an undeclared path
    /// * `CyclicDependency` if the formula would make `path` depend on itself
    ///
    /// On error the graph is unchanged.
    ///
    /// # Example
    /// ```
    /// use battle_sim_core_rs::stats::{AttributeSchema, StatError, StatGraph};
    ///
    /// let mut schema = AttributeSchema::new();
    /// schema.declare("a", 1.0).unwrap();
    /// schema.declare("b", 0.0).unwrap();
    /// let mut graph = StatGraph::new(&schema);
    ///
    /// graph.define_derived("b", "a * 2").unwrap();
    /// let err = graph.define_derived("a", "b + 1").unwrap_err();
    /// assert!(matches!(err, StatError::CyclicDependency { .. }));
    /// assert_eq!(graph.get("b").unwrap(), 2.0);
    /// ```
    pub fn define_derived(&mut self, path: &str, formula: &str) -> Result<(), StatError> {
        let idx = self.index_of(path)?;
        let expr = parse(formula).map_err(|source| StatError::Formula {
            path: path.to_string(),
            source,
        })?;

        let mut dependencies = Vec::new();
        for name in expr.identifiers() {
            if name == BASE_IDENT {
                continue;
            }
            let dep = self
                .index
                .get(&name)
                .copied()
                .ok_or_else(|| StatError::UnknownDependency {
                    path: path.to_string(),
                    dependency: name.clone(),
                })?;
            dependencies.push(dep);
        }

        for &dep in &dependencies {
            let mut trail = Vec::new();
            let mut seen = vec![false; self.entries.len()];
            if self.reaches(dep, idx, &mut seen, &mut trail) {
                let mut cycle = vec![path.to_string()];
                cycle.extend(trail.iter().map(|&i| self.entries[i].path.clone()));
                return Err(StatError::CyclicDependency {
                    path: path.to_string(),
                    cycle,
                });
            }
        }

        if let Some(old) = self.entries[idx].formula.take() {
            for dep in old.dependencies {
                self.dependents[dep].retain(|&d| d != idx);
            }
        }
        for &dep in &dependencies {
            self.dependents[dep].push(idx);
        }
        self.entries[idx].formula = Some(DerivedFormula {
            source: formula.to_string(),
            expr: Arc::new(expr),
            dependencies,
        });
        self.mark_dirty(idx);
        tracing::debug!(path, formula, "derived attribute defined");
        Ok(())
    }

    /// Depth-first search along formula edges from `from` looking for `to`
    fn reaches(&self, from: usize, to: usize, seen: &mut [bool], trail: &mut Vec<usize>) -> bool {
        trail.push(from);
        if from == to {
            return true;
        }
        if !seen[from] {
            seen[from] = true;
            if let Some(formula) = &self.entries[from].formula {
                for &next in &formula.dependencies {
                    if self.reaches(next, to, seen, trail) {
                        return true;
                    }
                }
            }
        }
        trail.pop();
        false
    }

    /// Formula text attached to `path`, if derived
    pub fn formula(&self, path: &str) -> Option<&str> {
        let idx = *self.index.get(path)?;
        self.entries[idx]
            .formula
            .as_ref()
            .map(|f| f.source.as_str())
    }

    /// Paths read by the formula of `path`
    pub fn dependencies(&self, path: &str) -> Vec<&str> {
        self.index
            .get(path)
            .and_then(|&idx| self.entries[idx].formula.as_ref())
            .map(|f| {
                f.dependencies
                    .iter()
                    .map(|&d| self.entries[d].path.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Paths whose formula reads `path` directly
    pub fn dependents(&self, path: &str) -> Vec<&str> {
        self.index
            .get(path)
            .map(|&idx| {
                self.dependents[idx]
                    .iter()
                    .map(|&d| self.entries[d].path.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn add_modifier(&mut self, path: &str, modifier: StatModifier) -> Result<(), StatError> {
        let idx = self.index_of(path)?;
        self.entries[idx].modifiers.push(modifier);
        self.mark_dirty(idx);
        Ok(())
    }

    /// Remove every modifier owned by `source`
    ///
    /// Returns the affected paths; each is marked dirty along with its
    /// dependents. Calling this again for the same source is a no-op.
    pub fn remove_modifiers_of(&mut self, source: EffectId) -> Vec<String> {
        let mut affected = Vec::new();
        for idx in 0..self.entries.len() {
            let before = self.entries[idx].modifiers.len();
            self.entries[idx].modifiers.retain(|m| m.source != source);
            if self.entries[idx].modifiers.len() != before {
                self.mark_dirty(idx);
                affected.push(self.entries[idx].path.clone());
            }
        }
        affected
    }

    pub fn is_dirty(&self, path: &str) -> Result<bool, StatError> {
        let idx = self.index_of(path)?;
        Ok(self.entries[idx].dirty.get())
    }

    /// Number of recomputations `path` has gone through
    pub fn cache_version(&self, path: &str) -> Result<u64, StatError> {
        let idx = self.index_of(path)?;
        Ok(self.entries[idx].cache_version.get())
    }

    /// Total entry recomputations since construction
    pub fn recomputations(&self) -> u64 {
        self.recomputations.get()
    }

    /// Recompute every dirty entry; returns how many were recomputed
    pub fn refresh(&self) -> usize {
        let before = self.recomputations.get();
        for idx in 0..self.entries.len() {
            self.resolve(idx);
        }
        (self.recomputations.get() - before) as usize
    }

    /// Every attribute value keyed by path
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.index
            .iter()
            .map(|(path, &idx)| (path.clone(), self.resolve(idx)))
            .collect()
    }

    fn mark_dirty(&self, root: usize) {
        self.entries[root].dirty.set(true);
        let mut stack: Vec<usize> = self.dependents[root].clone();
        while let Some(idx) = stack.pop() {
            let entry = &self.entries[idx];
            // A dirty entry's dependents are already dirty
            if entry.dirty.get() {
                continue;
            }
            entry.dirty.set(true);
            stack.extend(self.dependents[idx].iter().copied());
        }
    }

    /// Return the value at `idx`, recomputing depth-first if dirty
    ///
    /// Dependencies resolve through the same path, so a shared ancestor is
    /// computed once and then served from its cache.
    fn resolve(&self, idx: usize) -> f64 {
        let entry = &self.entries[idx];
        if !entry.dirty.get() {
            return entry.cached_value.get();
        }

        let raw = match &entry.formula {
            Some(formula) => {
                let scope = FormulaScope {
                    graph: self,
                    base: entry.base_value,
                };
                match evaluate_expr(&formula.expr, &scope) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(
                            path = %entry.path,
                            formula = %formula.source,
                            error = %e,
                            "derived attribute evaluation failed, using 0"
                        );
                        0.0
                    }
                }
            }
            None => entry.base_value,
        };

        let value = apply_modifiers(raw, &entry.modifiers);
        entry.cached_value.set(value);
        entry.cache_version.set(entry.cache_version.get() + 1);
        entry.dirty.set(false);
        self.recomputations.set(self.recomputations.get() + 1);
        value
    }
}

impl StatReader for StatGraph {
    fn stat(&self, path: &str) -> Option<f64> {
        self.get(path).ok()
    }
}

impl Scope for StatGraph {
    fn lookup(&self, name: &str) -> Option<f64> {
        self.get(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(paths: &[(&str, f64)]) -> AttributeSchema {
        let mut schema = AttributeSchema::new();
        for (path, base) in paths {
            schema.declare(path, *base).unwrap();
        }
        schema
    }

    fn diamond() -> StatGraph {
        // str -> atk, str -> def, (atk, def) -> power
        let mut graph = StatGraph::new(&schema(&[
            ("str", 10.0),
            ("atk", 0.0),
            ("def", 0.0),
            ("power", 0.0),
        ]));
        graph.define_derived("atk", "str * 12").unwrap();
        graph.define_derived("def", "str * 4").unwrap();
        graph.define_derived("power", "atk + def").unwrap();
        graph
    }

    #[test]
    fn test_base_read_and_write() {
        let mut graph = StatGraph::new(&schema(&[("hp.current", 500.0)]));
        assert_eq!(graph.get("hp.current").unwrap(), 500.0);
        graph.set("hp.current", 320.0).unwrap();
        assert_eq!(graph.get("hp.current").unwrap(), 320.0);
        assert_eq!(graph.adjust("hp.current", -20.0).unwrap(), 300.0);
        assert_eq!(graph.get("hp.current").unwrap(), 300.0);
    }

    #[test]
    fn test_unknown_path() {
        let mut graph = StatGraph::new(&schema(&[("a", 1.0)]));
        assert_eq!(graph.get("b"), Err(StatError::UnknownPath("b".to_string())));
        assert!(graph.set("b", 1.0).is_err());
    }

    #[test]
    fn test_write_dirties_transitive_dependents() {
        let mut graph = diamond();
        assert_eq!(graph.get("power").unwrap(), 160.0);
        assert!(!graph.is_dirty("power").unwrap());

        graph.set("str", 20.0).unwrap();
        for path in ["str", "atk", "def", "power"] {
            assert!(graph.is_dirty(path).unwrap(), "{path} should be dirty");
        }
        assert_eq!(graph.get("power").unwrap(), 320.0);
    }

    #[test]
    fn test_shared_ancestor_recomputed_once() {
        let graph = diamond();
        let before = graph.recomputations();
        graph.get("power").unwrap();
        // str, atk, def, power: each exactly once
        assert_eq!(graph.recomputations() - before, 4);
        assert_eq!(graph.cache_version("str").unwrap(), 1);
    }

    #[test]
    fn test_clean_read_does_not_recompute() {
        let graph = diamond();
        graph.get("power").unwrap();
        let before = graph.recomputations();
        for _ in 0..10 {
            graph.get("power").unwrap();
        }
        assert_eq!(graph.recomputations(), before);
    }

    #[test]
    fn test_read_of_unrelated_path_leaves_others_dirty() {
        let mut graph = diamond();
        graph.refresh();
        graph.set("str", 1.0).unwrap();
        graph.get("atk").unwrap();
        assert!(!graph.is_dirty("atk").unwrap());
        assert!(graph.is_dirty("def").unwrap());
        assert!(graph.is_dirty("power").unwrap());
        assert_eq!(graph.get("power").unwrap(), 16.0);
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut graph = StatGraph::new(&schema(&[("atk", 0.0)]));
        assert_eq!(
            graph.define_derived("atk", "str * 2"),
            Err(StatError::UnknownDependency {
                path: "atk".to_string(),
                dependency: "str".to_string(),
            })
        );
        assert!(graph.formula("atk").is_none());
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut graph = StatGraph::new(&schema(&[("a", 1.0)]));
        let err = graph.define_derived("a", "a + 1").unwrap_err();
        assert_eq!(
            err,
            StatError::CyclicDependency {
                path: "a".to_string(),
                cycle: vec!["a".to_string(), "a".to_string()],
            }
        );
    }

    #[test]
    fn test_indirect_cycle_leaves_graph_unchanged() {
        let mut graph = diamond();
        assert_eq!(graph.get("power").unwrap(), 160.0);

        let err = graph.define_derived("str", "power / 2").unwrap_err();
        match err {
            StatError::CyclicDependency { cycle, .. } => {
                assert_eq!(cycle.first().map(String::as_str), Some("str"));
                assert_eq!(cycle.last().map(String::as_str), Some("str"));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(graph.formula("str").is_none());
        assert!(graph.dependents("power").is_empty());
        assert!(!graph.is_dirty("power").unwrap());
        assert_eq!(graph.get("power").unwrap(), 160.0);
    }

    #[test]
    fn test_redefinition_rewires_edges() {
        let mut graph = StatGraph::new(&schema(&[("a", 1.0), ("b", 2.0), ("c", 0.0)]));
        graph.define_derived("c", "a * 10").unwrap();
        assert_eq!(graph.get("c").unwrap(), 10.0);

        graph.define_derived("c", "b * 10").unwrap();
        assert_eq!(graph.get("c").unwrap(), 20.0);
        assert!(graph.dependents("a").is_empty());
        assert_eq!(graph.dependents("b"), vec!["c"]);

        graph.set("a", 5.0).unwrap();
        assert!(!graph.is_dirty("c").unwrap());
    }

    #[test]
    fn test_base_identifier() {
        let mut graph = StatGraph::new(&schema(&[("str", 10.0), ("atk", 100.0)]));
        graph.define_derived("atk", "base + str * 2").unwrap();
        assert_eq!(graph.get("atk").unwrap(), 120.0);
        graph.set("atk", 50.0).unwrap();
        assert_eq!(graph.get("atk").unwrap(), 70.0);
    }

    #[test]
    fn test_failed_formula_falls_back_to_zero() {
        let mut graph = StatGraph::new(&schema(&[("a", 0.0), ("b", 0.0)]));
        graph.define_derived("b", "10 / a").unwrap();
        assert_eq!(graph.get("b").unwrap(), 0.0);
        graph.set("a", 2.0).unwrap();
        assert_eq!(graph.get("b").unwrap(), 5.0);
    }

    #[test]
    fn test_modifiers() {
        let mut graph = diamond();
        graph
            .add_modifier(
                "atk",
                StatModifier {
                    source: EffectId(1),
                    kind: ModifierKind::Add,
                    value: 30.0,
                },
            )
            .unwrap();
        graph
            .add_modifier(
                "atk",
                StatModifier {
                    source: EffectId(2),
                    kind: ModifierKind::Multiply,
                    value: 0.5,
                },
            )
            .unwrap();
        // (120 + 30) * 1.5
        assert_eq!(graph.get("atk").unwrap(), 225.0);
        assert_eq!(graph.get("power").unwrap(), 265.0);

        assert_eq!(graph.remove_modifiers_of(EffectId(1)), vec!["atk".to_string()]);
        assert!(graph.is_dirty("power").unwrap());
        assert_eq!(graph.get("atk").unwrap(), 180.0);

        assert!(graph.remove_modifiers_of(EffectId(1)).is_empty());
        graph.remove_modifiers_of(EffectId(2));
        assert_eq!(graph.get("power").unwrap(), 160.0);
    }

    #[test]
    fn test_snapshot_and_refresh() {
        let graph = diamond();
        assert_eq!(graph.refresh(), 4);
        assert_eq!(graph.refresh(), 0);
        let snap = graph.snapshot();
        assert_eq!(snap.keys().collect::<Vec<_>>(), vec!["atk", "def", "power", "str"]);
        assert_eq!(snap["power"], 160.0);
    }

    #[test]
    fn test_graph_is_a_read_only_scope() {
        let graph = diamond();
        let reader: &dyn StatReader = &graph;
        assert_eq!(reader.stat("atk"), Some(120.0));
        assert_eq!(crate::expr::evaluate("atk + 50", &graph), Ok(170.0));
    }
}
