//! Tests for the reactive stat graph

use battle_sim_core_rs::core::ids::EffectId;
use battle_sim_core_rs::stats::{
    AttributeSchema, ModifierKind, StatError, StatGraph, StatModifier,
};
use proptest::prelude::*;

/// a, c base; b = a * 2 + c; d = b + base
fn chain_graph() -> StatGraph {
    let mut schema = AttributeSchema::new();
    for (path, base) in [("a", 1.0), ("b", 0.0), ("c", 3.0), ("d", 10.0)] {
        schema.declare(path, base).unwrap();
    }
    let mut graph = StatGraph::new(&schema);
    graph.define_derived("b", "a * 2 + c").unwrap();
    graph.define_derived("d", "b + base").unwrap();
    graph
}

#[test]
fn test_initial_values() {
    let graph = chain_graph();
    assert_eq!(graph.get("b").unwrap(), 5.0);
    assert_eq!(graph.get("d").unwrap(), 15.0);
}

#[test]
fn test_write_dirties_transitive_dependents_only() {
    let mut graph = chain_graph();
    graph.refresh();
    assert!(!graph.is_dirty("d").unwrap());

    graph.set("c", 4.0).unwrap();
    assert!(graph.is_dirty("b").unwrap());
    assert!(graph.is_dirty("d").unwrap());
    assert!(!graph.is_dirty("a").unwrap());

    assert_eq!(graph.get("d").unwrap(), 16.0);
    assert!(!graph.is_dirty("d").unwrap());
}

#[test]
fn test_clean_read_does_not_recompute() {
    let graph = chain_graph();
    graph.get("d").unwrap();
    let before = graph.recomputations();
    graph.get("d").unwrap();
    graph.get("b").unwrap();
    assert_eq!(graph.recomputations(), before);
}

#[test]
fn test_cycle_rejected_and_graph_unchanged() {
    let mut graph = chain_graph();
    let err = graph.define_derived("a", "d - 1").unwrap_err();
    match err {
        StatError::CyclicDependency { path, cycle } => {
            assert_eq!(path, "a");
            assert!(cycle.contains(&"d".to_string()));
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
    assert_eq!(graph.formula("a"), None);
    assert_eq!(graph.get("d").unwrap(), 15.0);
}

#[test]
fn test_unknown_paths() {
    let mut graph = chain_graph();
    assert_eq!(
        graph.get("luck"),
        Err(StatError::UnknownPath("luck".to_string()))
    );
    assert!(matches!(
        graph.define_derived("b", "luck + 1"),
        Err(StatError::UnknownDependency { .. })
    ));
    // The failed redefinition kept the old formula
    assert_eq!(graph.formula("b"), Some("a * 2 + c"));
}

#[test]
fn test_modifiers_removed_by_owner() {
    let mut graph = chain_graph();
    let owner = EffectId(7);
    graph
        .add_modifier(
            "a",
            StatModifier {
                source: owner,
                kind: ModifierKind::Multiply,
                value: 1.0,
            },
        )
        .unwrap();
    assert_eq!(graph.get("a").unwrap(), 2.0);
    assert_eq!(graph.get("d").unwrap(), 17.0);

    let dirtied = graph.remove_modifiers_of(owner);
    assert_eq!(dirtied, vec!["a".to_string()]);
    assert!(graph.remove_modifiers_of(owner).is_empty());
    assert_eq!(graph.get("d").unwrap(), 15.0);
}

#[derive(Debug, Clone)]
enum Op {
    SetA(i32),
    SetC(i32),
    SetD(i32),
    AddModifier(u64, i32),
    RemoveModifiers(u64),
    Refresh,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-100i32..100).prop_map(Op::SetA),
        (-100i32..100).prop_map(Op::SetC),
        (-100i32..100).prop_map(Op::SetD),
        (0u64..4, -20i32..20).prop_map(|(owner, v)| Op::AddModifier(owner, v)),
        (0u64..4).prop_map(Op::RemoveModifiers),
        Just(Op::Refresh),
    ]
}

proptest! {
    /// After any sequence of writes, reads equal a from-scratch evaluation
    #[test]
    fn prop_reads_match_fresh_evaluation(ops in prop::collection::vec(op(), 0..40)) {
        let mut graph = chain_graph();
        let (mut a, mut c, mut d_base) = (1.0, 3.0, 10.0);
        let mut modifiers: Vec<(u64, f64)> = Vec::new();

        for op in ops {
            match op {
                Op::SetA(v) => { a = v as f64; graph.set("a", a).unwrap(); }
                Op::SetC(v) => { c = v as f64; graph.set("c", c).unwrap(); }
                Op::SetD(v) => { d_base = v as f64; graph.set("d", d_base).unwrap(); }
                Op::AddModifier(owner, v) => {
                    modifiers.push((owner, v as f64));
                    graph.add_modifier("a", StatModifier {
                        source: EffectId(owner),
                        kind: ModifierKind::Add,
                        value: v as f64,
                    }).unwrap();
                }
                Op::RemoveModifiers(owner) => {
                    modifiers.retain(|(o, _)| *o != owner);
                    graph.remove_modifiers_of(EffectId(owner));
                }
                Op::Refresh => { graph.refresh(); }
            }

            let a_value = a + modifiers.iter().map(|(_, v)| v).sum::<f64>();
            let b_value = a_value * 2.0 + c;
            prop_assert_eq!(graph.get("a").unwrap(), a_value);
            prop_assert_eq!(graph.get("d").unwrap(), b_value + d_base);
            prop_assert_eq!(graph.get("b").unwrap(), b_value);
        }
    }
}
