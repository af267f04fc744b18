//! Tests for the behavior-tree interpreter driven through `Agent`

use battle_sim_core_rs::behavior::{
    Agent, CapabilityRegistry, LocalContext, NodeStatus, TreeDocument, STANDARD_SET,
};
use battle_sim_core_rs::events::SimEvent;
use battle_sim_core_rs::expr::{MapScope, Scope};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Registry with `ok`, `fail` and `count_*` leaves that record invocations
fn counting_registry(calls: &Arc<[AtomicUsize; 3]>) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::with_standard();
    let set = registry.set_mut(STANDARD_SET);
    for (slot, (name, status)) in [
        ("first", NodeStatus::Succeeded),
        ("second", NodeStatus::Failed),
        ("third", NodeStatus::Succeeded),
    ]
    .into_iter()
    .enumerate()
    {
        let calls = Arc::clone(calls);
        set.register_action_fn(name, move |_call| {
            calls[slot].fetch_add(1, Ordering::SeqCst);
            status
        });
    }
    registry
}

fn leaf(id: &str, function: &str) -> String {
    format!(r#"{{"type":"action","id":"{id}","function":"{function}"}}"#)
}

fn load(definition: &str, registry: &CapabilityRegistry) -> Agent {
    let mut agent = Agent::new("m");
    agent
        .load(&TreeDocument::new("t", definition), registry)
        .unwrap();
    agent
}

#[test]
fn test_sequence_stops_at_first_failure() {
    let calls: Arc<[AtomicUsize; 3]> = Arc::new(Default::default());
    let registry = counting_registry(&calls);
    let definition = format!(
        r#"{{"type":"sequence","id":"root","children":[{},{},{}]}}"#,
        leaf("a", "first"),
        leaf("b", "second"),
        leaf("c", "third")
    );
    let mut agent = load(&definition, &registry);
    let mut ctx = LocalContext::new("m");

    assert_eq!(agent.tick(&mut ctx), NodeStatus::Failed);
    let counts: Vec<usize> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![1, 1, 0]);
}

#[test]
fn test_selector_stops_at_first_success() {
    let calls: Arc<[AtomicUsize; 3]> = Arc::new(Default::default());
    let registry = counting_registry(&calls);
    let definition = format!(
        r#"{{"type":"selector","id":"root","children":[{},{},{}]}}"#,
        leaf("b", "second"),
        leaf("a", "first"),
        leaf("c", "third")
    );
    let mut agent = load(&definition, &registry);
    let mut ctx = LocalContext::new("m");

    assert_eq!(agent.tick(&mut ctx), NodeStatus::Succeeded);
    let counts: Vec<usize> = calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![1, 1, 0]);
}

#[test]
fn test_flip_inverts_terminal_results() {
    let calls: Arc<[AtomicUsize; 3]> = Arc::new(Default::default());
    let registry = counting_registry(&calls);
    for (function, expected) in [
        ("first", NodeStatus::Failed),
        ("second", NodeStatus::Succeeded),
    ] {
        let definition = format!(
            r#"{{"type":"decorator","id":"flip","variant":"flip","child":{}}}"#,
            leaf("x", function)
        );
        let mut agent = load(&definition, &registry);
        assert_eq!(agent.tick(&mut LocalContext::new("m")), expected);
    }
}

#[test]
fn test_flip_passes_running_through() {
    let registry = CapabilityRegistry::with_standard();
    let definition = r#"{"type":"decorator","id":"flip","variant":"flip",
        "child":{"type":"action","id":"w","function":"wait","config":{"frames":3}}}"#;
    let mut agent = load(definition, &registry);
    assert_eq!(agent.tick(&mut LocalContext::new("m")), NodeStatus::Running);
}

#[test]
fn test_delayed_outcome_completes_sequence() {
    let registry = CapabilityRegistry::with_standard();
    let definition = r#"{"type":"sequence","id":"root","children":[
        {"type":"action","id":"w","function":"wait","config":{"frames":4}},
        {"type":"action","id":"mark","function":"set_var","config":{"name":"done","value":"1"}}
    ]}"#;
    let mut agent = load(definition, &registry);
    let mut ctx = LocalContext::new("m");

    assert_eq!(agent.tick(&mut ctx), NodeStatus::Running);
    for frame in 1..4 {
        ctx.frame = frame;
        assert!(ctx.queue.drain(frame).unwrap().is_empty());
        assert_eq!(agent.tick(&mut ctx), NodeStatus::Running);
    }

    ctx.frame = 4;
    for event in ctx.queue.drain(4).unwrap() {
        let SimEvent::ResumeBehavior { node, outcome, .. } = event.payload else {
            panic!("unexpected payload");
        };
        assert!(agent.deliver(node, event.id, outcome));
    }
    assert_eq!(agent.tick(&mut ctx), NodeStatus::Succeeded);
    assert_eq!(agent.blackboard().get("done"), Some(1.0));
}

#[test]
fn test_reload_discards_pending_outcome() {
    let registry = CapabilityRegistry::with_standard();
    let wait = r#"{"type":"action","id":"w","function":"wait","config":{"frames":2}}"#;
    let mut agent = load(wait, &registry);
    let mut ctx = LocalContext::new("m");
    agent.tick(&mut ctx);

    agent
        .load(&TreeDocument::new("t2", wait), &registry)
        .unwrap();
    let events = ctx.queue.drain(2).unwrap();
    let SimEvent::ResumeBehavior { node, outcome, .. } = events[0].payload else {
        panic!("unexpected payload");
    };
    assert!(!agent.deliver(node, events[0].id, outcome));
}

#[test]
fn test_custom_condition_gates_sequence() {
    let mut registry = CapabilityRegistry::with_standard();
    registry
        .set_mut(STANDARD_SET)
        .register_condition_fn("hurt", |call| {
            call.ctx.stats().lookup("hp.current").unwrap_or(0.0) < 100.0
        });
    let definition = r#"{"type":"sequence","id":"root","children":[
        {"type":"condition","id":"check","function":"hurt"},
        {"type":"action","id":"mark","function":"set_var","config":{"name":"fled","value":"1"}}
    ]}"#;

    let mut healthy = LocalContext::new("m");
    healthy.stats = MapScope::new().with("hp.current", 400.0);
    let mut agent = load(definition, &registry);
    assert_eq!(agent.tick(&mut healthy), NodeStatus::Failed);
    assert_eq!(agent.blackboard().get("fled"), None);

    let mut wounded = LocalContext::new("m");
    wounded.stats = MapScope::new().with("hp.current", 40.0);
    let mut agent = load(definition, &registry);
    assert_eq!(agent.tick(&mut wounded), NodeStatus::Succeeded);
    assert_eq!(agent.blackboard().get("fled"), Some(1.0));
}
