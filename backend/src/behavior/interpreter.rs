//! Tick algorithm
//!
//! One call to [`tick_tree`] walks the tree from the root:
//!
//! - A node already in a terminal state is reset (with its subtree) to
//!   `Ready` before it is evaluated again; delayed outcomes the subtree
//!   still waited for are cancelled
//! - **Sequence** ticks children from its cursor; `Failed` stops it,
//!   `Running` pauses it at that child, all `Succeeded` completes it
//! - **Selector** mirrors the sequence with `Succeeded` and `Failed` swapped
//! - **Decorator** ticks its child and maps the result
//! - **Leaves** call their bound capability; a leaf waiting on a delayed
//!   outcome stays `Running` without being invoked until the outcome arrives

use super::context::{BehaviorContext, Blackboard, LeafCall};
use super::tree::{BehaviorTree, NodeIndex, NodeKind};
use super::types::NodeStatus;

/// Tick a tree once; returns the root's resulting state
pub fn tick_tree(
    tree: &mut BehaviorTree,
    ctx: &mut dyn BehaviorContext,
    vars: &mut Blackboard,
) -> NodeStatus {
    if tree.is_empty() {
        return NodeStatus::Failed;
    }
    let root = tree.root();
    tick_node(tree, root, ctx, vars)
}

fn tick_node(
    tree: &mut BehaviorTree,
    idx: NodeIndex,
    ctx: &mut dyn BehaviorContext,
    vars: &mut Blackboard,
) -> NodeStatus {
    if tree.state[idx].status.is_terminal() {
        for event in tree.reset(idx) {
            ctx.cancel_event(event);
        }
    }

    let status = match tree.nodes[idx].kind.clone() {
        NodeKind::Sequence => tick_composite(tree, idx, ctx, vars, NodeStatus::Failed),
        NodeKind::Selector => tick_composite(tree, idx, ctx, vars, NodeStatus::Succeeded),
        NodeKind::Decorator(kind) => match tree.nodes[idx].children.first().copied() {
            Some(child) => kind.map(tick_node(tree, child, ctx, vars)),
            None => NodeStatus::Failed,
        },
        NodeKind::Action(action) => {
            if let Some(outcome) = take_delayed(tree, idx) {
                outcome
            } else {
                let node = &tree.nodes[idx];
                let prepared = node.prepared.as_ref();
                let mut call = LeafCall::new(ctx, &node.config, prepared, vars, idx, &node.id);
                let status = match action.run(&mut call) {
                    // Leaves report progress, never Ready
                    NodeStatus::Ready => NodeStatus::Running,
                    other => other,
                };
                let scheduled = call.scheduled();
                if status == NodeStatus::Running {
                    tree.state[idx].awaiting = scheduled;
                }
                status
            }
        }
        NodeKind::Condition(condition) => {
            let node = &tree.nodes[idx];
            let prepared = node.prepared.as_ref();
            let mut call = LeafCall::new(ctx, &node.config, prepared, vars, idx, &node.id);
            NodeStatus::from_bool(condition.check(&mut call))
        }
    };

    tree.state[idx].status = status;
    status
}

/// For a leaf waiting on a delayed outcome: the outcome if delivered,
/// otherwise `Running`. `None` when the leaf is not waiting.
fn take_delayed(tree: &mut BehaviorTree, idx: NodeIndex) -> Option<NodeStatus> {
    let state = &mut tree.state[idx];
    state.awaiting?;
    match state.delivered.take() {
        Some(outcome) => {
            state.awaiting = None;
            Some(outcome)
        }
        None => Some(NodeStatus::Running),
    }
}

/// Sequence (`stop_on = Failed`) and selector (`stop_on = Succeeded`)
fn tick_composite(
    tree: &mut BehaviorTree,
    idx: NodeIndex,
    ctx: &mut dyn BehaviorContext,
    vars: &mut Blackboard,
    stop_on: NodeStatus,
) -> NodeStatus {
    loop {
        let cursor = tree.state[idx].cursor;
        let Some(child) = tree.nodes[idx].children.get(cursor).copied() else {
            return match stop_on {
                NodeStatus::Failed => NodeStatus::Succeeded,
                _ => NodeStatus::Failed,
            };
        };
        match tick_node(tree, child, ctx, vars) {
            NodeStatus::Running => return NodeStatus::Running,
            status if status == stop_on => return status,
            _ => tree.state[idx].cursor += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::context::LocalContext;
    use crate::behavior::registry::CapabilitySet;
    use crate::behavior::types::NodeDef;
    use crate::events::SimEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn build(json: &str, set: &CapabilitySet) -> BehaviorTree {
        let def: NodeDef = serde_json::from_str(json).unwrap();
        BehaviorTree::build("test", &def, set).unwrap()
    }

    /// Set with `ok` / `fail` / `busy` actions that count invocations
    fn counting_set(counter: Arc<AtomicUsize>) -> CapabilitySet {
        let mut set = CapabilitySet::standard();
        let c = Arc::clone(&counter);
        set.register_action_fn("ok", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            NodeStatus::Succeeded
        });
        let c = Arc::clone(&counter);
        set.register_action_fn("fail", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            NodeStatus::Failed
        });
        set.register_action_fn("busy", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            NodeStatus::Running
        });
        set
    }

    #[test]
    fn test_selector_returns_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tree = build(
            r#"{"type":"selector","id":"root","children":[
                {"type":"action","id":"a","function":"fail"},
                {"type":"action","id":"b","function":"ok"},
                {"type":"action","id":"c","function":"fail"}]}"#,
            &counting_set(Arc::clone(&calls)),
        );
        let mut ctx = LocalContext::new("m");
        let status = tick_tree(&mut tree, &mut ctx, &mut Blackboard::new());
        assert_eq!(status, NodeStatus::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(tree.status(3), Some(NodeStatus::Ready));
    }

    #[test]
    fn test_selector_all_failed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tree = build(
            r#"{"type":"selector","id":"root","children":[
                {"type":"action","id":"a","function":"fail"},
                {"type":"action","id":"b","function":"fail"}]}"#,
            &counting_set(calls),
        );
        let mut ctx = LocalContext::new("m");
        assert_eq!(
            tick_tree(&mut tree, &mut ctx, &mut Blackboard::new()),
            NodeStatus::Failed
        );
    }

    #[test]
    fn test_running_child_resumes_without_reticking_earlier_children() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tree = build(
            r#"{"type":"sequence","id":"root","children":[
                {"type":"action","id":"a","function":"ok"},
                {"type":"action","id":"b","function":"busy"}]}"#,
            &counting_set(Arc::clone(&calls)),
        );
        let mut ctx = LocalContext::new("m");
        let mut vars = Blackboard::new();
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Running);
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Running);
        // a once, b twice
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(tree.status(1), Some(NodeStatus::Succeeded));
    }

    #[test]
    fn test_terminal_root_restarts_on_next_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tree = build(
            r#"{"type":"sequence","id":"root","children":[
                {"type":"action","id":"a","function":"ok"},
                {"type":"action","id":"b","function":"ok"}]}"#,
            &counting_set(Arc::clone(&calls)),
        );
        let mut ctx = LocalContext::new("m");
        let mut vars = Blackboard::new();
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Succeeded);
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_wait_schedules_resume_and_is_not_reinvoked() {
        let mut tree = build(
            r#"{"type":"action","id":"w","function":"wait","config":{"frames":5}}"#,
            &CapabilitySet::standard(),
        );
        let mut ctx = LocalContext::new("m");
        ctx.frame = 10;
        let mut vars = Blackboard::new();

        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Running);
        assert_eq!(ctx.queue.len(), 1);
        assert_eq!(ctx.queue.peek_frame(), Some(15));

        ctx.frame = 11;
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Running);
        assert_eq!(ctx.queue.len(), 1, "waiting leaf must not schedule again");

        let events = ctx.queue.drain(15).unwrap();
        let event = &events[0];
        let SimEvent::ResumeBehavior { node, outcome, .. } = event.payload else {
            panic!("unexpected payload {:?}", event.payload);
        };
        assert!(tree.deliver(node, event.id, outcome));
        ctx.frame = 15;
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Succeeded);
    }

    #[test]
    fn test_set_var_and_expr_condition() {
        let mut tree = build(
            r#"{"type":"sequence","id":"root","children":[
                {"type":"action","id":"s","function":"set_var","config":{"name":"rage","value":"atk / 2"}},
                {"type":"condition","id":"c","function":"expr","config":{"expr":"rage > 50"}}]}"#,
            &CapabilitySet::standard(),
        );
        let mut ctx = LocalContext::new("m");
        ctx.stats.insert("atk", 120.0);
        let mut vars = Blackboard::new();
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Succeeded);
        assert_eq!(vars.get("rage"), Some(60.0));
    }

    #[test]
    fn test_cast_skill_targets_nearest_enemy_next_frame() {
        let mut tree = build(
            r#"{"type":"sequence","id":"root","children":[
                {"type":"condition","id":"near","function":"has_target_in_range","config":{"range":12}},
                {"type":"action","id":"cast","function":"cast_skill","config":{"skill":"fireball"}}]}"#,
            &CapabilitySet::standard(),
        );
        let mut ctx = LocalContext::new("boss");
        ctx.frame = 3;
        ctx.enemy = Some(super::super::TargetInfo {
            id: "hero".to_string(),
            distance: 8.0,
        });
        let status = tick_tree(&mut tree, &mut ctx, &mut Blackboard::new());
        assert_eq!(status, NodeStatus::Succeeded);

        let events = ctx.queue.drain(4).unwrap();
        assert_eq!(
            events[0].payload,
            SimEvent::CastSkill {
                member: "boss".to_string(),
                skill: "fireball".to_string(),
                target: Some("hero".to_string()),
            }
        );
    }

    #[test]
    fn test_enemy_out_of_range_fails_sequence() {
        let mut tree = build(
            r#"{"type":"sequence","id":"root","children":[
                {"type":"condition","id":"near","function":"has_target_in_range","config":{"range":5}},
                {"type":"action","id":"cast","function":"cast_skill","config":{"skill":"fireball"}}]}"#,
            &CapabilitySet::standard(),
        );
        let mut ctx = LocalContext::new("boss");
        ctx.enemy = Some(super::super::TargetInfo {
            id: "hero".to_string(),
            distance: 8.0,
        });
        assert_eq!(
            tick_tree(&mut tree, &mut ctx, &mut Blackboard::new()),
            NodeStatus::Failed
        );
        assert!(ctx.queue.is_empty());
    }

    #[test]
    fn test_formula_leaves_parse_once() {
        let mut tree = build(
            r#"{"type":"sequence","id":"root","children":[
                {"type":"action","id":"s","function":"set_var","config":{"name":"rage","value":"atk / 2"}},
                {"type":"condition","id":"c","function":"expr","config":{"expr":"rage > 50"}}]}"#,
            &CapabilitySet::standard(),
        );
        let mut ctx = LocalContext::new("m");
        ctx.stats.insert("atk", 120.0);
        let mut vars = Blackboard::new();
        for _ in 0..5 {
            assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Succeeded);
        }
        assert_eq!(ctx.exprs.len(), 2);
        assert_eq!(ctx.exprs.parse_count(), 2);
    }

    #[test]
    fn test_reset_cancels_orphaned_outcome() {
        let mut tree = build(
            r#"{"type":"sequence","id":"root","children":[
                {"type":"action","id":"w","function":"wait","config":{"frames":5}}]}"#,
            &CapabilitySet::standard(),
        );
        let mut ctx = LocalContext::new("m");
        let mut vars = Blackboard::new();
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Running);
        let orphan = tree.state[1].awaiting.unwrap();

        // Root finished by other means while the leaf still waits
        tree.state[0].status = NodeStatus::Failed;
        assert_eq!(tick_tree(&mut tree, &mut ctx, &mut vars), NodeStatus::Running);
        assert!(!ctx.queue.contains(orphan));
        assert_eq!(ctx.queue.len(), 1);
        assert_ne!(tree.state[1].awaiting, Some(orphan));
    }
}
