//! Tests for the engine/controller message contract

use battle_sim_core_rs::events::{Priority, SimEvent};
use battle_sim_core_rs::orchestrator::Engine;
use battle_sim_core_rs::transport::{
    spawn_engine, ControlCommand, Envelope, MessageKind, Outbox, TransportError,
};
use std::collections::BTreeMap;
use std::time::Duration;

const DUEL: &str = include_str!("../../scenarios/duel.json");

#[test]
fn test_envelope_wire_shape() {
    let envelope = Envelope::new(MessageKind::DomainEventBatch, serde_json::json!({"frameNumber": 4}))
        .with_task_id("task-7");
    let wire = serde_json::to_value(&envelope).unwrap();
    assert_eq!(wire["type"], "domain_event_batch");
    assert_eq!(wire["data"]["frameNumber"], 4);
    assert_eq!(wire["belongToTaskId"], "task-7");

    let untagged = serde_json::to_value(Envelope::new(MessageKind::RenderCmd, serde_json::Value::Null))
        .unwrap();
    assert!(untagged.get("belongToTaskId").is_none());
}

#[test]
fn test_promote_only_renames_domain_batches() {
    let batch = Envelope::new(MessageKind::DomainEventBatch, serde_json::Value::Null).promote();
    assert_eq!(batch.kind, MessageKind::ControllerDomainEventBatch);
    let telemetry = Envelope::new(MessageKind::EngineTelemetry, serde_json::Value::Null).promote();
    assert_eq!(telemetry.kind, MessageKind::EngineTelemetry);
}

#[test]
fn test_unencodable_payload_becomes_system_event() {
    let mut outbox = Outbox::new();
    outbox.set_task_id("t");
    assert!(outbox.push(MessageKind::EngineTelemetry, &1));

    let mut bad = BTreeMap::new();
    bad.insert(vec![1u8], "tuple keys have no JSON form");
    assert!(!outbox.push(MessageKind::DebugViewFrame, &bad));

    let messages = outbox.take();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].kind, MessageKind::SystemEvent);
    assert_eq!(messages[1].data["droppedType"], "debug_view_frame");
    assert_eq!(messages[1].task_id.as_deref(), Some("t"));
}

#[test]
fn test_worker_stream_is_tagged_and_promoted() {
    let mut engine = Engine::from_json(DUEL).unwrap();
    engine
        .schedule(
            0,
            Priority::Normal,
            SimEvent::CastSkill {
                member: "boss".to_string(),
                skill: "fireball".to_string(),
                target: Some("hero".to_string()),
            },
        )
        .unwrap();
    let handle = spawn_engine(engine).unwrap();
    let task_id = handle.task_id().to_string();
    assert_eq!(task_id.len(), 36);

    handle.send(ControlCommand::Step(2)).unwrap();
    let mut received = Vec::new();
    while received
        .iter()
        .filter(|e: &&Envelope| e.kind == MessageKind::EngineTelemetry)
        .count()
        < 2
    {
        received.push(handle.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    assert!(received.iter().all(|e| e.task_id.as_deref() == Some(task_id.as_str())));
    assert!(received
        .iter()
        .all(|e| e.kind != MessageKind::DomainEventBatch));

    // Frame 0: the batch precedes telemetry
    let batch = received
        .iter()
        .position(|e| e.kind == MessageKind::ControllerDomainEventBatch)
        .unwrap();
    let telemetry = received
        .iter()
        .position(|e| e.kind == MessageKind::EngineTelemetry)
        .unwrap();
    assert!(batch < telemetry);
    assert_eq!(received[batch].data["frameNumber"], 0);

    let engine = handle.shutdown().unwrap();
    assert_eq!(engine.current_frame(), 2);
}

#[test]
fn test_send_after_stop_reports_disconnect() {
    let handle = spawn_engine(Engine::from_json(DUEL).unwrap()).unwrap();
    handle.send(ControlCommand::Stop).unwrap();

    let stopped = handle.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(stopped.kind, MessageKind::EngineStateMachine);
    assert_eq!(stopped.data["to"], "stopped");

    assert_eq!(
        handle.recv_timeout(Duration::from_secs(5)),
        Err(TransportError::Disconnected)
    );
    assert_eq!(
        handle.send(ControlCommand::Start),
        Err(TransportError::Disconnected)
    );
}
