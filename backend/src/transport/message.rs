//! Message envelope and typed payloads

use crate::models::DomainEvent;
use serde::{Deserialize, Serialize};

/// Closed set of message types crossing the engine/controller boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    EngineStateMachine,
    EngineTelemetry,
    RenderCmd,
    DomainEventBatch,
    /// Host-side form of `DomainEventBatch`
    ControllerDomainEventBatch,
    SystemEvent,
    FrameSnapshot,
    DebugViewFrame,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::EngineStateMachine => "engine_state_machine",
            MessageKind::EngineTelemetry => "engine_telemetry",
            MessageKind::RenderCmd => "render_cmd",
            MessageKind::DomainEventBatch => "domain_event_batch",
            MessageKind::ControllerDomainEventBatch => "controller_domain_event_batch",
            MessageKind::SystemEvent => "system_event",
            MessageKind::FrameSnapshot => "frame_snapshot",
            MessageKind::DebugViewFrame => "debug_view_frame",
        }
    }
}

/// One message from the engine to its controller
///
/// # Example
/// ```
/// use battle_sim_core_rs::transport::{Envelope, MessageKind};
///
/// let env = Envelope::new(MessageKind::DomainEventBatch, serde_json::json!({"frameNumber": 3}))
///     .with_task_id("task-1");
/// let json = serde_json::to_value(&env).unwrap();
/// assert_eq!(json["type"], "domain_event_batch");
/// assert_eq!(json["belongToTaskId"], "task-1");
///
/// assert_eq!(env.promote().kind, MessageKind::ControllerDomainEventBatch);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub data: serde_json::Value,
    #[serde(
        rename = "belongToTaskId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub task_id: Option<String>,
}

impl Envelope {
    pub fn new(kind: MessageKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            task_id: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Controller-side rename of domain event batches; other kinds pass
    /// through unchanged
    pub fn promote(mut self) -> Self {
        if self.kind == MessageKind::DomainEventBatch {
            self.kind = MessageKind::ControllerDomainEventBatch;
        }
        self
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// `engine_telemetry` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryData {
    pub frame_number: u64,
    /// Wall-clock seconds since the engine was created
    pub run_time: f64,
    pub fps: u32,
    pub member_count: usize,
}

/// `domain_event_batch` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventBatch {
    pub frame_number: u64,
    pub events: Vec<DomainEvent>,
}

/// Lifecycle state reported in `engine_state_machine` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// `engine_state_machine` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub from: EngineState,
    pub to: EngineState,
    pub frame_number: u64,
}

/// `system_event` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNotice {
    pub level: String,
    pub message: String,
    /// Type of the message that could not be delivered, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_type: Option<MessageKind>,
}
