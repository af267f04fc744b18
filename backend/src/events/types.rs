//! Scheduled event types
//!
//! # Design Principles
//!
//! 1. **Total order**: `(execute_frame, priority rank, insertion sequence)`
//! 2. **One-shot**: an event fires once; recurring work re-inserts itself
//! 3. **Self-contained**: payloads carry everything their handler needs

use crate::behavior::NodeStatus;
use crate::core::ids::{CastId, EventId};
use serde::{Deserialize, Serialize};

/// Tie-break rank for events sharing a frame (lower rank drains first)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Short name of a payload variant, used in logs and domain events
pub trait EventPayload {
    fn kind(&self) -> &'static str;
}

/// An event waiting in (or drained from) the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent<P = SimEvent> {
    pub id: EventId,
    pub execute_frame: u64,
    pub priority: Priority,
    pub payload: P,
}

impl<P: EventPayload> ScheduledEvent<P> {
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// Work items the simulation engine schedules for itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    /// Deliver a delayed leaf outcome to a member's behavior tree
    ResumeBehavior {
        member: String,
        node: usize,
        outcome: NodeStatus,
    },

    /// Attempt a skill cast on behalf of a member
    CastSkill {
        member: String,
        skill: String,
        target: Option<String>,
    },

    /// Fire one timeline entry of an active cast
    SkillTimeline { cast: CastId, entry: usize },

    /// Host-defined marker; surfaced as a domain event when drained
    Custom {
        tag: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl EventPayload for SimEvent {
    fn kind(&self) -> &'static str {
        match self {
            SimEvent::ResumeBehavior { .. } => "resume_behavior",
            SimEvent::CastSkill { .. } => "cast_skill",
            SimEvent::SkillTimeline { .. } => "skill_timeline",
            SimEvent::Custom { .. } => "custom",
        }
    }
}
