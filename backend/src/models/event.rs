//! Domain events for replay and the host controller.
//!
//! Every significant state change inside a frame is recorded as a
//! [`DomainEvent`]. The engine flushes the events of each frame as one
//! `domain_event_batch` message, in the order they were logged.
//!
//! # Event Types
//!
//! - **Cast**: a skill cast started or was rejected
//! - **Damage**: hp removed from a member by a damage entry
//! - **Effect**: buff instances applied, ticked, expired or cancelled
//! - **Behavior**: an agent's root status changed, or a tree failed to load
//! - **Member**: a member was defeated
//!
//! # Example
//!
//! ```rust
//! use battle_sim_core_rs::models::{DomainEvent, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(DomainEvent::MemberDefeated {
//!     frame: 42,
//!     member: "hero".to_string(),
//! });
//!
//! assert_eq!(log.events_at_frame(42).len(), 1);
//! assert_eq!(log.events()[0].event_type(), "member_defeated");
//! ```

use crate::behavior::NodeStatus;
use crate::core::ids::{CastId, EffectId};
use crate::skill::CastRejection;
use serde::{Deserialize, Serialize};

/// Simulation event capturing a state change.
///
/// All events include the frame they occurred in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A cast passed its checks and paid its costs
    CastStarted {
        frame: u64,
        cast: CastId,
        caster: String,
        skill: String,
        target: Option<String>,
        hp_cost: f64,
        mp_cost: f64,
    },

    /// A cast did not go ahead
    CastRejected {
        frame: u64,
        caster: String,
        skill: String,
        reason: CastRejection,
    },

    /// A damage entry hit a member
    Damage {
        frame: u64,
        cast: CastId,
        skill: String,
        source: String,
        target: String,
        amount: f64,
        hp_after: f64,
    },

    /// A buff instance was attached to a member
    EffectApplied {
        frame: u64,
        effect: EffectId,
        skill: String,
        owner: String,
        duration: u64,
        hooks: usize,
    },

    /// A buff's periodic `onTick` changed hp
    EffectTick {
        frame: u64,
        effect: EffectId,
        owner: String,
        delta: f64,
        hp_after: f64,
    },

    /// A buff ran out or was cancelled; its hooks and modifiers are gone
    EffectRemoved {
        frame: u64,
        effect: EffectId,
        owner: String,
        cancelled: bool,
    },

    /// An agent's root node changed state
    BehaviorStatus {
        frame: u64,
        member: String,
        previous: NodeStatus,
        status: NodeStatus,
    },

    /// A tree document failed to load; the agent ticks as Failed
    TreeLoadFailed {
        frame: u64,
        member: String,
        tree: String,
        error: String,
    },

    /// A member's hp reached zero
    MemberDefeated { frame: u64, member: String },

    /// Host-defined event drained from the queue
    Custom {
        frame: u64,
        tag: String,
        data: serde_json::Value,
    },
}

impl DomainEvent {
    /// Frame in which this event occurred
    pub fn frame(&self) -> u64 {
        match self {
            DomainEvent::CastStarted { frame, .. }
            | DomainEvent::CastRejected { frame, .. }
            | DomainEvent::Damage { frame, .. }
            | DomainEvent::EffectApplied { frame, .. }
            | DomainEvent::EffectTick { frame, .. }
            | DomainEvent::EffectRemoved { frame, .. }
            | DomainEvent::BehaviorStatus { frame, .. }
            | DomainEvent::TreeLoadFailed { frame, .. }
            | DomainEvent::MemberDefeated { frame, .. }
            | DomainEvent::Custom { frame, .. } => *frame,
        }
    }

    /// Wire name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::CastStarted { .. } => "cast_started",
            DomainEvent::CastRejected { .. } => "cast_rejected",
            DomainEvent::Damage { .. } => "damage",
            DomainEvent::EffectApplied { .. } => "effect_applied",
            DomainEvent::EffectTick { .. } => "effect_tick",
            DomainEvent::EffectRemoved { .. } => "effect_removed",
            DomainEvent::BehaviorStatus { .. } => "behavior_status",
            DomainEvent::TreeLoadFailed { .. } => "tree_load_failed",
            DomainEvent::MemberDefeated { .. } => "member_defeated",
            DomainEvent::Custom { .. } => "custom",
        }
    }

    /// Member the event is primarily about, if any
    ///
    /// Damage is attributed to the member that was hit.
    pub fn member_id(&self) -> Option<&str> {
        match self {
            DomainEvent::CastStarted { caster, .. } | DomainEvent::CastRejected { caster, .. } => {
                Some(caster)
            }
            DomainEvent::Damage { target, .. } => Some(target),
            DomainEvent::EffectApplied { owner, .. }
            | DomainEvent::EffectTick { owner, .. }
            | DomainEvent::EffectRemoved { owner, .. } => Some(owner),
            DomainEvent::BehaviorStatus { member, .. }
            | DomainEvent::TreeLoadFailed { member, .. }
            | DomainEvent::MemberDefeated { member, .. } => Some(member),
            DomainEvent::Custom { .. } => None,
        }
    }
}

/// Append-only record of every domain event of a run.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<DomainEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[DomainEvent] {
        &self.events
    }

    /// Events logged at or after position `index`
    pub fn since(&self, index: usize) -> &[DomainEvent] {
        self.events.get(index..).unwrap_or(&[])
    }

    pub fn events_at_frame(&self, frame: u64) -> Vec<&DomainEvent> {
        self.events.iter().filter(|e| e.frame() == frame).collect()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&DomainEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_member(&self, member_id: &str) -> Vec<&DomainEvent> {
        self.events
            .iter()
            .filter(|e| e.member_id() == Some(member_id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
