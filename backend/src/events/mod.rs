//! Event / Frame Scheduler
//!
//! Orders pending work items by target frame and priority. The queue knows
//! nothing about what an event means; the engine loop interprets payloads
//! after draining them.
//!
//! # Architecture
//!
//! - **types**: `Priority`, `ScheduledEvent`, the engine's `SimEvent` payload
//! - **queue**: `EventQueue` (insert / cancel / drain)

pub mod queue;
pub mod types;

pub use queue::EventQueue;
pub use types::{EventPayload, Priority, ScheduledEvent, SimEvent};

use thiserror::Error;

/// Scheduler errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Event targets frame {execute_frame}, but the scheduler is at frame {current_frame}")]
    PastFrame {
        execute_frame: u64,
        current_frame: u64,
    },

    #[error("Frame {frame} was already drained")]
    FrameAlreadyDrained { frame: u64 },
}
