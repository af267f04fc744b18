//! Battle Simulator Core - Rust Engine
//!
//! Frame-stepped battle simulation with deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Frame clock and identifiers
//! - **events**: Frame/priority event scheduler
//! - **expr**: Formula language shared by stats, pipelines and skills
//! - **stats**: Reactive attribute graph with lazy recomputation
//! - **pipeline**: Staged computations with effect-owned hooks
//! - **behavior**: Behavior-tree interpreter and capability registry
//! - **skill**: Skill descriptors, cast checks, spatial resolution
//! - **models**: Members and domain events
//! - **orchestrator**: The frame loop
//! - **transport**: Message envelopes and the engine worker thread
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Time is measured in whole frames; durations are frame countdowns
//! 2. All randomness is deterministic (seeded RNG)
//! 3. A frame step never fails; errors surface as events or log lines
//! 4. A member's stat graph is only mutated by its own agent and effects

// Module declarations
pub mod behavior;
pub mod core;
pub mod events;
pub mod expr;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod rng;
pub mod skill;
pub mod stats;
pub mod transport;

// Re-exports for convenience
pub use behavior::{Agent, BehaviorContext, CapabilityRegistry, NodeStatus, TreeDocument};
pub use crate::core::time::FrameClock;
pub use events::{EventQueue, Priority, SchedulerError, SimEvent};
pub use models::{DomainEvent, EventLog, Member};
pub use orchestrator::{Engine, EngineConfig, FrameResult, SimulationError};
pub use pipeline::{PipelineError, PipelineManager};
pub use rng::RngManager;
pub use skill::{SkillEffectDescriptor, SkillError};
pub use stats::{StatError, StatGraph};
pub use transport::{spawn_engine, ControlCommand, EngineHandle, Envelope, MessageKind};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn battle_sim_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::engine::PyEngine>()?;
    Ok(())
}
