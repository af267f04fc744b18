//! Orchestrator - Simulation Engine Loop
//!
//! Advances simulated time one frame at a time over every member.
//!
//! - **config**: Scenario document (`EngineConfig`) and validation
//! - **engine**: The frame loop
//! - **snapshot**: Frame snapshots and configuration hashing

pub mod config;
pub mod engine;
pub mod snapshot;

pub use config::{ArchetypeDef, AttributeDef, DerivedDef, EngineConfig, MemberConfig};
pub use engine::{Engine, FrameResult};
pub use snapshot::{compute_config_hash, CastSnapshot, FrameSnapshot, MemberSnapshot};

use crate::behavior::TreeLoadError;
use thiserror::Error;

/// Configuration-level failures
///
/// Nothing inside a frame step raises these; `Engine::step` always
/// completes its frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("Tree for member {member} failed to load: {source}")]
    TreeLoad {
        member: String,
        source: TreeLoadError,
    },
}
