//! Pipeline Manager
//!
//! Named, ordered computations (damage, skill cost) whose stages active
//! effects can reshape by attaching hooks.
//!
//! # Architecture
//!
//! - **types**: Stage and hook definitions, serializable specs, run output
//! - **manager**: `PipelineManager` (register / attach / detach / run)
//!
//! # Stage Semantics
//!
//! For each stage in declared order:
//! 1. The base compute runs against the running context plus run params
//! 2. Hooks attached to the stage fold over that result in attachment order
//! 3. The folded value becomes the stage output and is written into the
//!    context under the stage name, visible to later stages
//!
//! Hooks are snapshotted when a stage starts, so a hook that asks to detach
//! its owner only affects later stages and later runs.
//!
//! # Example
//!
//! ```rust
//! use battle_sim_core_rs::core::ids::EffectId;
//! use battle_sim_core_rs::pipeline::{HookTransform, PipelineManager};
//! use std::collections::BTreeMap;
//!
//! let mut pipelines = PipelineManager::with_defaults();
//! let ctx = BTreeMap::from([("damage".to_string(), 170.0)]);
//!
//! let out = pipelines.run("damage", ctx.clone(), None).unwrap();
//! assert_eq!(out.final_value(), Some(170.0));
//!
//! pipelines
//!     .attach_hook(EffectId(1), "damage", "scaled", HookTransform::Multiply(2.0))
//!     .unwrap();
//! let out = pipelines.run("damage", ctx, None).unwrap();
//! assert_eq!(out.final_value(), Some(340.0));
//! ```

pub mod manager;
pub mod types;

pub use manager::{Hook, PipelineManager};
pub use types::{
    HookCall, HookTransform, NativeHook, NativeStage, PipelineDef, PipelineOutput, PipelineSpec,
    StageCompute, StageDef, StageSpec, TransformSpec, DAMAGE_PIPELINE, DAMAGE_TAKEN_PIPELINE,
    SKILL_COST_PIPELINE,
};

use crate::expr::EvalError;
use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    #[error("Pipeline {pipeline} has no stage {stage}")]
    UnknownStage { pipeline: String, stage: String },

    #[error("Pipeline registered twice: {0}")]
    DuplicatePipeline(String),

    #[error("Pipeline {pipeline} declares stage {stage} twice")]
    DuplicateStage { pipeline: String, stage: String },

    #[error("Stage {pipeline}.{stage} formula failed to parse: {source}")]
    Formula {
        pipeline: String,
        stage: String,
        source: EvalError,
    },
}
