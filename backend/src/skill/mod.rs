//! Skill Effect / Spatial Resolver
//!
//! Turns authored skill descriptors into concrete consequences over time
//! and space.
//!
//! # Architecture
//!
//! - **types**: Skill effect descriptor as authored (serde, camelCase)
//! - **geometry**: `Vec2` and resolved shapes with pure containment tests
//! - **resolver**: Cast scope, cast checks, shape resolution with motion
//! - **effect**: Active casts and live effect instances (frame countdowns)
//!
//! # Casting
//!
//! A cast is checked in order: `disableCondition` (true rejects),
//! `condition` (false rejects), casting range, then hp/mp costs. An accepted
//! cast samples its region every `updateInterval` frames for `duration`
//! frames and fires timeline entries at their frame offsets. `damage`
//! entries evaluate their expression once and hit hostile members inside
//! the region; `buff` entries create effect instances owning hooks and
//! stat modifiers.

pub mod effect;
pub mod geometry;
pub mod resolver;
pub mod types;

pub use effect::{ActiveCast, EffectInstance, EffectTick};
pub use geometry::{ResolvedShape, Vec2};
pub use resolver::{check_cast, resolve_shape, validate_descriptor, CastScope};
pub use types::{
    BuffEntry, BuffTarget, CastRejection, DamageEntry, EffectScope, HookDef, ModifierDef,
    MotionDef, ScopeKind, ShapeDef, ShapeKind, ShapeOperation, SkillEffectDescriptor, SpatialRef,
    TimelineEntry,
};

use crate::expr::EvalError;
use thiserror::Error;

/// Skill descriptor errors (raised when a scenario is loaded)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SkillError {
    #[error("Skill {skill}: expression `{field}` is invalid: {source}")]
    InvalidExpression {
        skill: String,
        field: String,
        source: EvalError,
    },

    #[error("Skill {skill}: {message}")]
    InvalidDescriptor { skill: String, message: String },

    #[error("Skill defined twice: {0}")]
    DuplicateSkill(String),

    #[error("Unknown skill: {0}")]
    UnknownSkill(String),
}
