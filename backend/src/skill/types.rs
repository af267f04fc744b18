//! Skill effect descriptor types
//!
//! Descriptors are authored JSON, immutable once loaded. All numeric
//! parameters are expression strings evaluated against the cast scope;
//! frame counts are plain integers.
//!
//! ```json
//! {
//!   "id": "fireball",
//!   "condition": "mp.current >= 100",
//!   "mpCost": "100",
//!   "castingRange": "12",
//!   "timeline": [ { "type": "damage", "frame": 0, "damage": "atk + 50" } ],
//!   "effectScope": {
//!     "type": "static", "duration": 1, "updateInterval": 1,
//!     "shape": { "type": "circle", "radius": "3", "center": { "type": "target" } }
//!   }
//! }
//! ```

use crate::pipeline::TransformSpec;
use crate::stats::ModifierKind;
use serde::{Deserialize, Serialize};

fn always() -> String {
    "1".to_string()
}

fn zero() -> String {
    "0".to_string()
}

fn one() -> u64 {
    1
}

/// Authored skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEffectDescriptor {
    pub id: String,
    /// Must evaluate true for the cast to proceed
    #[serde(default = "always")]
    pub condition: String,
    #[serde(default = "zero")]
    pub hp_cost: String,
    #[serde(default = "zero")]
    pub mp_cost: String,
    /// Maximum caster-target distance; no limit when absent
    #[serde(default)]
    pub casting_range: Option<String>,
    /// Rejects the cast when it evaluates true
    #[serde(default)]
    pub disable_condition: Option<String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    pub effect_scope: EffectScope,
}

impl SkillEffectDescriptor {
    /// Frames until the last timeline entry fires
    pub fn timeline_span(&self) -> u64 {
        self.timeline.iter().map(TimelineEntry::frame).max().unwrap_or(0)
    }
}

/// Whether the region is resolved once or re-sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Resolved once when the cast starts
    Static,
    /// Re-resolved every `updateInterval` frames
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectScope {
    #[serde(rename = "type")]
    pub kind: ScopeKind,
    /// Region lifetime in frames
    pub duration: u64,
    #[serde(default = "one")]
    pub update_interval: u64,
    pub shape: ShapeDef,
}

// ============================================================================
// SHAPES
// ============================================================================

/// Position source evaluated per sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpatialRef {
    #[default]
    Caster,
    /// Falls back to the caster when the cast has no target
    Target,
    Point {
        x: String,
        y: String,
    },
}

/// Shape parameters (expressions); angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    Circle {
        radius: String,
    },
    /// Cone of total spread `angle` around `direction`; without a direction
    /// it faces from the caster toward the target
    Sector {
        radius: String,
        angle: String,
        #[serde(default)]
        direction: Option<String>,
    },
    /// `length` along `rotation` (degrees), `width` across; centered
    Rectangle {
        width: String,
        length: String,
        #[serde(default)]
        rotation: Option<String>,
    },
    Annulus {
        #[serde(rename = "innerRadius")]
        inner_radius: String,
        #[serde(rename = "outerRadius")]
        outer_radius: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeDef {
    #[serde(flatten)]
    pub kind: ShapeKind,
    #[serde(default)]
    pub center: SpatialRef,
    #[serde(default)]
    pub operations: Vec<ShapeOperation>,
}

/// Post-processing applied to a shape in declared order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeOperation {
    /// Moves the shape's center over time
    Motion { motion: MotionDef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionDef {
    /// Interpolate from `from` to `to`
    ///
    /// Duration (frames) is explicit, or distance / `speed` (units per
    /// frame) rounded up.
    Linear {
        from: SpatialRef,
        to: SpatialRef,
        #[serde(default)]
        duration: Option<String>,
        #[serde(default)]
        speed: Option<String>,
    },
    /// Center tracks the reference on every sample
    Follow { reference: SpatialRef },
}

// ============================================================================
// TIMELINE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    Buff(BuffEntry),
    Damage(DamageEntry),
}

impl TimelineEntry {
    /// Frame offset from the cast start
    pub fn frame(&self) -> u64 {
        match self {
            TimelineEntry::Buff(b) => b.frame,
            TimelineEntry::Damage(d) => d.frame,
        }
    }
}

/// Who receives a buff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffTarget {
    #[default]
    #[serde(rename = "self")]
    Caster,
    /// Every member inside the cast region
    Region,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffEntry {
    #[serde(default)]
    pub frame: u64,
    /// Effect lifetime in frames
    pub duration: u64,
    #[serde(default = "one")]
    pub update_interval: u64,
    #[serde(default)]
    pub target: BuffTarget,
    #[serde(default)]
    pub hooks: Vec<HookDef>,
    #[serde(default)]
    pub modifiers: Vec<ModifierDef>,
    /// hp delta applied every `updateInterval` frames (negative = damage)
    #[serde(default)]
    pub on_tick: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookDef {
    pub pipeline: String,
    pub stage: String,
    pub transform: TransformSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierDef {
    pub path: String,
    pub kind: ModifierKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageEntry {
    #[serde(default)]
    pub frame: u64,
    pub damage: String,
}

/// Why a cast did not go ahead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CastRejection {
    UnknownSkill,
    Disabled,
    ConditionFailed,
    OutOfRange { distance: f64, range: f64 },
    MissingTarget,
    InsufficientHp { cost: f64, available: f64 },
    InsufficientMp { cost: f64, available: f64 },
}
