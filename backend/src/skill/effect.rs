//! Active casts and live effect instances
//!
//! Both are plain frame countdowns; the engine decides what a tick means.

use super::geometry::ResolvedShape;
use super::types::SkillEffectDescriptor;
use crate::core::ids::{CastId, EffectId};
use serde::Serialize;
use std::sync::Arc;

/// A cast that passed its checks
///
/// Lives until its region has expired and its last timeline entry fired.
#[derive(Debug, Clone)]
pub struct ActiveCast {
    pub id: CastId,
    pub skill: Arc<SkillEffectDescriptor>,
    pub caster: String,
    pub target: Option<String>,
    pub start_frame: u64,
    /// Most recently sampled region
    pub region: Option<ResolvedShape>,
}

impl ActiveCast {
    pub fn new(
        id: CastId,
        skill: Arc<SkillEffectDescriptor>,
        caster: impl Into<String>,
        target: Option<String>,
        start_frame: u64,
    ) -> Self {
        Self {
            id,
            skill,
            caster: caster.into(),
            target,
            start_frame,
            region: None,
        }
    }

    pub fn elapsed(&self, frame: u64) -> u64 {
        frame.saturating_sub(self.start_frame)
    }

    /// Whether the region is re-sampled at `frame`
    ///
    /// Frame 0 of the cast always samples; afterwards every
    /// `updateInterval` frames while the region is alive.
    pub fn should_sample(&self, frame: u64) -> bool {
        let scope = &self.skill.effect_scope;
        let elapsed = self.elapsed(frame);
        if elapsed >= scope.duration.max(1) {
            return false;
        }
        elapsed == 0 || elapsed % scope.update_interval.max(1) == 0
    }

    /// Region is expired and every timeline entry has fired
    pub fn is_finished(&self, frame: u64) -> bool {
        let elapsed = self.elapsed(frame);
        elapsed >= self.skill.effect_scope.duration.max(1).saturating_sub(1)
            && elapsed >= self.skill.timeline_span()
    }
}

/// Result of one countdown step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectTick {
    /// An `updateInterval` boundary was crossed this frame
    pub periodic: bool,
    /// `remaining_frames` reached zero
    pub expired: bool,
}

/// A live buff attached to one member
///
/// Owns the hooks and stat modifiers registered under its id; the engine
/// removes both when the instance expires or is cancelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectInstance {
    pub id: EffectId,
    pub source_skill_id: String,
    pub cast: CastId,
    /// Member carrying the effect
    pub owner: String,
    pub caster: String,
    /// Index into the source skill's timeline
    pub entry: usize,
    pub duration_frames: u64,
    pub remaining_frames: u64,
    pub update_interval_frames: u64,
    pub on_tick: Option<String>,
}

impl EffectInstance {
    /// Advance one frame
    ///
    /// An instance created with zero duration expires on its first tick.
    pub fn tick(&mut self) -> EffectTick {
        if self.remaining_frames == 0 {
            return EffectTick {
                periodic: false,
                expired: true,
            };
        }
        self.remaining_frames -= 1;
        let elapsed = self.duration_frames - self.remaining_frames;
        EffectTick {
            periodic: elapsed % self.update_interval_frames.max(1) == 0,
            expired: self.remaining_frames == 0,
        }
    }

    pub fn elapsed_frames(&self) -> u64 {
        self.duration_frames - self.remaining_frames
    }
}
