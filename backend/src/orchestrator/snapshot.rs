//! Frame snapshots and configuration hashing
//!
//! A snapshot mirrors the observable engine state at the end of a frame.
//! It is emitted as a `frame_snapshot` message and tagged with the hash of
//! the configuration that produced it.

use super::SimulationError;
use crate::behavior::NodeStatus;
use crate::models::Member;
use crate::skill::{EffectInstance, ResolvedShape, Vec2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Observable engine state at the end of a frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub frame_number: u64,
    /// SHA256 of the scenario configuration
    pub config_hash: String,
    pub members: Vec<MemberSnapshot>,
    pub effects: Vec<EffectInstance>,
    pub casts: Vec<CastSnapshot>,
    pub pending_events: usize,
    /// Generator state after this frame; equal seeds give equal states
    pub rng_state: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub id: String,
    pub team: String,
    pub position: Vec2,
    pub defeated: bool,
    pub behavior: NodeStatus,
    pub stats: BTreeMap<String, f64>,
}

impl From<&Member> for MemberSnapshot {
    fn from(member: &Member) -> Self {
        MemberSnapshot {
            id: member.id().to_string(),
            team: member.team().to_string(),
            position: member.position(),
            defeated: member.is_defeated(),
            behavior: member.agent().status(),
            stats: member.stats().snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastSnapshot {
    pub id: String,
    pub skill: String,
    pub caster: String,
    pub start_frame: u64,
    pub region: Option<ResolvedShape>,
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of a configuration
///
/// Object keys are sorted recursively before hashing so the result does
/// not depend on map iteration order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
