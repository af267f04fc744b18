//! Scenario configuration
//!
//! A scenario document is one JSON object:
//!
//! ```json
//! {
//!   "rng_seed": 7,
//!   "frames_per_second": 60,
//!   "archetypes": {
//!     "brute": {
//!       "attributes": [{"path": "hp.current", "base": 1000}, {"path": "str", "base": 10},
//!                      {"path": "atk", "base": 0}],
//!       "derived": [{"path": "atk", "formula": "str * 12"}]
//!     }
//!   },
//!   "members": [{"id": "boss", "team": "red", "position": {"x": 0, "y": 0},
//!                "archetype": "brute", "tree": "aggressive"}],
//!   "skills": [],
//!   "trees": []
//! }
//! ```

use super::SimulationError;
use crate::behavior::{NodeDef, TreeDocument};
use crate::pipeline::{PipelineDef, PipelineSpec};
use crate::skill::{validate_descriptor, SkillEffectDescriptor, Vec2};
use crate::stats::{AttributeSchema, StatGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn default_fps() -> u32 {
    60
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seed for every random roll (behavior `chance`, host rolls)
    pub rng_seed: u64,

    #[serde(default = "default_fps")]
    pub frames_per_second: u32,

    /// Emit a `frame_snapshot` message every N frames
    #[serde(default)]
    pub snapshot_interval: Option<u64>,

    #[serde(default)]
    pub archetypes: BTreeMap<String, ArchetypeDef>,

    pub members: Vec<MemberConfig>,

    #[serde(default)]
    pub skills: Vec<SkillEffectDescriptor>,

    /// Replaces the built-in `damage`, `damage_taken` and `skill_cost` pipelines when set
    #[serde(default)]
    pub pipelines: Option<Vec<PipelineSpec>>,

    #[serde(default)]
    pub trees: Vec<TreeDocument>,
}

/// Attribute schema plus derived formulas shared by members
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeDef {
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub derived: Vec<DerivedDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub path: String,
    #[serde(default)]
    pub base: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDef {
    pub path: String,
    pub formula: String,
}

/// One member of the scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub id: String,
    pub team: String,
    #[serde(default)]
    pub position: Vec2,
    pub archetype: String,
    /// Name of a document in `trees`
    #[serde(default)]
    pub tree: Option<String>,
    /// Base values replacing the archetype defaults
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

impl EngineConfig {
    /// Parse a scenario document
    ///
    /// # Errors
    /// `InvalidConfig` if the text is not a valid scenario.
    pub fn from_json(text: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(text)
            .map_err(|e| SimulationError::InvalidConfig(format!("scenario does not parse: {e}")))
    }

    /// Check the document as a whole
    ///
    /// Tree documents that fail to parse are not rejected here; the owning
    /// agent reports them when it loads.
    ///
    /// # Errors
    /// `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let invalid = |msg: String| Err(SimulationError::InvalidConfig(msg));

        if self.frames_per_second == 0 {
            return invalid("frames_per_second must be > 0".to_string());
        }
        if self.snapshot_interval == Some(0) {
            return invalid("snapshot_interval must be > 0".to_string());
        }

        let mut skill_ids = BTreeSet::new();
        for skill in &self.skills {
            if !skill_ids.insert(skill.id.as_str()) {
                return invalid(format!("skill defined twice: {}", skill.id));
            }
            validate_descriptor(skill).map_err(|e| SimulationError::InvalidConfig(e.to_string()))?;
        }

        let mut tree_names = BTreeSet::new();
        for doc in &self.trees {
            if !tree_names.insert(doc.name.as_str()) {
                return invalid(format!("tree defined twice: {}", doc.name));
            }
            if let Ok(root) = doc.parse() {
                for skill in referenced_skills(&root) {
                    if !skill_ids.contains(skill.as_str()) {
                        return invalid(format!(
                            "tree {} casts unknown skill {skill}",
                            doc.name
                        ));
                    }
                }
            }
        }

        let mut member_ids = BTreeSet::new();
        for member in &self.members {
            if !member_ids.insert(member.id.as_str()) {
                return invalid(format!("duplicate member id: {}", member.id));
            }
            if !self.archetypes.contains_key(&member.archetype) {
                return invalid(format!(
                    "member {} uses unknown archetype {}",
                    member.id, member.archetype
                ));
            }
            if let Some(tree) = &member.tree {
                if !tree_names.contains(tree.as_str()) {
                    return invalid(format!("member {} uses unknown tree {tree}", member.id));
                }
            }
        }

        Ok(())
    }

    /// Pipeline definitions the engine installs
    pub fn pipeline_defs(&self) -> Result<Vec<PipelineDef>, SimulationError> {
        let to_config_error = |e: crate::pipeline::PipelineError| {
            SimulationError::InvalidConfig(format!("pipeline: {e}"))
        };
        match &self.pipelines {
            Some(specs) => specs
                .iter()
                .map(|spec| PipelineDef::try_from(spec).map_err(to_config_error))
                .collect(),
            None => Ok(vec![
                PipelineDef::default_damage().map_err(to_config_error)?,
                PipelineDef::default_damage_taken().map_err(to_config_error)?,
                PipelineDef::default_skill_cost().map_err(to_config_error)?,
            ]),
        }
    }
}

/// Skills named by `cast_skill` leaves
fn referenced_skills(node: &NodeDef) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if let NodeDef::Action {
            function, config, ..
        } = node
        {
            if function == "cast_skill" {
                if let Some(skill) = config.get("skill").and_then(|s| s.as_str()) {
                    out.push(skill.to_string());
                }
            }
        }
        stack.extend(node.children());
    }
    out
}

impl ArchetypeDef {
    pub fn schema(&self) -> Result<AttributeSchema, SimulationError> {
        let mut schema = AttributeSchema::new();
        for attr in &self.attributes {
            schema
                .declare(&attr.path, attr.base)
                .map_err(|e| SimulationError::InvalidConfig(e.to_string()))?;
        }
        Ok(schema)
    }

    /// Stat graph for one member: defaults, then overrides, then formulas
    pub fn build_stats(
        &self,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<StatGraph, SimulationError> {
        let mut graph = StatGraph::new(&self.schema()?);
        for (path, value) in overrides {
            graph
                .set(path, *value)
                .map_err(|e| SimulationError::InvalidConfig(format!("override: {e}")))?;
        }
        for derived in &self.derived {
            graph
                .define_derived(&derived.path, &derived.formula)
                .map_err(|e| SimulationError::InvalidConfig(e.to_string()))?;
        }
        Ok(graph)
    }
}
