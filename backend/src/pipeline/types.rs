//! Pipeline, stage and hook definitions

use super::PipelineError;
use crate::core::ids::EffectId;
use crate::expr::{parse, EvalError, Expr, Scope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const DAMAGE_PIPELINE: &str = "damage";
pub const SKILL_COST_PIPELINE: &str = "skill_cost";
/// Run on the victim after the caster's `damage` pipeline
pub const DAMAGE_TAKEN_PIPELINE: &str = "damage_taken";

/// Native base compute: reads the running context (params chained behind)
pub type NativeStage = Arc<dyn Fn(&dyn Scope) -> f64 + Send + Sync>;

/// Native hook transform
pub type NativeHook = Arc<dyn Fn(&mut HookCall<'_>) -> f64 + Send + Sync>;

// ============================================================================
// STAGES
// ============================================================================

/// How a stage computes its value before hooks run
#[derive(Clone)]
pub enum StageCompute {
    Formula { source: String, expr: Arc<Expr> },
    Native(NativeStage),
}

impl fmt::Debug for StageCompute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageCompute::Formula { source, .. } => f.debug_tuple("Formula").field(source).finish(),
            StageCompute::Native(_) => f.write_str("Native(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageDef {
    pub name: String,
    pub compute: StageCompute,
}

/// A named, ordered list of stages
#[derive(Debug, Clone)]
pub struct PipelineDef {
    pub name: String,
    pub stages: Vec<StageDef>,
}

impl PipelineDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a formula stage
    pub fn formula_stage(mut self, name: &str, formula: &str) -> Result<Self, PipelineError> {
        let expr = parse(formula).map_err(|source| PipelineError::Formula {
            pipeline: self.name.clone(),
            stage: name.to_string(),
            source,
        })?;
        self.stages.push(StageDef {
            name: name.to_string(),
            compute: StageCompute::Formula {
                source: formula.to_string(),
                expr: Arc::new(expr),
            },
        });
        Ok(self)
    }

    /// Append a native stage
    pub fn native_stage(
        mut self,
        name: &str,
        compute: impl Fn(&dyn Scope) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.stages.push(StageDef {
            name: name.to_string(),
            compute: StageCompute::Native(Arc::new(compute)),
        });
        self
    }

    pub fn stage(&self, name: &str) -> Option<&StageDef> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// `damage`: raw -> scaled -> final (never negative)
    pub fn default_damage() -> Result<Self, PipelineError> {
        Self::new(DAMAGE_PIPELINE)
            .formula_stage("raw", "damage")?
            .formula_stage("scaled", "raw")?
            .formula_stage("final", "max(scaled, 0)")
    }

    /// `damage_taken`: taken (never negative)
    pub fn default_damage_taken() -> Result<Self, PipelineError> {
        Self::new(DAMAGE_TAKEN_PIPELINE).formula_stage("taken", "max(damage, 0)")
    }

    /// `skill_cost`: hp_cost, mp_cost (never negative)
    pub fn default_skill_cost() -> Result<Self, PipelineError> {
        Self::new(SKILL_COST_PIPELINE)
            .formula_stage("hp_cost", "max(hp_cost, 0)")?
            .formula_stage("mp_cost", "max(mp_cost, 0)")
    }
}

/// Serializable pipeline definition from a scenario document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub stages: Vec<StageSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub formula: String,
}

impl TryFrom<&PipelineSpec> for PipelineDef {
    type Error = PipelineError;

    fn try_from(spec: &PipelineSpec) -> Result<Self, Self::Error> {
        let mut def = PipelineDef::new(spec.name.clone());
        for stage in &spec.stages {
            if def.stage(&stage.name).is_some() {
                return Err(PipelineError::DuplicateStage {
                    pipeline: spec.name.clone(),
                    stage: stage.name.clone(),
                });
            }
            def = def.formula_stage(&stage.name, &stage.formula)?;
        }
        Ok(def)
    }
}

// ============================================================================
// HOOKS
// ============================================================================

/// Input handed to a native hook
pub struct HookCall<'a> {
    /// Result of the base compute or of the previous hook
    pub value: f64,
    /// Running pipeline context (params chained behind)
    pub ctx: &'a dyn Scope,
    pub owner: EffectId,
    detach_requested: bool,
}

impl<'a> HookCall<'a> {
    pub(crate) fn new(value: f64, ctx: &'a dyn Scope, owner: EffectId) -> Self {
        Self {
            value,
            ctx,
            owner,
            detach_requested: false,
        }
    }

    /// Ask for every hook of this hook's owner to be detached once the
    /// current stage finishes
    pub fn detach_owner(&mut self) {
        self.detach_requested = true;
    }

    pub(crate) fn detach_requested(&self) -> bool {
        self.detach_requested
    }
}

/// Transform a hook applies to the value flowing through a stage
#[derive(Clone)]
pub enum HookTransform {
    Add(f64),
    Multiply(f64),
    /// Discard the incoming value
    Replace(f64),
    /// Formula over the context with the incoming value bound to `value`
    Formula { source: String, expr: Arc<Expr> },
    Native(NativeHook),
}

impl fmt::Debug for HookTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookTransform::Add(v) => f.debug_tuple("Add").field(v).finish(),
            HookTransform::Multiply(v) => f.debug_tuple("Multiply").field(v).finish(),
            HookTransform::Replace(v) => f.debug_tuple("Replace").field(v).finish(),
            HookTransform::Formula { source, .. } => {
                f.debug_tuple("Formula").field(source).finish()
            }
            HookTransform::Native(_) => f.write_str("Native(..)"),
        }
    }
}

impl HookTransform {
    pub fn formula(source: &str) -> Result<Self, EvalError> {
        Ok(HookTransform::Formula {
            source: source.to_string(),
            expr: Arc::new(parse(source)?),
        })
    }

    pub fn native(f: impl Fn(&mut HookCall<'_>) -> f64 + Send + Sync + 'static) -> Self {
        HookTransform::Native(Arc::new(f))
    }
}

/// Serializable hook transform, as authored in buff timeline entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    Add { value: f64 },
    Multiply { value: f64 },
    Replace { value: f64 },
    Formula { expr: String },
}

impl TryFrom<&TransformSpec> for HookTransform {
    type Error = EvalError;

    fn try_from(spec: &TransformSpec) -> Result<Self, Self::Error> {
        Ok(match spec {
            TransformSpec::Add { value } => HookTransform::Add(*value),
            TransformSpec::Multiply { value } => HookTransform::Multiply(*value),
            TransformSpec::Replace { value } => HookTransform::Replace(*value),
            TransformSpec::Formula { expr } => HookTransform::formula(expr)?,
        })
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    /// Input context with every stage output merged in
    pub ctx: BTreeMap<String, f64>,
    /// Stage outputs in declared order
    pub stage_outputs: Vec<(String, f64)>,
}

impl PipelineOutput {
    pub fn stage(&self, name: &str) -> Option<f64> {
        self.stage_outputs
            .iter()
            .find(|(stage, _)| stage == name)
            .map(|(_, value)| *value)
    }

    /// Output of the last stage
    pub fn final_value(&self) -> Option<f64> {
        self.stage_outputs.last().map(|(_, value)| *value)
    }
}
