//! Pipeline registry, hook attachment and execution

use super::types::{HookCall, HookTransform, PipelineDef, PipelineOutput, StageCompute};
use super::PipelineError;
use crate::core::ids::{EffectId, HookId};
use crate::expr::{evaluate_expr, ChainScope, EmptyScope, MapScope, Scope};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A transform attached to one stage on behalf of an effect
#[derive(Debug, Clone)]
pub struct Hook {
    pub id: HookId,
    pub owner: EffectId,
    pub transform: HookTransform,
}

/// Pipelines available to one member, plus the hooks its effects attached
///
/// Definitions are shared (`Arc`) between managers; hooks are not.
#[derive(Debug, Clone, Default)]
pub struct PipelineManager {
    pipelines: BTreeMap<String, Arc<PipelineDef>>,
    /// (pipeline, stage) -> hooks in attachment order
    hooks: BTreeMap<(String, String), Vec<Hook>>,
    next_hook: u64,
}

impl PipelineManager {
    /// Empty manager with no pipelines
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the built-in `damage`, `damage_taken` and `skill_cost`
    /// pipelines
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        for def in [
            PipelineDef::default_damage(),
            PipelineDef::default_damage_taken(),
            PipelineDef::default_skill_cost(),
        ] {
            match def {
                Ok(def) => {
                    manager.pipelines.insert(def.name.clone(), Arc::new(def));
                }
                Err(e) => tracing::error!(error = %e, "built-in pipeline failed to build"),
            }
        }
        manager
    }

    /// Manager sharing the given definitions
    pub fn from_shared(defs: &BTreeMap<String, Arc<PipelineDef>>) -> Self {
        Self {
            pipelines: defs.clone(),
            ..Self::default()
        }
    }

    pub fn register(&mut self, def: PipelineDef) -> Result<(), PipelineError> {
        if self.pipelines.contains_key(&def.name) {
            return Err(PipelineError::DuplicatePipeline(def.name));
        }
        self.pipelines.insert(def.name.clone(), Arc::new(def));
        Ok(())
    }

    /// Register or overwrite a pipeline definition
    pub fn replace(&mut self, def: PipelineDef) {
        self.pipelines.insert(def.name.clone(), Arc::new(def));
    }

    pub fn contains(&self, pipeline: &str) -> bool {
        self.pipelines.contains_key(pipeline)
    }

    pub fn definitions(&self) -> &BTreeMap<String, Arc<PipelineDef>> {
        &self.pipelines
    }

    /// Attach `transform` to `pipeline.stage` on behalf of `owner`
    ///
    /// # Errors
    /// `UnknownPipeline` / `UnknownStage` if the target does not exist.
    /// Callers treat this as non-fatal: the effect proceeds without the hook.
    pub fn attach_hook(
        &mut self,
        owner: EffectId,
        pipeline: &str,
        stage: &str,
        transform: HookTransform,
    ) -> Result<HookId, PipelineError> {
        let def = self
            .pipelines
            .get(pipeline)
            .ok_or_else(|| PipelineError::UnknownPipeline(pipeline.to_string()))?;
        if def.stage(stage).is_none() {
            return Err(PipelineError::UnknownStage {
                pipeline: pipeline.to_string(),
                stage: stage.to_string(),
            });
        }

        let id = HookId(self.next_hook);
        self.next_hook += 1;
        self.hooks
            .entry((pipeline.to_string(), stage.to_string()))
            .or_default()
            .push(Hook {
                id,
                owner,
                transform,
            });
        tracing::debug!(%owner, %id, pipeline, stage, "hook attached");
        Ok(id)
    }

    /// Remove every hook owned by `owner`; returns how many were removed
    ///
    /// Idempotent: a second call removes nothing.
    pub fn detach_hooks_of(&mut self, owner: EffectId) -> usize {
        let mut removed = 0;
        for hooks in self.hooks.values_mut() {
            let before = hooks.len();
            hooks.retain(|h| h.owner != owner);
            removed += before - hooks.len();
        }
        self.hooks.retain(|_, hooks| !hooks.is_empty());
        if removed > 0 {
            tracing::debug!(%owner, removed, "hooks detached");
        }
        removed
    }

    /// Remove a single hook by id
    pub fn detach_hook(&mut self, id: HookId) -> bool {
        let mut found = false;
        for hooks in self.hooks.values_mut() {
            let before = hooks.len();
            hooks.retain(|h| h.id != id);
            found |= hooks.len() != before;
        }
        self.hooks.retain(|_, hooks| !hooks.is_empty());
        found
    }

    /// Hooks currently attached to a stage, in attachment order
    pub fn hooks_on(&self, pipeline: &str, stage: &str) -> &[Hook] {
        self.hooks
            .get(&(pipeline.to_string(), stage.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    /// Run a pipeline over `ctx`
    ///
    /// `params` are visible to every stage behind the context (a context key
    /// shadows a param of the same name). A stage formula that fails to
    /// evaluate yields 0 and the run continues.
    ///
    /// # Errors
    /// `UnknownPipeline` if no pipeline is registered under `name`.
    pub fn run(
        &mut self,
        name: &str,
        ctx: BTreeMap<String, f64>,
        params: Option<&dyn Scope>,
    ) -> Result<PipelineOutput, PipelineError> {
        let def = self
            .pipelines
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownPipeline(name.to_string()))?;
        let params: &dyn Scope = params.unwrap_or(&EmptyScope);

        let mut ctx = ctx;
        let mut stage_outputs = Vec::with_capacity(def.stages.len());

        for stage in &def.stages {
            // Snapshot: detaching during the fold must not affect this stage
            let hooks: Vec<Hook> = self.hooks_on(name, &stage.name).to_vec();
            let mut detach = BTreeSet::new();

            let value = {
                let scope = ChainScope::new(&ctx, params);
                let base = match &stage.compute {
                    StageCompute::Formula { source, expr } => {
                        evaluate_expr(expr, &scope).unwrap_or_else(|e| {
                            tracing::warn!(
                                pipeline = name,
                                stage = %stage.name,
                                formula = %source,
                                error = %e,
                                "stage formula failed, using 0"
                            );
                            0.0
                        })
                    }
                    StageCompute::Native(compute) => compute(&scope),
                };

                hooks.iter().fold(base, |value, hook| {
                    apply_hook(hook, value, &scope, &mut detach, name, &stage.name)
                })
            };

            for owner in detach {
                self.detach_hooks_of(owner);
            }
            ctx.insert(stage.name.clone(), value);
            stage_outputs.push((stage.name.clone(), value));
        }

        Ok(PipelineOutput { ctx, stage_outputs })
    }
}

fn apply_hook(
    hook: &Hook,
    value: f64,
    scope: &dyn Scope,
    detach: &mut BTreeSet<EffectId>,
    pipeline: &str,
    stage: &str,
) -> f64 {
    match &hook.transform {
        HookTransform::Add(delta) => value + delta,
        HookTransform::Multiply(factor) => value * factor,
        HookTransform::Replace(replacement) => *replacement,
        HookTransform::Formula { source, expr } => {
            let bound = MapScope::new().with("value", value);
            let chained = ChainScope::new(&bound, scope);
            evaluate_expr(expr, &chained).unwrap_or_else(|e| {
                tracing::warn!(
                    pipeline,
                    stage,
                    hook = %hook.id,
                    formula = %source,
                    error = %e,
                    "hook formula failed, passing value through"
                );
                value
            })
        }
        HookTransform::Native(f) => {
            let mut call = HookCall::new(value, scope, hook.owner);
            let out = f(&mut call);
            if call.detach_requested() {
                detach.insert(hook.owner);
            }
            out
        }
    }
}
