//! Tests for pipelines and effect-owned hooks

use battle_sim_core_rs::core::ids::EffectId;
use battle_sim_core_rs::expr::{MapScope, Scope};
use battle_sim_core_rs::pipeline::{
    HookTransform, PipelineDef, PipelineError, PipelineManager, DAMAGE_PIPELINE,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn damage_ctx(raw: f64) -> BTreeMap<String, f64> {
    BTreeMap::from([("damage".to_string(), raw)])
}

/// raw -> mitigated (by target.def) -> final
fn armored_damage() -> PipelineDef {
    PipelineDef::new(DAMAGE_PIPELINE)
        .formula_stage("raw", "damage")
        .and_then(|d| d.formula_stage("mitigated", "raw - target.def"))
        .and_then(|d| d.formula_stage("final", "max(mitigated, 1)"))
        .unwrap()
}

#[test]
fn test_members_share_definitions_not_hooks() {
    let shared = BTreeMap::from([(DAMAGE_PIPELINE.to_string(), Arc::new(armored_damage()))]);
    let mut caster = PipelineManager::from_shared(&shared);
    let mut other = PipelineManager::from_shared(&shared);

    caster
        .attach_hook(EffectId(1), DAMAGE_PIPELINE, "raw", HookTransform::Add(30.0))
        .unwrap();

    let params = MapScope::new().with("target.def", 20.0);
    let buffed = caster.run(DAMAGE_PIPELINE, damage_ctx(100.0), Some(&params)).unwrap();
    let plain = other.run(DAMAGE_PIPELINE, damage_ctx(100.0), Some(&params)).unwrap();

    assert_eq!(buffed.final_value(), Some(110.0));
    assert_eq!(plain.final_value(), Some(80.0));
    assert_eq!(other.hook_count(), 0);
}

#[test]
fn test_context_shadows_params() {
    let mut pipelines = PipelineManager::new();
    pipelines.register(armored_damage()).unwrap();
    let params = MapScope::new().with("target.def", 5.0).with("damage", 999.0);

    let out = pipelines
        .run(DAMAGE_PIPELINE, damage_ctx(50.0), Some(&params))
        .unwrap();
    assert_eq!(out.stage("raw"), Some(50.0));
    assert_eq!(out.stage("mitigated"), Some(45.0));
    assert_eq!(out.ctx.get("final"), Some(&45.0));
}

#[test]
fn test_final_stage_floor() {
    let mut pipelines = PipelineManager::new();
    pipelines.register(armored_damage()).unwrap();
    let params = MapScope::new().with("target.def", 500.0);
    let out = pipelines
        .run(DAMAGE_PIPELINE, damage_ctx(10.0), Some(&params))
        .unwrap();
    assert_eq!(out.final_value(), Some(1.0));
}

#[test]
fn test_duplicate_registration_rejected() {
    let mut pipelines = PipelineManager::with_defaults();
    assert!(matches!(
        pipelines.register(armored_damage()),
        Err(PipelineError::DuplicatePipeline(_))
    ));
}

#[test]
fn test_native_hook_detaches_its_owner() {
    let mut pipelines = PipelineManager::with_defaults();
    let shield = EffectId(9);
    // Absorbs one hit, then removes itself
    pipelines
        .attach_hook(
            shield,
            DAMAGE_PIPELINE,
            "scaled",
            HookTransform::native(|call| {
                call.detach_owner();
                0.0
            }),
        )
        .unwrap();

    let first = pipelines.run(DAMAGE_PIPELINE, damage_ctx(80.0), None).unwrap();
    let second = pipelines.run(DAMAGE_PIPELINE, damage_ctx(80.0), None).unwrap();
    assert_eq!(first.final_value(), Some(0.0));
    assert_eq!(second.final_value(), Some(80.0));
    assert_eq!(pipelines.hook_count(), 0);
}

#[test]
fn test_native_stage_and_single_hook_removal() {
    let crit = PipelineDef::new("crit")
        .formula_stage("raw", "damage")
        .unwrap()
        .native_stage("final", |scope| scope.lookup("raw").unwrap_or(0.0) * 2.0);
    let mut pipelines = PipelineManager::new();
    pipelines.register(crit).unwrap();

    let owner = EffectId(3);
    let doubled = pipelines
        .attach_hook(owner, "crit", "raw", HookTransform::Multiply(2.0))
        .unwrap();
    let plus = pipelines
        .attach_hook(owner, "crit", "raw", HookTransform::Add(5.0))
        .unwrap();
    // (10 * 2 + 5) * 2
    let out = pipelines.run("crit", damage_ctx(10.0), None).unwrap();
    assert_eq!(out.final_value(), Some(50.0));

    assert!(pipelines.detach_hook(doubled));
    assert!(!pipelines.detach_hook(doubled));
    assert_eq!(pipelines.hooks_on("crit", "raw").len(), 1);
    assert_eq!(pipelines.hooks_on("crit", "raw")[0].id, plus);

    let out = pipelines.run("crit", damage_ctx(10.0), None).unwrap();
    assert_eq!(out.final_value(), Some(30.0));
}

proptest! {
    /// Detaching an owner removes exactly its hooks, and doing it again
    /// removes nothing
    #[test]
    fn prop_detach_is_idempotent(
        owners in prop::collection::vec(0u64..5, 0..30),
        victim in 0u64..5,
    ) {
        let mut pipelines = PipelineManager::with_defaults();
        for (n, owner) in owners.iter().enumerate() {
            let stage = if n % 2 == 0 { "raw" } else { "scaled" };
            pipelines
                .attach_hook(EffectId(*owner), DAMAGE_PIPELINE, stage, HookTransform::Add(1.0))
                .unwrap();
        }
        let owned = owners.iter().filter(|o| **o == victim).count();

        prop_assert_eq!(pipelines.detach_hooks_of(EffectId(victim)), owned);
        prop_assert_eq!(pipelines.detach_hooks_of(EffectId(victim)), 0);
        prop_assert_eq!(pipelines.hook_count(), owners.len() - owned);

        // Every remaining hook adds one
        let out = pipelines.run(DAMAGE_PIPELINE, damage_ctx(0.0), None).unwrap();
        prop_assert_eq!(out.final_value(), Some((owners.len() - owned) as f64));
    }
}
