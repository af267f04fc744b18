//! Engine - the frame loop
//!
//! Owns every member, the event queue, active casts and effect instances
//! for one match, and advances them one frame per [`Engine::step`].
//!
//! # Architecture
//!
//! ```text
//! For each frame f:
//! 1. Re-sample dynamic cast regions due this frame (render_cmd)
//! 2. Drain the event queue for f and dispatch each event
//!    (behavior outcomes, cast starts, timeline entries)
//! 3. Retire casts whose region expired and timeline finished
//! 4. Tick every living agent's behavior tree
//! 5. Tick effect instances (periodic onTick, expiry)
//! 6. Refresh dirty stats, detect defeated members
//! 7. Flush: domain_event_batch, engine_telemetry, frame_snapshot
//! ```
//!
//! Nothing inside a step returns an error: failed formulas fall back to
//! 0 / false, unknown hooks are skipped, and rejected casts become
//! `cast_rejected` domain events.
//!
//! # Example
//!
//! ```rust
//! use battle_sim_core_rs::orchestrator::Engine;
//! use battle_sim_core_rs::transport::MessageKind;
//!
//! let mut engine = Engine::from_json(r#"{
//!     "rng_seed": 1,
//!     "archetypes": {"dummy": {"attributes": [{"path": "hp.current", "base": 10}]}},
//!     "members": [{"id": "a", "team": "red", "archetype": "dummy"}]
//! }"#).unwrap();
//!
//! let result = engine.step();
//! assert_eq!(result.frame, 0);
//! assert_eq!(result.messages.last().unwrap().kind, MessageKind::EngineTelemetry);
//! assert_eq!(engine.current_frame(), 1);
//! ```

use super::config::EngineConfig;
use super::snapshot::{compute_config_hash, CastSnapshot, FrameSnapshot, MemberSnapshot};
use super::SimulationError;
use crate::behavior::{
    BehaviorContext, CapabilityRegistry, NodeStatus, TargetInfo, TreeDocument,
};
use crate::core::ids::{CastId, EffectId, EventId, IdAllocator};
use crate::core::time::FrameClock;
use crate::events::{EventPayload, EventQueue, Priority, ScheduledEvent, SchedulerError, SimEvent};
use crate::expr::{EvalError, Expr, ExpressionCache, Scope};
use crate::models::{DomainEvent, EventLog, Member, HP_PATH, MP_PATH};
use crate::pipeline::{
    HookTransform, PipelineDef, PipelineError, PipelineManager, PipelineOutput, DAMAGE_PIPELINE,
    DAMAGE_TAKEN_PIPELINE, SKILL_COST_PIPELINE,
};
use crate::rng::RngManager;
use crate::skill::{
    check_cast, resolve_shape, ActiveCast, BuffEntry, BuffTarget, CastRejection, CastScope,
    DamageEntry, EffectInstance, ResolvedShape, ScopeKind, SkillEffectDescriptor, TimelineEntry,
    Vec2,
};
use crate::stats::{StatGraph, StatModifier};
use crate::transport::{DomainEventBatch, Envelope, MessageKind, Outbox, TelemetryData};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Everything one frame step produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
    pub frame: u64,
    /// Domain events of this frame, in occurrence order
    pub events: Vec<DomainEvent>,
    /// Outbound messages of this frame, in emission order
    pub messages: Vec<Envelope>,
}

/// `render_cmd` payload: one sampled cast region
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderCommand<'a> {
    frame_number: u64,
    cast: CastId,
    skill: &'a str,
    caster: &'a str,
    region: &'a ResolvedShape,
}

/// Per-entry data resolved when a timeline entry fires
struct EntryContext {
    frame: u64,
    cast: CastId,
    caster: usize,
    target: Option<usize>,
    elapsed: u64,
    region: Option<ResolvedShape>,
}

/// Member view of the roster used for targeting during agent ticks
struct RosterEntry {
    id: String,
    team: String,
    position: Vec2,
    alive: bool,
}

// ============================================================================
// Engine
// ============================================================================

/// Frame-stepped battle simulation
pub struct Engine {
    clock: FrameClock,
    queue: EventQueue,
    /// Members in configuration order; every per-frame pass walks this order
    members: Vec<Member>,
    index: BTreeMap<String, usize>,
    skills: BTreeMap<String, Arc<SkillEffectDescriptor>>,
    registry: CapabilityRegistry,
    rng: RngManager,
    exprs: ExpressionCache,
    casts: BTreeMap<CastId, ActiveCast>,
    effects: BTreeMap<EffectId, EffectInstance>,
    cast_ids: IdAllocator,
    effect_ids: IdAllocator,
    event_log: EventLog,
    /// Domain events of the frame in progress
    frame_events: Vec<DomainEvent>,
    outbox: Outbox,
    config_hash: String,
    snapshot_interval: Option<u64>,
    started: Instant,
}

impl Engine {
    /// Build an engine from a scenario
    ///
    /// Trees that fail to load do not fail construction: the member keeps
    /// no tree and a `tree_load_failed` event is reported with frame 0.
    ///
    /// # Errors
    /// `InvalidConfig` for unknown archetypes, duplicate ids, unknown
    /// skills referenced by trees, invalid skill descriptors or stat-graph
    /// definition errors.
    pub fn new(config: EngineConfig, registry: CapabilityRegistry) -> Result<Self, SimulationError> {
        config.validate()?;
        let config_hash = compute_config_hash(&config)?;

        let mut pipelines: BTreeMap<String, Arc<PipelineDef>> = BTreeMap::new();
        for def in config.pipeline_defs()? {
            let name = def.name.clone();
            if pipelines.insert(name.clone(), Arc::new(def)).is_some() {
                return Err(SimulationError::InvalidConfig(format!(
                    "pipeline defined twice: {name}"
                )));
            }
        }

        let skills: BTreeMap<String, Arc<SkillEffectDescriptor>> = config
            .skills
            .iter()
            .map(|s| (s.id.clone(), Arc::new(s.clone())))
            .collect();
        let trees: BTreeMap<&str, &TreeDocument> =
            config.trees.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut members = Vec::with_capacity(config.members.len());
        let mut index = BTreeMap::new();
        let mut frame_events = Vec::new();

        for mc in &config.members {
            let archetype = config.archetypes.get(&mc.archetype).ok_or_else(|| {
                SimulationError::InvalidConfig(format!("unknown archetype {}", mc.archetype))
            })?;
            let stats = archetype.build_stats(&mc.overrides).map_err(|e| match e {
                SimulationError::InvalidConfig(msg) => {
                    SimulationError::InvalidConfig(format!("member {}: {msg}", mc.id))
                }
                other => other,
            })?;
            let mut member = Member::new(
                &mc.id,
                &mc.team,
                mc.position,
                stats,
                PipelineManager::from_shared(&pipelines),
            );

            if let Some(doc) = mc.tree.as_deref().and_then(|name| trees.get(name)) {
                if let Err(e) = member.agent_mut().load(doc, &registry) {
                    tracing::warn!(member = %mc.id, tree = %doc.name, error = %e, "tree failed to load");
                    frame_events.push(DomainEvent::TreeLoadFailed {
                        frame: 0,
                        member: mc.id.clone(),
                        tree: doc.name.clone(),
                        error: e.to_string(),
                    });
                }
            }

            index.insert(mc.id.clone(), members.len());
            members.push(member);
        }

        tracing::info!(
            members = members.len(),
            skills = skills.len(),
            seed = config.rng_seed,
            "engine initialized"
        );

        Ok(Self {
            clock: FrameClock::new(config.frames_per_second),
            queue: EventQueue::new(),
            members,
            index,
            skills,
            registry,
            rng: RngManager::new(config.rng_seed),
            exprs: ExpressionCache::new(),
            casts: BTreeMap::new(),
            effects: BTreeMap::new(),
            cast_ids: IdAllocator::new(),
            effect_ids: IdAllocator::new(),
            event_log: EventLog::new(),
            frame_events,
            outbox: Outbox::new(),
            config_hash,
            snapshot_interval: config.snapshot_interval,
            started: Instant::now(),
        })
    }

    /// Engine with the standard capability set only
    pub fn from_config(config: EngineConfig) -> Result<Self, SimulationError> {
        Self::new(config, CapabilityRegistry::with_standard())
    }

    /// Parse a scenario document and build an engine from it
    pub fn from_json(text: &str) -> Result<Self, SimulationError> {
        Self::from_config(EngineConfig::from_json(text)?)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Next frame `step` will process
    pub fn current_frame(&self) -> u64 {
        self.clock.current_frame()
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.index.get(id).map(|&idx| &self.members[idx])
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn effects(&self) -> impl Iterator<Item = &EffectInstance> {
        self.effects.values()
    }

    pub fn active_cast_count(&self) -> usize {
        self.casts.len()
    }

    pub fn pending_event_count(&self) -> usize {
        self.queue.len()
    }

    /// Tag every outbound message with the controller's task id
    pub fn set_task_id(&mut self, task_id: impl Into<String>) {
        self.outbox.set_task_id(task_id);
    }

    /// Every member's attributes keyed by member id
    pub fn stats_snapshot(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.members
            .iter()
            .map(|m| (m.id().to_string(), m.stats().snapshot()))
            .collect()
    }

    /// Observable state; between steps `frame_number` is the next frame
    pub fn snapshot(&self) -> FrameSnapshot {
        self.build_snapshot(self.clock.current_frame())
    }

    fn build_snapshot(&self, frame: u64) -> FrameSnapshot {
        FrameSnapshot {
            frame_number: frame,
            config_hash: self.config_hash.clone(),
            members: self.members.iter().map(MemberSnapshot::from).collect(),
            effects: self.effects.values().cloned().collect(),
            casts: self
                .casts
                .values()
                .map(|c| CastSnapshot {
                    id: c.id.to_string(),
                    skill: c.skill.id.clone(),
                    caster: c.caster.clone(),
                    start_frame: c.start_frame,
                    region: c.region.clone(),
                })
                .collect(),
            pending_events: self.queue.len(),
            rng_state: self.rng.state(),
        }
    }

    // ========================================================================
    // Host operations
    // ========================================================================

    /// Schedule an event from outside the loop (e.g. a player input)
    ///
    /// # Errors
    /// `PastFrame` if `execute_frame` has already been processed.
    pub fn schedule(
        &mut self,
        execute_frame: u64,
        priority: Priority,
        event: SimEvent,
    ) -> Result<EventId, SchedulerError> {
        self.queue.insert(execute_frame, priority, event)
    }

    /// Cancel a scheduled event that has not been drained yet
    pub fn cancel_event(&mut self, id: EventId) -> bool {
        self.queue.cancel(id)
    }

    /// Remove a live effect now, detaching its hooks and modifiers
    ///
    /// The removal is reported with the next frame's domain events.
    pub fn cancel_effect(&mut self, id: EffectId) -> bool {
        let frame = self.clock.current_frame();
        self.remove_effect(frame, id, true)
    }

    /// Place a member; dynamic regions following it see the new position
    /// at their next sample
    ///
    /// # Errors
    /// `UnknownMember` if no member has that id.
    pub fn move_member(&mut self, member_id: &str, position: Vec2) -> Result<(), SimulationError> {
        let idx = *self
            .index
            .get(member_id)
            .ok_or_else(|| SimulationError::UnknownMember(member_id.to_string()))?;
        self.members[idx].set_position(position);
        Ok(())
    }

    /// Replace a member's behavior tree
    ///
    /// Delayed outcomes the old tree still waited for are cancelled.
    ///
    /// # Errors
    /// `UnknownMember`, or `TreeLoad` when the document is unusable (the
    /// member is then left without a tree).
    pub fn reload_tree(&mut self, member_id: &str, doc: &TreeDocument) -> Result<(), SimulationError> {
        let idx = *self
            .index
            .get(member_id)
            .ok_or_else(|| SimulationError::UnknownMember(member_id.to_string()))?;
        let frame = self.clock.current_frame();
        let member = &mut self.members[idx];
        for event in member.agent().pending_outcomes() {
            self.queue.cancel(event);
        }
        member.set_last_status(NodeStatus::Ready);
        match member.agent_mut().load(doc, &self.registry) {
            Ok(()) => Ok(()),
            Err(source) => {
                self.frame_events.push(DomainEvent::TreeLoadFailed {
                    frame,
                    member: member_id.to_string(),
                    tree: doc.name.clone(),
                    error: source.to_string(),
                });
                Err(SimulationError::TreeLoad {
                    member: member_id.to_string(),
                    source,
                })
            }
        }
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Process one frame; always completes
    pub fn step(&mut self) -> FrameResult {
        let frame = self.clock.current_frame();

        self.sample_casts(frame);
        self.dispatch_events(frame);
        self.retire_casts(frame);
        self.tick_agents(frame);
        self.tick_effects(frame);
        self.settle_members(frame);

        let result = self.flush(frame);
        self.clock.advance_frame();
        result
    }

    /// Process `frames` frames
    pub fn run(&mut self, frames: u64) -> Vec<FrameResult> {
        (0..frames).map(|_| self.step()).collect()
    }

    fn sample_casts(&mut self, frame: u64) {
        let due: Vec<CastId> = self
            .casts
            .values()
            .filter(|c| {
                c.skill.effect_scope.kind == ScopeKind::Dynamic
                    && c.elapsed(frame) > 0
                    && c.should_sample(frame)
            })
            .map(|c| c.id)
            .collect();
        for id in due {
            self.sample_region(frame, id);
        }
    }

    fn dispatch_events(&mut self, frame: u64) {
        let events = match self.queue.drain(frame) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(frame, error = %e, "event drain skipped");
                return;
            }
        };
        for event in events {
            self.dispatch(frame, event);
        }
    }

    fn dispatch(&mut self, frame: u64, event: ScheduledEvent) {
        tracing::debug!(frame, event = %event.id, kind = event.payload.kind(), "dispatching event");
        match event.payload {
            SimEvent::ResumeBehavior {
                member,
                node,
                outcome,
            } => match self.index.get(&member) {
                Some(&idx) => {
                    self.members[idx].agent_mut().deliver(node, event.id, outcome);
                }
                None => tracing::warn!(member = %member, "behavior outcome for unknown member"),
            },
            SimEvent::CastSkill {
                member,
                skill,
                target,
            } => self.begin_cast(frame, &member, &skill, target),
            SimEvent::SkillTimeline { cast, entry } => self.fire_entry(frame, cast, entry),
            SimEvent::Custom { tag, data } => {
                self.frame_events
                    .push(DomainEvent::Custom { frame, tag, data });
            }
        }
    }

    fn retire_casts(&mut self, frame: u64) {
        let before = self.casts.len();
        self.casts.retain(|_, cast| !cast.is_finished(frame));
        let retired = before - self.casts.len();
        if retired > 0 {
            tracing::debug!(frame, retired, "casts retired");
        }
    }

    fn tick_agents(&mut self, frame: u64) {
        let roster: Vec<RosterEntry> = self
            .members
            .iter()
            .map(|m| RosterEntry {
                id: m.id().to_string(),
                team: m.team().to_string(),
                position: m.position(),
                alive: !m.is_defeated(),
            })
            .collect();

        for i in 0..self.members.len() {
            if self.members[i].is_defeated() || !self.members[i].agent().has_tree() {
                continue;
            }
            let member_id = roster[i].id.clone();
            let previous = self.members[i].last_status();

            let status = {
                let (agent, stats, pipelines) = self.members[i].tick_parts();
                let mut ctx = MemberContext {
                    member_id: &member_id,
                    frame,
                    queue: &mut self.queue,
                    stats,
                    pipelines,
                    rng: &mut self.rng,
                    enemy: nearest_enemy(&roster, i),
                    exprs: &mut self.exprs,
                };
                agent.tick(&mut ctx)
            };

            if status != previous {
                self.frame_events.push(DomainEvent::BehaviorStatus {
                    frame,
                    member: member_id,
                    previous,
                    status,
                });
            }
            self.members[i].set_last_status(status);
        }
    }

    fn tick_effects(&mut self, frame: u64) {
        let ids: Vec<EffectId> = self.effects.keys().copied().collect();
        for id in ids {
            let Some(effect) = self.effects.get_mut(&id) else {
                continue;
            };
            let tick = effect.tick();
            let on_tick = if tick.periodic {
                effect.on_tick.clone().map(|src| (effect.owner.clone(), src))
            } else {
                None
            };

            if let Some((owner, source)) = on_tick {
                self.apply_effect_tick(frame, id, &owner, &source);
            }
            if tick.expired {
                self.remove_effect(frame, id, false);
            }
        }
    }

    fn settle_members(&mut self, frame: u64) {
        for member in self.members.iter_mut() {
            member.stats().refresh();
            if member.is_defeated() || !member.stats().contains(HP_PATH) {
                continue;
            }
            if member.hp() <= 0.0 {
                member.mark_defeated();
                tracing::info!(frame, member = member.id(), "member defeated");
                self.frame_events.push(DomainEvent::MemberDefeated {
                    frame,
                    member: member.id().to_string(),
                });
            }
        }
    }

    /// Emit this frame's messages: domain events first, then telemetry,
    /// then the periodic snapshot
    fn flush(&mut self, frame: u64) -> FrameResult {
        let events = std::mem::take(&mut self.frame_events);
        if !events.is_empty() {
            self.outbox.push(
                MessageKind::DomainEventBatch,
                &DomainEventBatch {
                    frame_number: frame,
                    events: events.clone(),
                },
            );
        }
        for event in &events {
            self.event_log.log(event.clone());
        }

        self.outbox.push(
            MessageKind::EngineTelemetry,
            &TelemetryData {
                frame_number: frame,
                run_time: self.started.elapsed().as_secs_f64(),
                fps: self.clock.frames_per_second(),
                member_count: self.members.len(),
            },
        );

        if let Some(interval) = self.snapshot_interval {
            if frame % interval == 0 {
                let snapshot = self.build_snapshot(frame);
                self.outbox.push(MessageKind::FrameSnapshot, &snapshot);
            }
        }

        FrameResult {
            frame,
            events,
            messages: self.outbox.take(),
        }
    }

    // ========================================================================
    // Casting
    // ========================================================================

    fn begin_cast(&mut self, frame: u64, caster_id: &str, skill_id: &str, target: Option<String>) {
        let Some(&ci) = self.index.get(caster_id) else {
            tracing::warn!(caster = caster_id, "cast by unknown member");
            return;
        };
        if self.members[ci].is_defeated() {
            tracing::debug!(caster = caster_id, skill = skill_id, "defeated member cannot cast");
            return;
        }
        let rejected = |reason: CastRejection| DomainEvent::CastRejected {
            frame,
            caster: caster_id.to_string(),
            skill: skill_id.to_string(),
            reason,
        };

        let Some(skill) = self.skills.get(skill_id).cloned() else {
            self.frame_events.push(rejected(CastRejection::UnknownSkill));
            return;
        };
        let ti = target
            .as_deref()
            .and_then(|t| self.index.get(t).copied())
            .filter(|&t| !self.members[t].is_defeated());

        let (hp_raw, mp_raw) = {
            let scope = cast_scope(&self.members, ci, ti, frame, 0);
            if let Err(reason) = check_cast(&skill, &scope, &mut self.exprs) {
                tracing::debug!(caster = caster_id, skill = skill_id, ?reason, "cast rejected");
                self.frame_events.push(rejected(reason));
                return;
            }
            (
                self.exprs.evaluate_or(&skill.hp_cost, &scope, 0.0),
                self.exprs.evaluate_or(&skill.mp_cost, &scope, 0.0),
            )
        };

        let mut costs = BTreeMap::new();
        costs.insert("hp_cost".to_string(), hp_raw);
        costs.insert("mp_cost".to_string(), mp_raw);
        let (hp_cost, mp_cost) = match self.run_member_pipeline(ci, ti, frame, 0, SKILL_COST_PIPELINE, costs) {
            Some(out) => (
                out.stage("hp_cost").unwrap_or(hp_raw),
                out.stage("mp_cost").unwrap_or(mp_raw),
            ),
            None => (hp_raw, mp_raw),
        };

        let caster = &mut self.members[ci];
        let (hp, mp) = (caster.hp(), caster.mp());
        if mp_cost > 0.0 && mp < mp_cost {
            self.frame_events.push(rejected(CastRejection::InsufficientMp {
                cost: mp_cost,
                available: mp,
            }));
            return;
        }
        if hp_cost > 0.0 && hp_cost >= hp {
            self.frame_events.push(rejected(CastRejection::InsufficientHp {
                cost: hp_cost,
                available: hp,
            }));
            return;
        }
        if mp_cost > 0.0 {
            if let Err(e) = caster.spend(MP_PATH, mp_cost) {
                tracing::warn!(caster = caster_id, error = %e, "mp cost not applied");
            }
        }
        if hp_cost > 0.0 {
            if let Err(e) = caster.apply_hp_delta(-hp_cost) {
                tracing::warn!(caster = caster_id, error = %e, "hp cost not applied");
            }
        }

        let cast_id = CastId(self.cast_ids.next_raw());
        let target_id = ti.map(|t| self.members[t].id().to_string());
        tracing::debug!(frame, cast = %cast_id, caster = caster_id, skill = skill_id, "cast started");
        self.frame_events.push(DomainEvent::CastStarted {
            frame,
            cast: cast_id,
            caster: caster_id.to_string(),
            skill: skill_id.to_string(),
            target: target_id.clone(),
            hp_cost,
            mp_cost,
        });

        self.casts.insert(
            cast_id,
            ActiveCast::new(cast_id, Arc::clone(&skill), caster_id, target_id, frame),
        );
        self.sample_region(frame, cast_id);

        for (i, entry) in skill.timeline.iter().enumerate() {
            let offset = entry.frame();
            if offset == 0 {
                self.fire_entry(frame, cast_id, i);
                continue;
            }
            let event = SimEvent::SkillTimeline {
                cast: cast_id,
                entry: i,
            };
            if let Err(e) = self.queue.insert(frame + offset, Priority::Normal, event) {
                tracing::warn!(cast = %cast_id, entry = i, error = %e, "timeline entry not scheduled");
            }
        }
    }

    /// Run one of the caster's pipelines with the cast scope as params
    /// Run `owner`'s pipeline with `owner` as self and `other` as target
    fn run_member_pipeline(
        &mut self,
        owner: usize,
        other: Option<usize>,
        frame: u64,
        elapsed: u64,
        name: &str,
        input: BTreeMap<String, f64>,
    ) -> Option<PipelineOutput> {
        // The owner's hooks stay with it; only the manager is moved out
        // while the scope borrows the roster
        let mut pipelines = std::mem::take(self.members[owner].pipelines_mut());
        let result = {
            let scope = cast_scope(&self.members, owner, other, frame, elapsed);
            pipelines.run(name, input, Some(&scope))
        };
        *self.members[owner].pipelines_mut() = pipelines;
        log_pipeline_result(name, result)
    }

    fn sample_region(&mut self, frame: u64, cast_id: CastId) {
        let Some(cast) = self.casts.get(&cast_id) else {
            return;
        };
        let Some(ci) = self.index.get(&cast.caster).copied() else {
            return;
        };
        let ti = cast.target.as_deref().and_then(|t| self.index.get(t).copied());
        let skill = Arc::clone(&cast.skill);
        let elapsed = cast.elapsed(frame);

        let region = {
            let scope = cast_scope(&self.members, ci, ti, frame, elapsed);
            resolve_shape(&skill.effect_scope.shape, &scope, &mut self.exprs)
        };
        self.outbox.push(
            MessageKind::RenderCmd,
            &RenderCommand {
                frame_number: frame,
                cast: cast_id,
                skill: &skill.id,
                caster: self.members[ci].id(),
                region: &region,
            },
        );
        if let Some(cast) = self.casts.get_mut(&cast_id) {
            cast.region = Some(region);
        }
    }

    fn fire_entry(&mut self, frame: u64, cast_id: CastId, entry: usize) {
        let Some(cast) = self.casts.get(&cast_id) else {
            tracing::debug!(cast = %cast_id, entry, "timeline entry for a finished cast");
            return;
        };
        let skill = Arc::clone(&cast.skill);
        let Some(ci) = self.index.get(&cast.caster).copied() else {
            return;
        };
        let ctx = EntryContext {
            frame,
            cast: cast_id,
            caster: ci,
            target: cast.target.as_deref().and_then(|t| self.index.get(t).copied()),
            elapsed: cast.elapsed(frame),
            region: cast.region.clone(),
        };
        if self.members[ci].is_defeated() {
            tracing::debug!(cast = %cast_id, entry, "caster defeated, entry skipped");
            return;
        }

        match skill.timeline.get(entry) {
            Some(TimelineEntry::Damage(damage)) => self.apply_damage(&ctx, &skill, damage),
            Some(TimelineEntry::Buff(buff)) => self.apply_buff(&ctx, &skill, entry, buff),
            None => tracing::warn!(cast = %cast_id, entry, "timeline entry out of range"),
        }
    }

    /// Evaluate the damage once, then for every hostile member inside the
    /// region run it through the caster's `damage` pipeline and the
    /// victim's `damage_taken` pipeline (skipped if the victim has none)
    fn apply_damage(&mut self, ctx: &EntryContext, skill: &SkillEffectDescriptor, entry: &DamageEntry) {
        let Some(region) = &ctx.region else {
            return;
        };
        let caster = &self.members[ctx.caster];
        let victims: Vec<usize> = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                !m.is_defeated() && m.is_hostile_to(caster) && region.contains(m.position())
            })
            .map(|(i, _)| i)
            .collect();
        if victims.is_empty() {
            tracing::debug!(cast = %ctx.cast, "damage entry hit nobody");
            return;
        }

        let raw = {
            let scope = cast_scope(&self.members, ctx.caster, ctx.target, ctx.frame, ctx.elapsed);
            self.exprs.evaluate_or(&entry.damage, &scope, 0.0)
        };

        let amounts: Vec<(usize, f64)> = victims
            .into_iter()
            .map(|victim| {
                let mut input = BTreeMap::new();
                input.insert("damage".to_string(), raw);
                let dealt = self
                    .run_member_pipeline(
                        ctx.caster,
                        Some(victim),
                        ctx.frame,
                        ctx.elapsed,
                        DAMAGE_PIPELINE,
                        input,
                    )
                    .and_then(|out| out.final_value())
                    .unwrap_or(raw);
                if !self.members[victim].pipelines().contains(DAMAGE_TAKEN_PIPELINE) {
                    return (victim, dealt);
                }
                let mut input = BTreeMap::new();
                input.insert("damage".to_string(), dealt);
                let taken = self
                    .run_member_pipeline(
                        victim,
                        Some(ctx.caster),
                        ctx.frame,
                        ctx.elapsed,
                        DAMAGE_TAKEN_PIPELINE,
                        input,
                    )
                    .and_then(|out| out.final_value())
                    .unwrap_or(dealt);
                (victim, taken)
            })
            .collect();

        let source = self.members[ctx.caster].id().to_string();
        for (victim, amount) in amounts {
            let target = self.members[victim].id().to_string();
            match self.members[victim].apply_hp_delta(-amount) {
                Ok(hp_after) => self.frame_events.push(DomainEvent::Damage {
                    frame: ctx.frame,
                    cast: ctx.cast,
                    skill: skill.id.clone(),
                    source: source.clone(),
                    target,
                    amount,
                    hp_after,
                }),
                Err(e) => tracing::warn!(target = %target, error = %e, "damage not applied"),
            }
        }
    }

    fn apply_buff(
        &mut self,
        ctx: &EntryContext,
        skill: &SkillEffectDescriptor,
        entry: usize,
        buff: &BuffEntry,
    ) {
        let recipients: Vec<usize> = match (buff.target, &ctx.region) {
            (BuffTarget::Caster, _) => vec![ctx.caster],
            (BuffTarget::Region, Some(region)) => self
                .members
                .iter()
                .enumerate()
                .filter(|(_, m)| region.contains(m.position()))
                .map(|(i, _)| i)
                .collect(),
            (BuffTarget::Region, None) => Vec::new(),
        };
        let caster = self.members[ctx.caster].id().to_string();

        for r in recipients {
            if self.members[r].is_defeated() {
                continue;
            }
            let id = EffectId(self.effect_ids.next_raw());
            let member = &mut self.members[r];

            let mut hooks = 0;
            for hook in &buff.hooks {
                let transform = match HookTransform::try_from(&hook.transform) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(effect = %id, error = %e, "hook transform invalid, skipped");
                        continue;
                    }
                };
                match member
                    .pipelines_mut()
                    .attach_hook(id, &hook.pipeline, &hook.stage, transform)
                {
                    Ok(_) => hooks += 1,
                    Err(e) => tracing::warn!(
                        effect = %id,
                        error = %e,
                        "hook not attached, effect continues without it"
                    ),
                }
            }
            for modifier in &buff.modifiers {
                let added = member.stats_mut().add_modifier(
                    &modifier.path,
                    StatModifier {
                        source: id,
                        kind: modifier.kind,
                        value: modifier.value,
                    },
                );
                if let Err(e) = added {
                    tracing::warn!(effect = %id, error = %e, "stat modifier skipped");
                }
            }

            let owner = member.id().to_string();
            self.effects.insert(
                id,
                EffectInstance {
                    id,
                    source_skill_id: skill.id.clone(),
                    cast: ctx.cast,
                    owner: owner.clone(),
                    caster: caster.clone(),
                    entry,
                    duration_frames: buff.duration,
                    remaining_frames: buff.duration,
                    update_interval_frames: buff.update_interval.max(1),
                    on_tick: buff.on_tick.clone(),
                },
            );
            self.frame_events.push(DomainEvent::EffectApplied {
                frame: ctx.frame,
                effect: id,
                skill: skill.id.clone(),
                owner,
                duration: buff.duration,
                hooks,
            });
        }
    }

    // ========================================================================
    // Effects
    // ========================================================================

    fn apply_effect_tick(&mut self, frame: u64, id: EffectId, owner: &str, source: &str) {
        let Some(&idx) = self.index.get(owner) else {
            return;
        };
        if self.members[idx].is_defeated() {
            return;
        }
        let delta = self.exprs.evaluate_or(source, &self.members[idx], 0.0);
        match self.members[idx].apply_hp_delta(delta) {
            Ok(hp_after) => self.frame_events.push(DomainEvent::EffectTick {
                frame,
                effect: id,
                owner: owner.to_string(),
                delta,
                hp_after,
            }),
            Err(e) => tracing::warn!(effect = %id, error = %e, "onTick not applied"),
        }
    }

    fn remove_effect(&mut self, frame: u64, id: EffectId, cancelled: bool) -> bool {
        let Some(effect) = self.effects.remove(&id) else {
            return false;
        };
        if let Some(&idx) = self.index.get(&effect.owner) {
            let member = &mut self.members[idx];
            let hooks = member.pipelines_mut().detach_hooks_of(id);
            let paths = member.stats_mut().remove_modifiers_of(id);
            tracing::debug!(effect = %id, hooks, dirtied = paths.len(), cancelled, "effect removed");
        }
        self.frame_events.push(DomainEvent::EffectRemoved {
            frame,
            effect: id,
            owner: effect.owner,
            cancelled,
        });
        true
    }
}

fn log_pipeline_result(
    name: &str,
    result: Result<PipelineOutput, PipelineError>,
) -> Option<PipelineOutput> {
    match result {
        Ok(out) => Some(out),
        Err(e) => {
            tracing::warn!(pipeline = name, error = %e, "pipeline unavailable, using raw value");
            None
        }
    }
}

/// Scope for skill expressions over the roster
fn cast_scope(
    members: &[Member],
    caster: usize,
    target: Option<usize>,
    frame: u64,
    elapsed: u64,
) -> CastScope<'_> {
    CastScope {
        caster: &members[caster],
        target: target.map(|t| &members[t] as &dyn Scope),
        caster_pos: members[caster].position(),
        target_pos: target.map(|t| members[t].position()),
        frame,
        elapsed,
    }
}

/// Closest living hostile member; ties go to the earlier member
fn nearest_enemy(roster: &[RosterEntry], me: usize) -> Option<TargetInfo> {
    let origin = &roster[me];
    roster
        .iter()
        .enumerate()
        .filter(|(i, r)| *i != me && r.alive && r.team != origin.team)
        .map(|(_, r)| (r, origin.position.distance(r.position)))
        .fold(None, |best: Option<(&RosterEntry, f64)>, (r, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((r, d)),
        })
        .map(|(r, distance)| TargetInfo {
            id: r.id.clone(),
            distance,
        })
}

// ============================================================================
// Behavior context
// ============================================================================

/// Host surface handed to one member's tree during its tick
struct MemberContext<'a> {
    member_id: &'a str,
    frame: u64,
    queue: &'a mut EventQueue,
    stats: &'a StatGraph,
    pipelines: &'a mut PipelineManager,
    rng: &'a mut RngManager,
    enemy: Option<TargetInfo>,
    exprs: &'a mut ExpressionCache,
}

impl BehaviorContext for MemberContext<'_> {
    fn member_id(&self) -> &str {
        self.member_id
    }

    fn current_frame(&self) -> u64 {
        self.frame
    }

    fn insert_event(
        &mut self,
        execute_frame: u64,
        priority: Priority,
        event: SimEvent,
    ) -> Result<EventId, SchedulerError> {
        self.queue.insert(execute_frame, priority, event)
    }

    fn cancel_event(&mut self, id: EventId) -> bool {
        self.queue.cancel(id)
    }

    fn run_pipeline(
        &mut self,
        name: &str,
        ctx: BTreeMap<String, f64>,
        params: Option<&dyn Scope>,
    ) -> Result<PipelineOutput, PipelineError> {
        self.pipelines.run(name, ctx, params)
    }

    fn stats(&self) -> &dyn Scope {
        self.stats
    }

    fn roll(&mut self) -> f64 {
        self.rng.next_f64()
    }

    fn nearest_enemy(&self) -> Option<TargetInfo> {
        self.enemy.clone()
    }

    fn formula(&mut self, source: &str) -> Result<Arc<Expr>, EvalError> {
        self.exprs.get_or_parse(source)
    }
}
