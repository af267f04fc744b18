//! PyO3 wrapper for the battle engine

use pyo3::exceptions::{PyKeyError, PyRuntimeError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use super::types::{config_error, dict_to_json, parse_priority, to_json};
use crate::behavior::TreeDocument;
use crate::core::ids::EffectId;
use crate::events::SimEvent;
use crate::orchestrator::{Engine, SimulationError};
use crate::skill::Vec2;

/// Python wrapper for [`Engine`]
///
/// # Example (from Python)
///
/// ```python
/// import json
/// from battle_sim_core_rs import Engine
///
/// engine = Engine(open("scenarios/duel.json").read())
/// engine.cast("boss", "fireball", target="hero", frame=0)
/// frame = json.loads(engine.step())
/// print(frame["events"])
/// ```
#[pyclass(name = "Engine")]
pub struct PyEngine {
    inner: Engine,
}

#[pymethods]
impl PyEngine {
    /// Create an engine from a scenario JSON document
    ///
    /// # Errors
    ///
    /// Raises ValueError if the scenario does not parse or validate.
    #[new]
    fn new(scenario: &str) -> PyResult<Self> {
        let inner = Engine::from_json(scenario).map_err(config_error)?;
        Ok(PyEngine { inner })
    }

    /// Create an engine from a scenario dict
    #[staticmethod]
    fn from_dict(scenario: &Bound<'_, PyDict>) -> PyResult<Self> {
        Self::new(&dict_to_json(scenario)?)
    }

    /// Process one frame; returns `{frame, events, messages}` as JSON
    fn step(&mut self) -> PyResult<String> {
        to_json(&self.inner.step())
    }

    /// Process `frames` frames; returns a JSON list of frame results
    fn run(&mut self, frames: u64) -> PyResult<String> {
        to_json(&self.inner.run(frames))
    }

    /// Current observable state as JSON
    fn snapshot(&self) -> PyResult<String> {
        to_json(&self.inner.snapshot())
    }

    fn current_frame(&self) -> u64 {
        self.inner.current_frame()
    }

    fn config_hash(&self) -> String {
        self.inner.config_hash().to_string()
    }

    fn member_ids(&self) -> Vec<String> {
        self.inner
            .members()
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    /// Attribute snapshot of one member
    fn member_stats(&self, member_id: &str) -> PyResult<String> {
        let member = self
            .inner
            .member(member_id)
            .ok_or_else(|| PyErr::new::<PyKeyError, _>(member_id.to_string()))?;
        to_json(&member.stats().snapshot())
    }

    /// Every domain event so far, as a JSON list
    fn event_log(&self) -> PyResult<String> {
        to_json(&self.inner.event_log().events())
    }

    /// Queue a cast attempt; returns the event id
    #[pyo3(signature = (member, skill, target=None, frame=None, priority="normal"))]
    fn cast(
        &mut self,
        member: String,
        skill: String,
        target: Option<String>,
        frame: Option<u64>,
        priority: &str,
    ) -> PyResult<u64> {
        let priority = parse_priority(priority)?;
        let frame = frame.unwrap_or_else(|| self.inner.current_frame());
        self.inner
            .schedule(
                frame,
                priority,
                SimEvent::CastSkill {
                    member,
                    skill,
                    target,
                },
            )
            .map(|id| id.0)
            .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Failed to schedule cast: {}", e)))
    }

    fn cancel_effect(&mut self, effect_id: u64) -> bool {
        self.inner.cancel_effect(EffectId(effect_id))
    }

    fn move_member(&mut self, member_id: &str, x: f64, y: f64) -> PyResult<()> {
        self.inner
            .move_member(member_id, Vec2::new(x, y))
            .map_err(|_| PyErr::new::<PyKeyError, _>(member_id.to_string()))
    }

    /// Replace a member's behavior tree with `definition` (JSON)
    fn reload_tree(&mut self, member_id: &str, name: &str, definition: &str) -> PyResult<()> {
        let doc = TreeDocument::new(name, definition);
        self.inner
            .reload_tree(member_id, &doc)
            .map_err(|e| match e {
                SimulationError::UnknownMember(id) => PyErr::new::<PyKeyError, _>(id),
                other => config_error(other),
            })
    }
}
