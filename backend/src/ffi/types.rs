//! Conversion helpers for the FFI boundary

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde::Serialize;

use crate::events::Priority;
use crate::orchestrator::SimulationError;

/// Encode a result for the host
///
/// # Errors
/// Raises RuntimeError if the value has no JSON form.
pub fn to_json<T: Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value)
        .map_err(|e| PyErr::new::<PyRuntimeError, _>(format!("Failed to encode result: {}", e)))
}

/// Serialize a scenario dict with the host's `json` module
pub fn dict_to_json(dict: &Bound<'_, PyDict>) -> PyResult<String> {
    let json = PyModule::import_bound(dict.py(), "json")?;
    json.call_method1("dumps", (dict,))?.extract()
}

pub fn config_error(e: SimulationError) -> PyErr {
    PyErr::new::<PyValueError, _>(format!("Invalid scenario: {}", e))
}

/// Parse a priority name (`critical`, `high`, `normal`, `low`)
///
/// # Errors
/// Raises ValueError for any other name.
pub fn parse_priority(name: &str) -> PyResult<Priority> {
    match name {
        "critical" => Ok(Priority::Critical),
        "high" => Ok(Priority::High),
        "normal" => Ok(Priority::Normal),
        "low" => Ok(Priority::Low),
        other => Err(PyErr::new::<PyValueError, _>(format!(
            "Invalid priority: {}. Must be one of critical, high, normal, low",
            other
        ))),
    }
}
