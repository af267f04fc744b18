//! Python host binding (feature `pyo3`)
//!
//! Results cross the boundary as JSON strings; the host decodes them with
//! its own `json` module.

pub mod engine;
pub mod types;
