//! Core simulation primitives: frame time and identifiers

pub mod ids;
pub mod time;
