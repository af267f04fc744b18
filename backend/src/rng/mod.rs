//! Deterministic random numbers
//!
//! Every random decision in a match (`chance` conditions in behavior trees)
//! draws from an `RngManager` seeded by the scenario, so a fixed seed
//! replays the same match.

mod xorshift;

pub use xorshift::RngManager;
