//! Domain models for the battle simulation

pub mod event;
pub mod member;

// Re-exports
pub use event::{DomainEvent, EventLog};
pub use member::{Member, HP_MAX_PATH, HP_PATH, MP_PATH};
