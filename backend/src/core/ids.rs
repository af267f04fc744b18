//! Typed identifiers
//!
//! Every id is a monotonically increasing counter issued by its owner, so
//! two runs with the same inputs issue the same ids in the same order.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{:08}"), self.0)
            }
        }
    };
}

counter_id!(
    /// Scheduled event id (issued by the event queue)
    EventId,
    "evt"
);
counter_id!(
    /// Live effect instance id
    EffectId,
    "eff"
);
counter_id!(
    /// Active skill cast id
    CastId,
    "cast"
);
counter_id!(
    /// Attached pipeline hook id
    HookId,
    "hook"
);

/// Issues sequential ids of one kind
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_raw(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_format() {
        assert_eq!(EffectId(42).to_string(), "eff_00000042");
        assert_eq!(CastId(7).to_string(), "cast_00000007");
    }

    #[test]
    fn test_allocator_is_sequential() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_raw(), 0);
        assert_eq!(ids.next_raw(), 1);
        assert_eq!(EventId(ids.next_raw()), EventId(2));
    }
}
