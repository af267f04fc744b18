//! xorshift64* generator
//!
//! 64-bit state, 64-bit output; passes BigCrush. The state is serializable
//! so snapshots can record it.

use serde::{Deserialize, Serialize};

const MULTIPLIER: u64 = 0x2545_F491_4F6C_DD1D;

/// Seeded deterministic generator
///
/// # Example
/// ```
/// use battle_sim_core_rs::RngManager;
///
/// let mut a = RngManager::new(7);
/// let mut b = RngManager::new(7);
/// assert_eq!(a.next_u64(), b.next_u64());
///
/// let roll = a.next_f64();
/// assert!((0.0..1.0).contains(&roll));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a generator; a zero seed is replaced (xorshift needs nonzero state)
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(MULTIPLIER)
    }

    /// Uniform in [0, 1) with 53 bits of precision
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Raw state, for snapshots
    pub fn state(&self) -> u64 {
        self.state
    }
}
