//! Frame clock for the simulation
//!
//! The simulation advances in discrete frames. Durations everywhere in the
//! engine are frame counts; seconds only appear when converting authored
//! values or reporting telemetry.

use serde::{Deserialize, Serialize};

/// Manages simulation time in discrete frames
///
/// # Example
/// ```
/// use battle_sim_core_rs::FrameClock;
///
/// let mut clock = FrameClock::new(60);
/// assert_eq!(clock.current_frame(), 0);
///
/// clock.advance_frame();
/// assert_eq!(clock.current_frame(), 1);
/// assert_eq!(clock.frames_for_seconds(0.5), 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameClock {
    /// Frames elapsed since simulation start
    current_frame: u64,
    /// Nominal simulation rate
    frames_per_second: u32,
}

impl FrameClock {
    /// Create a new FrameClock
    ///
    /// # Arguments
    /// * `frames_per_second` - Nominal frame rate used for time conversions
    pub fn new(frames_per_second: u32) -> Self {
        assert!(frames_per_second > 0, "frames_per_second must be positive");
        Self {
            current_frame: 0,
            frames_per_second,
        }
    }

    /// Advance time by one frame
    pub fn advance_frame(&mut self) {
        self.current_frame += 1;
    }

    /// Frame currently being (or about to be) processed
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn frames_per_second(&self) -> u32 {
        self.frames_per_second
    }

    /// Simulated seconds elapsed at the current frame
    ///
    /// # Example
    /// ```
    /// use battle_sim_core_rs::FrameClock;
    ///
    /// let mut clock = FrameClock::new(60);
    /// for _ in 0..90 {
    ///     clock.advance_frame();
    /// }
    /// assert_eq!(clock.elapsed_seconds(), 1.5);
    /// ```
    pub fn elapsed_seconds(&self) -> f64 {
        self.current_frame as f64 / self.frames_per_second as f64
    }

    /// Convert a duration in seconds to whole frames (rounded, at least 0)
    pub fn frames_for_seconds(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.frames_per_second as f64).round() as u64
    }
}
