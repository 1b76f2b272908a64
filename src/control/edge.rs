//! Button edge detection between consecutive snapshots.

use crate::servo::state::SampledState;

/// Remembers the previous snapshot and reports button presses.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDetector {
    previous: SampledState,
}

impl EdgeDetector {
    /// Start from `initial`. A button already held in `initial` does not
    /// count as a press.
    pub fn seeded(initial: SampledState) -> Self {
        Self { previous: initial }
    }

    /// Returns true if `current` is a rising edge relative to the stored
    /// snapshot.
    pub fn is_rising(&self, current: &SampledState) -> bool {
        current.is_press_from(&self.previous)
    }

    /// Replace the stored snapshot.
    pub fn store(&mut self, current: SampledState) {
        self.previous = current;
    }
}
