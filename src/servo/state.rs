//! # Sampled Device State
//!
//! The record written by the sampler once per servo tick.

use crate::device::{ErrorInfo, Vector3};

/// Latest device readings, all taken from the same device frame.
///
/// Only the sampler writes this record, on the servo thread. Other threads
/// get copies through [`StateSnapshotter`](super::snapshot::StateSnapshotter).
///
/// # Examples
///
/// ```
/// use haptic_arm_bridge::servo::state::SampledState;
///
/// let state = SampledState::default();
/// assert!(!state.button_pressed);
/// assert!(!state.error.is_error());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampledState {
    /// Whether the tracked stylus button is held.
    pub button_pressed: bool,
    /// Stylus position in device coordinates.
    pub position: Vector3,
    /// Base, shoulder and elbow joint angles (radians).
    pub joint_angles: Vector3,
    /// Wrist gimbal angles (radians).
    pub gimbal_angles: Vector3,
    /// Device error observed during the frame.
    pub error: ErrorInfo,
}

impl SampledState {
    /// Returns true if the button went down between `previous` and `self`.
    ///
    /// # Examples
    ///
    /// ```
    /// use haptic_arm_bridge::servo::state::SampledState;
    ///
    /// let up = SampledState::default();
    /// let down = SampledState { button_pressed: true, ..Default::default() };
    ///
    /// assert!(down.is_press_from(&up));
    /// assert!(!down.is_press_from(&down));
    /// assert!(!up.is_press_from(&down));
    /// ```
    #[must_use]
    pub fn is_press_from(&self, previous: &SampledState) -> bool {
        self.button_pressed && !previous.button_pressed
    }
}
