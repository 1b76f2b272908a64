//! # Device Sampler
//!
//! The periodic servo callback that copies one device frame into
//! [`SampledState`] per tick.

use tracing::trace;

use super::scheduler::CallbackCode;
use super::state::SampledState;
use crate::device::{HapticDevice, IntegerParam, VectorParam, DEVICE_BUTTON_1};

/// State owned by the servo thread: the device and its latest sample.
#[derive(Debug)]
pub struct ServoState<D> {
    device: D,
    sampled: SampledState,
}

impl<D: HapticDevice> ServoState<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            sampled: SampledState::default(),
        }
    }

    /// Copy of the latest sample.
    pub(crate) fn sampled(&self) -> SampledState {
        self.sampled
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

/// Reads the device once per servo tick.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    button_mask: u32,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(DEVICE_BUTTON_1)
    }
}

impl Sampler {
    /// Create a sampler tracking the buttons in `button_mask`.
    #[must_use]
    pub fn new(button_mask: u32) -> Self {
        Self { button_mask }
    }

    pub fn button_mask(&self) -> u32 {
        self.button_mask
    }

    /// Sample one device frame into `state`.
    ///
    /// Device errors are stored, never raised. Always asks to be scheduled
    /// again.
    pub fn tick<D: HapticDevice>(&self, state: &mut ServoState<D>) -> CallbackCode {
        let device = &mut state.device;
        device.begin_frame();

        let buttons = device.read_integer(IntegerParam::CurrentButtons);
        let sample = SampledState {
            button_pressed: (buttons as u32) & self.button_mask != 0,
            position: device.read_vector3(VectorParam::CurrentPosition),
            joint_angles: device.read_vector3(VectorParam::CurrentJointAngles),
            gimbal_angles: device.read_vector3(VectorParam::CurrentGimbalAngles),
            error: device.current_error(),
        };

        device.end_frame();

        trace!(buttons, "Sampled device frame");
        state.sampled = sample;
        CallbackCode::Continue
    }
}
