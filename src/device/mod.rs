//! # Device Module
//!
//! Haptic device abstraction.
//!
//! This module handles:
//! - The [`HapticDevice`] trait that the servo loop reads from
//! - Device parameters (button bitmask, position, joint and gimbal angles)
//! - Device error reporting ([`ErrorInfo`], [`ErrorCode`])
//! - A simulated stylus for running without hardware
//!
//! Errors are never raised by the device calls themselves. The device keeps
//! its last error and the servo loop polls it once per frame with
//! [`HapticDevice::current_error`].

pub mod simulated;

use std::fmt;

/// Three doubles as reported by the device (x, y, z or joint 0, 1, 2).
pub type Vector3 = [f64; 3];

/// Bit for the first (front) stylus button.
pub const DEVICE_BUTTON_1: u32 = 1 << 0;

/// Bit for the second (rear) stylus button.
pub const DEVICE_BUTTON_2: u32 = 1 << 1;

/// Integer-valued device parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerParam {
    /// Bitmask of currently pressed buttons.
    CurrentButtons,
}

/// Vector-valued device parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorParam {
    /// Stylus tip position in device coordinates (mm).
    CurrentPosition,
    /// Base, shoulder and elbow joint angles (radians).
    CurrentJointAngles,
    /// Wrist gimbal angles (radians).
    CurrentGimbalAngles,
}

/// Error codes a haptic device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCode {
    #[default]
    None,
    /// A parameter value was rejected by the driver.
    InvalidValue,
    /// The device reported a fault (e.g. motor temperature, transient read fault).
    DeviceFault,
    /// Communication with the device was lost.
    CommError,
    /// The communication link is misconfigured.
    CommConfigError,
    /// The servo loop timer failed to keep its rate.
    TimerError,
    /// A scheduler callback was entered while already running.
    IllegalReentrancy,
    /// No more callbacks can be scheduled.
    SchedulerFull,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::None => "no error",
            ErrorCode::InvalidValue => "invalid value",
            ErrorCode::DeviceFault => "device fault",
            ErrorCode::CommError => "communication error",
            ErrorCode::CommConfigError => "communication configuration error",
            ErrorCode::TimerError => "servo timer error",
            ErrorCode::IllegalReentrancy => "illegal scheduler reentrancy",
            ErrorCode::SchedulerFull => "scheduler full",
        };
        f.write_str(name)
    }
}

/// Last error observed on a device.
///
/// # Examples
///
/// ```
/// use haptic_arm_bridge::device::{ErrorCode, ErrorInfo};
///
/// assert!(!ErrorInfo::none().is_error());
///
/// let lost = ErrorInfo::new(ErrorCode::CommError, 0x205);
/// assert!(lost.is_error());
/// assert!(lost.is_scheduler_error());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorInfo {
    /// Error kind.
    pub code: ErrorCode,
    /// Driver-specific detail code (0 when unknown).
    pub internal_code: i32,
}

impl ErrorInfo {
    /// No error.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            code: ErrorCode::None,
            internal_code: 0,
        }
    }

    #[must_use]
    pub const fn new(code: ErrorCode, internal_code: i32) -> Self {
        Self {
            code,
            internal_code,
        }
    }

    /// Returns true for any code other than [`ErrorCode::None`].
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code != ErrorCode::None
    }

    /// Returns true when communication with the device or the servo loop
    /// itself was disrupted. The control loop cannot continue after these.
    #[must_use]
    pub fn is_scheduler_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::CommError
                | ErrorCode::CommConfigError
                | ErrorCode::TimerError
                | ErrorCode::IllegalReentrancy
                | ErrorCode::SchedulerFull
        )
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (internal code 0x{:04x})", self.code, self.internal_code)
    }
}

/// A haptic input device read by the servo loop.
///
/// All reads between [`begin_frame`](HapticDevice::begin_frame) and
/// [`end_frame`](HapticDevice::end_frame) observe the same device frame.
/// Implementations are moved onto the servo thread, hence `Send`.
pub trait HapticDevice: Send {
    /// Human readable device name.
    fn name(&self) -> &str;

    /// Latch a consistent device frame.
    fn begin_frame(&mut self);

    /// Release the frame latched by `begin_frame`.
    fn end_frame(&mut self);

    /// Read an integer parameter from the current frame.
    fn read_integer(&mut self, param: IntegerParam) -> i32;

    /// Read a vector parameter from the current frame.
    fn read_vector3(&mut self, param: VectorParam) -> Vector3;

    /// Last error reported by the device, [`ErrorInfo::none`] if healthy.
    fn current_error(&mut self) -> ErrorInfo;

    /// Disable the device. Called once during teardown.
    fn disable(&mut self);
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One frame worth of device readings.
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    pub struct MockFrame {
        pub buttons: i32,
        pub position: Vector3,
        pub joint_angles: Vector3,
        pub gimbal_angles: Vector3,
        pub error: ErrorInfo,
    }

    /// Mock device replaying scripted frames.
    ///
    /// Each `begin_frame` pops the next scripted frame; once the script runs
    /// out the last frame is repeated.
    #[derive(Clone)]
    pub struct MockDevice {
        pub script: Arc<Mutex<VecDeque<MockFrame>>>,
        pub current: Arc<Mutex<MockFrame>>,
        pub frames_begun: Arc<Mutex<u64>>,
        pub frames_ended: Arc<Mutex<u64>>,
        pub open_frame: Arc<Mutex<bool>>,
        pub disable_calls: Arc<Mutex<u32>>,
    }

    impl MockDevice {
        pub fn new() -> Self {
            Self::with_frames(Vec::new())
        }

        pub fn with_frames(frames: Vec<MockFrame>) -> Self {
            Self {
                script: Arc::new(Mutex::new(frames.into_iter().collect())),
                current: Arc::new(Mutex::new(MockFrame::default())),
                frames_begun: Arc::new(Mutex::new(0)),
                frames_ended: Arc::new(Mutex::new(0)),
                open_frame: Arc::new(Mutex::new(false)),
                disable_calls: Arc::new(Mutex::new(0)),
            }
        }

        pub fn push_frame(&self, frame: MockFrame) {
            self.script.lock().unwrap().push_back(frame);
        }

        pub fn frames_begun(&self) -> u64 {
            *self.frames_begun.lock().unwrap()
        }

        pub fn frames_ended(&self) -> u64 {
            *self.frames_ended.lock().unwrap()
        }

        pub fn disable_calls(&self) -> u32 {
            *self.disable_calls.lock().unwrap()
        }

        fn assert_in_frame(&self) {
            assert!(
                *self.open_frame.lock().unwrap(),
                "device read outside of begin_frame/end_frame"
            );
        }
    }

    impl HapticDevice for MockDevice {
        fn name(&self) -> &str {
            "mock"
        }

        fn begin_frame(&mut self) {
            let mut open = self.open_frame.lock().unwrap();
            assert!(!*open, "nested begin_frame");
            *open = true;
            *self.frames_begun.lock().unwrap() += 1;

            if let Some(next) = self.script.lock().unwrap().pop_front() {
                *self.current.lock().unwrap() = next;
            }
        }

        fn end_frame(&mut self) {
            let mut open = self.open_frame.lock().unwrap();
            assert!(*open, "end_frame without begin_frame");
            *open = false;
            *self.frames_ended.lock().unwrap() += 1;
        }

        fn read_integer(&mut self, param: IntegerParam) -> i32 {
            self.assert_in_frame();
            match param {
                IntegerParam::CurrentButtons => self.current.lock().unwrap().buttons,
            }
        }

        fn read_vector3(&mut self, param: VectorParam) -> Vector3 {
            self.assert_in_frame();
            let frame = self.current.lock().unwrap();
            match param {
                VectorParam::CurrentPosition => frame.position,
                VectorParam::CurrentJointAngles => frame.joint_angles,
                VectorParam::CurrentGimbalAngles => frame.gimbal_angles,
            }
        }

        fn current_error(&mut self) -> ErrorInfo {
            self.current.lock().unwrap().error
        }

        fn disable(&mut self) {
            *self.disable_calls.lock().unwrap() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_bits() {
        assert_eq!(DEVICE_BUTTON_1, 0b01);
        assert_eq!(DEVICE_BUTTON_2, 0b10);
    }

    #[test]
    fn test_none_is_not_an_error() {
        let info = ErrorInfo::none();
        assert!(!info.is_error());
        assert!(!info.is_scheduler_error());
        assert_eq!(info, ErrorInfo::default());
    }

    #[test]
    fn test_device_fault_is_recoverable() {
        let info = ErrorInfo::new(ErrorCode::DeviceFault, 7);
        assert!(info.is_error());
        assert!(!info.is_scheduler_error());

        let info = ErrorInfo::new(ErrorCode::InvalidValue, 0);
        assert!(info.is_error());
        assert!(!info.is_scheduler_error());
    }

    #[test]
    fn test_scheduler_class_errors() {
        for code in [
            ErrorCode::CommError,
            ErrorCode::CommConfigError,
            ErrorCode::TimerError,
            ErrorCode::IllegalReentrancy,
            ErrorCode::SchedulerFull,
        ] {
            let info = ErrorInfo::new(code, 0);
            assert!(info.is_error(), "{:?} should be an error", code);
            assert!(info.is_scheduler_error(), "{:?} should be a scheduler error", code);
        }
    }

    #[test]
    fn test_error_display() {
        let info = ErrorInfo::new(ErrorCode::CommError, 0x0205);
        assert_eq!(info.to_string(), "communication error (internal code 0x0205)");
    }
}
