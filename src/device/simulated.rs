//! # Simulated Stylus
//!
//! A [`HapticDevice`] that synthesizes stylus motion so the bridge can run
//! without hardware attached.
//!
//! ## Motion
//!
//! Every joint and gimbal angle follows a sine sweep with its own amplitude
//! and frequency multiple of the base sweep period. Position is a synthetic
//! trace derived from the same phase (it is not a kinematic model).
//!
//! ## Button
//!
//! Button 1 is held for `press_duration` at the start of every
//! `press_interval`, so the control loop sees one rising edge per interval.
//!
//! ## Faults
//!
//! When `fault_after` is set, the device reports [`ErrorCode::CommError`]
//! from that point on, which exercises the fatal shutdown path.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{
    ErrorCode, ErrorInfo, HapticDevice, IntegerParam, Vector3, VectorParam, DEVICE_BUTTON_1,
};
use crate::error::{HapticBridgeError, Result};

/// Internal code reported with the injected communication fault.
pub const SIMULATED_FAULT_CODE: i32 = 0x0205;

/// Shape of the synthesized motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedProfile {
    /// Period of the base sine sweep.
    pub sweep_period: Duration,
    /// Time between the starts of two button presses.
    pub press_interval: Duration,
    /// How long each press is held.
    pub press_duration: Duration,
    /// Report a communication error once this much time has passed.
    pub fault_after: Option<Duration>,
}

impl Default for SimulatedProfile {
    fn default() -> Self {
        Self {
            sweep_period: Duration::from_millis(8000),
            press_interval: Duration::from_millis(2000),
            press_duration: Duration::from_millis(300),
            fault_after: None,
        }
    }
}

/// One latched frame of simulated readings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Frame {
    buttons: i32,
    position: Vector3,
    joint_angles: Vector3,
    gimbal_angles: Vector3,
    error: ErrorInfo,
}

/// Simulated 6-DOF stylus.
#[derive(Debug)]
pub struct SimulatedDevice {
    profile: SimulatedProfile,
    started: Instant,
    frame: Frame,
    in_frame: bool,
    disabled: bool,
}

impl SimulatedDevice {
    /// Initialize the simulated device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceInit` if the profile cannot produce a usable signal:
    /// - `sweep_period` or `press_interval` is zero
    /// - `press_duration` is not shorter than `press_interval`
    ///
    /// # Examples
    ///
    /// ```
    /// use haptic_arm_bridge::device::simulated::{SimulatedDevice, SimulatedProfile};
    /// use haptic_arm_bridge::device::HapticDevice;
    ///
    /// let device = SimulatedDevice::initialize(SimulatedProfile::default())?;
    /// assert_eq!(device.name(), "simulated stylus");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn initialize(profile: SimulatedProfile) -> Result<Self> {
        if profile.sweep_period.is_zero() {
            return Err(HapticBridgeError::DeviceInit(
                "sweep period must be greater than 0".to_string(),
            ));
        }

        if profile.press_interval.is_zero() {
            return Err(HapticBridgeError::DeviceInit(
                "press interval must be greater than 0".to_string(),
            ));
        }

        if profile.press_duration >= profile.press_interval {
            return Err(HapticBridgeError::DeviceInit(
                "press duration must be shorter than press interval".to_string(),
            ));
        }

        info!(
            "Simulated stylus initialized (sweep {:?}, press every {:?} for {:?})",
            profile.sweep_period, profile.press_interval, profile.press_duration
        );

        let mut device = Self {
            profile,
            started: Instant::now(),
            frame: Frame::default(),
            in_frame: false,
            disabled: false,
        };
        device.frame = device.frame_at(Duration::ZERO);
        Ok(device)
    }

    /// Returns true once `disable` has been called.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Compute the readings `elapsed` after initialization.
    fn frame_at(&self, elapsed: Duration) -> Frame {
        let phase = TAU * elapsed.as_secs_f64() / self.profile.sweep_period.as_secs_f64();

        let joint_angles = [
            0.9 * phase.sin(),
            0.6 * (0.5 * phase).sin(),
            0.4 + 0.3 * (2.0 * phase).sin(),
        ];
        let gimbal_angles = [
            1.2 * (1.5 * phase).sin(),
            0.7 * phase.cos(),
            1.5 * (0.75 * phase).sin(),
        ];
        let position = [
            120.0 * joint_angles[0].sin(),
            80.0 * joint_angles[1].sin(),
            -60.0 + 40.0 * joint_angles[2].cos(),
        ];

        // press_interval is non-zero, checked in initialize
        let into_interval = elapsed.as_nanos() % self.profile.press_interval.as_nanos();
        let pressed = into_interval < self.profile.press_duration.as_nanos();
        let buttons = if pressed { DEVICE_BUTTON_1 as i32 } else { 0 };

        let error = match self.profile.fault_after {
            Some(after) if elapsed >= after => {
                ErrorInfo::new(ErrorCode::CommError, SIMULATED_FAULT_CODE)
            }
            _ => ErrorInfo::none(),
        };

        Frame {
            buttons,
            position,
            joint_angles,
            gimbal_angles,
            error,
        }
    }
}

impl HapticDevice for SimulatedDevice {
    fn name(&self) -> &str {
        "simulated stylus"
    }

    fn begin_frame(&mut self) {
        self.in_frame = true;
        if !self.disabled {
            self.frame = self.frame_at(self.started.elapsed());
        }
    }

    fn end_frame(&mut self) {
        self.in_frame = false;
    }

    fn read_integer(&mut self, param: IntegerParam) -> i32 {
        match param {
            IntegerParam::CurrentButtons => self.frame.buttons,
        }
    }

    fn read_vector3(&mut self, param: VectorParam) -> Vector3 {
        match param {
            VectorParam::CurrentPosition => self.frame.position,
            VectorParam::CurrentJointAngles => self.frame.joint_angles,
            VectorParam::CurrentGimbalAngles => self.frame.gimbal_angles,
        }
    }

    fn current_error(&mut self) -> ErrorInfo {
        if !self.in_frame {
            debug!("Error state polled outside of a device frame");
        }
        self.frame.error
    }

    fn disable(&mut self) {
        if !self.disabled {
            info!("Simulated stylus disabled");
            self.disabled = true;
        }
    }
}
