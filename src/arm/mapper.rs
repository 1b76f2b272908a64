//! # Angle Mapper Module
//!
//! Maps stylus joint and gimbal angles to robot arm servo commands.
//!
//! ## Axis Assignments
//!
//! | Arm servo | Stylus input | Offset |
//! |-----------|--------------|--------|
//! | Base | Joint 0 | +90° |
//! | Shoulder | Joint 1 | +90° |
//! | Elbow | Joint 2 | 0° |
//! | Wrist rotate | Gimbal 0 | +90° |
//! | Wrist vertical | Gimbal 1 | +90° |
//! | Grip | Gimbal 2 | +90°, then rescaled |
//!
//! ## Value Ranges
//!
//! - Stylus input: radians
//! - Servo output: integer degrees, narrowed by truncation toward zero
//! - Grip: the 0-360° raw angle is rescaled to the gripper's 10-73 range
//!
//! Nothing is clamped. Angles outside the nominal range give servo values
//! outside the nominal range, and the arm controller decides what to do
//! with them.
//!
//! ## Usage
//!
//! ```
//! use haptic_arm_bridge::arm::mapper::map_angles;
//!
//! let command = map_angles(&[0.0; 3], &[0.0; 3]);
//! assert_eq!(command.base, 90);
//! assert_eq!(command.elbow, 0);
//! assert_eq!(command.grip, 25);
//! ```

use std::f64::consts::PI;
use std::fmt;

use crate::device::Vector3;

/// Offset added to centered servos, in degrees.
pub const SERVO_CENTER_DEG: f64 = 90.0;

/// Lowest gripper servo value.
pub const GRIP_MIN: i64 = 10;

/// Highest gripper servo value.
pub const GRIP_MAX: i64 = 73;

/// Full sweep of the raw grip angle, in degrees.
pub const GRIP_SWEEP_DEG: i64 = 360;

/// Servo targets for the six arm axes, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActuatorCommand {
    pub base: i32,
    pub shoulder: i32,
    pub elbow: i32,
    pub wrist_rotate: i32,
    pub wrist_vertical: i32,
    pub grip: i32,
}

impl ActuatorCommand {
    /// Values in wire order: base, shoulder, elbow, wrist rotate, wrist
    /// vertical, grip.
    #[must_use]
    pub fn to_array(&self) -> [i32; 6] {
        [
            self.base,
            self.shoulder,
            self.elbow,
            self.wrist_rotate,
            self.wrist_vertical,
            self.grip,
        ]
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "base {} shoulder {} elbow {} wrist rotate {} wrist vertical {} grip {}",
            self.base,
            self.shoulder,
            self.elbow,
            self.wrist_rotate,
            self.wrist_vertical,
            self.grip
        )
    }
}

/// Map stylus angles (radians) to an arm command.
///
/// Pure and deterministic: the same angles always give the same command.
#[must_use]
pub fn map_angles(joint_angles: &Vector3, gimbal_angles: &Vector3) -> ActuatorCommand {
    let grip_raw = to_degrees(gimbal_angles[2], SERVO_CENTER_DEG);

    ActuatorCommand {
        base: to_degrees(joint_angles[0], SERVO_CENTER_DEG),
        shoulder: to_degrees(joint_angles[1], SERVO_CENTER_DEG),
        elbow: to_degrees(joint_angles[2], 0.0),
        wrist_rotate: to_degrees(gimbal_angles[0], SERVO_CENTER_DEG),
        wrist_vertical: to_degrees(gimbal_angles[1], SERVO_CENTER_DEG),
        grip: scale_grip(grip_raw),
    }
}

/// Converts radians to degrees plus `offset`, truncated toward zero.
///
/// Evaluated as `angle * 180 / π + offset`, in that order.
#[inline]
fn to_degrees(angle: f64, offset: f64) -> i32 {
    (angle * 180.0 / PI + offset) as i32
}

/// Rescales a raw 0-360° grip angle to the gripper range with truncating
/// integer division. `raw` is not clamped.
#[inline]
fn scale_grip(raw: i32) -> i32 {
    let scaled = i64::from(raw) * (GRIP_MAX - GRIP_MIN) / GRIP_SWEEP_DEG + GRIP_MIN;
    scaled as i32
}
