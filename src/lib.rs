//! # Haptic Arm Bridge Library
//!
//! Drive a hobby robot arm from a 6-DOF haptic stylus.
//!
//! A servo thread samples the device at a fixed rate. The foreground control
//! loop takes consistent snapshots of the latest sample and, on every stylus
//! button press, sends the current pose to the arm controller as an HTTP
//! `GET` command.

pub mod arm;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod servo;
pub mod session;
