//! # Control Module
//!
//! The foreground side of the bridge.
//!
//! This module handles:
//! - Polling device snapshots from the servo thread
//! - Detecting stylus button presses
//! - Dispatching arm commands on each press
//! - Stopping on servo loop failure or shutdown request

pub mod control_loop;
pub mod edge;
