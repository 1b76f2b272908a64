//! # Servo Module
//!
//! The servo-rate side of the bridge.
//!
//! This module handles:
//! - Running the device sampler at servo rate on a dedicated thread
//! - Keeping the latest device sample ([`state::SampledState`])
//! - Handing consistent snapshots of that sample to the control thread

pub mod sampler;
pub mod scheduler;
pub mod snapshot;
pub mod state;
