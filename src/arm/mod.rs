//! # Arm Module
//!
//! Robot arm side of the bridge.
//!
//! This module handles:
//! - Mapping stylus angles to arm servo commands
//! - Formatting commands as controller requests
//! - Sending requests over HTTP (best effort)

pub mod dispatcher;
pub mod mapper;
pub mod transport;
