//! # Error Types
//!
//! Custom error types for Haptic Arm Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Haptic Arm Bridge
#[derive(Debug, Error)]
pub enum HapticBridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Haptic device could not be initialized
    #[error("Failed to initialize the device: {0}")]
    DeviceInit(String),

    /// Servo scheduler failures (thread spawn, servo thread lost)
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// A synchronous request was issued while the scheduler was stopped
    #[error("Scheduler is not running")]
    SchedulerNotRunning,

    /// `start()` called on a running scheduler
    #[error("Scheduler is already running")]
    SchedulerAlreadyRunning,

    /// Command dispatch failures (HTTP transport)
    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

/// Result type alias for Haptic Arm Bridge
pub type Result<T> = std::result::Result<T, HapticBridgeError>;
