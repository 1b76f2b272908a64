//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::device::simulated::SimulatedProfile;
use crate::error::{HapticBridgeError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub servo: ServoConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub command: CommandConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Haptic device configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_button_mask")]
    pub button_mask: u32,

    #[serde(default = "default_simulated_sweep_period_ms")]
    pub simulated_sweep_period_ms: u64,

    #[serde(default = "default_simulated_press_interval_ms")]
    pub simulated_press_interval_ms: u64,

    #[serde(default = "default_simulated_press_duration_ms")]
    pub simulated_press_duration_ms: u64,

    /// 0 disables fault injection
    #[serde(default)]
    pub simulated_fault_after_ms: u64,
}

/// Servo loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServoConfig {
    #[serde(default = "default_servo_rate_hz")]
    pub rate_hz: u32,
}

/// Control loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControlConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Arm controller endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CommandConfig {
    #[serde(default = "default_command_host")]
    pub host: String,

    #[serde(default = "default_command_port")]
    pub port: u16,

    #[serde(default = "default_command_code")]
    pub code: u32,

    #[serde(default = "default_command_timeout_ms")]
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_button_mask() -> u32 { crate::device::DEVICE_BUTTON_1 }
fn default_simulated_sweep_period_ms() -> u64 { 8000 }
fn default_simulated_press_interval_ms() -> u64 { 2000 }
fn default_simulated_press_duration_ms() -> u64 { 300 }

fn default_servo_rate_hz() -> u32 { 1000 }

fn default_poll_interval_ms() -> u64 { 1 }

fn default_command_host() -> String { "192.168.3.14".to_string() }
fn default_command_port() -> u16 { 4200 }
fn default_command_code() -> u32 { crate::arm::dispatcher::MOVE_ALL_COMMAND_CODE }
fn default_command_timeout_ms() -> u64 { 1000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            button_mask: default_button_mask(),
            simulated_sweep_period_ms: default_simulated_sweep_period_ms(),
            simulated_press_interval_ms: default_simulated_press_interval_ms(),
            simulated_press_duration_ms: default_simulated_press_duration_ms(),
            simulated_fault_after_ms: 0,
        }
    }
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self { rate_hz: default_servo_rate_hz() }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms() }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            host: default_command_host(),
            port: default_command_port(),
            code: default_command_code(),
            timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl DeviceConfig {
    /// Motion profile for the simulated stylus
    pub fn simulated_profile(&self) -> SimulatedProfile {
        SimulatedProfile {
            sweep_period: Duration::from_millis(self.simulated_sweep_period_ms),
            press_interval: Duration::from_millis(self.simulated_press_interval_ms),
            press_duration: Duration::from_millis(self.simulated_press_duration_ms),
            fault_after: match self.simulated_fault_after_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use haptic_arm_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate button mask (stylus has at most 4 buttons)
        if self.device.button_mask == 0 || self.device.button_mask > 0b1111 {
            return Err(invalid("button_mask must select at least one of the 4 stylus buttons"));
        }

        // Validate simulated motion
        if self.device.simulated_sweep_period_ms == 0 {
            return Err(invalid("simulated_sweep_period_ms must be greater than 0"));
        }

        if self.device.simulated_press_interval_ms == 0 {
            return Err(invalid("simulated_press_interval_ms must be greater than 0"));
        }

        if self.device.simulated_press_duration_ms >= self.device.simulated_press_interval_ms {
            return Err(invalid(
                "simulated_press_duration_ms must be less than simulated_press_interval_ms",
            ));
        }

        // Validate servo rate
        if self.servo.rate_hz < 100 || self.servo.rate_hz > 4000 {
            return Err(invalid("servo rate_hz must be between 100 and 4000"));
        }

        // Validate control loop timing
        if self.control.poll_interval_ms > 1000 {
            return Err(invalid("poll_interval_ms must be between 0 and 1000"));
        }

        // Validate command endpoint
        if self.command.host.trim().is_empty() {
            return Err(invalid("command host cannot be empty"));
        }

        if self.command.host.contains(['/', '?', ' ']) {
            return Err(invalid("command host must be a bare host name or address"));
        }

        if self.command.port == 0 {
            return Err(invalid("command port must be greater than 0"));
        }

        if self.command.timeout_ms == 0 || self.command.timeout_ms > 60000 {
            return Err(invalid("command timeout_ms must be between 1 and 60000"));
        }

        // Validate log level
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> HapticBridgeError {
    HapticBridgeError::Config(toml::de::Error::custom(msg))
}
