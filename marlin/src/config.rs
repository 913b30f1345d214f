//! Static configuration: serial settings, axis limits, speed range, run
//! parameters and the mnemonic table. Loaded once from a JSON payload and
//! read-only afterwards; anything missing or malformed fails the load rather
//! than falling back to a default.

use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::gcode::{mnemonic, Axis, GcodeTable};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("gcode table is missing required mnemonic {0:?}")]
    MissingMnemonic(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerialSettings {
    /// Port identifier, e.g. `/dev/ttyACM0`.
    pub port: String,
    pub baudrate: u32,
    /// Read timeout in seconds.
    pub timeout: f64,
}

/// Per-axis travel bounds in length units from the origin.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxisLimits {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AxisLimits {
    pub fn for_axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Feed rates in length units per minute.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SpeedSettings {
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrinterParams {
    /// Position the firmware reports after homing.
    pub origin: [f64; 3],
    pub physical_limits: AxisLimits,
    pub soft_limits: AxisLimits,
    pub speed: SpeedSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunParams {
    /// Pause after each command, in seconds.
    pub delay: f64,
    /// Decimal digits kept when formatting coordinates.
    pub resolution: u8,
    /// Maximum lines joined into one serial write.
    pub batch_size: usize,
    /// Repetitions used by scripted sequences.
    pub steps: u32,
    /// Positional deltas below this are not worth a command.
    pub coord_deadband: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub serial_settings: SerialSettings,
    pub printer_params: PrinterParams,
    pub run_params: RunParams,
    pub gcode: GcodeTable,
}

impl Config {
    pub fn from_json(payload: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        Config::from_json(&fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let params = &self.printer_params;
        for axis in Axis::ALL {
            let soft = params.soft_limits.for_axis(axis);
            let physical = params.physical_limits.for_axis(axis);
            if soft <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "soft limit for {:?} must be positive, got {}",
                    axis, soft
                )));
            }
            if soft > physical {
                return Err(ConfigError::Invalid(format!(
                    "soft limit {} for {:?} exceeds physical limit {}",
                    soft, axis, physical
                )));
            }
        }
        let speed = params.speed;
        if speed.min <= 0.0 || speed.min > speed.max {
            return Err(ConfigError::Invalid(format!(
                "speed range [{}, {}] is not usable",
                speed.min, speed.max
            )));
        }
        if speed.default < speed.min || speed.default > speed.max {
            return Err(ConfigError::Invalid(format!(
                "default speed {} outside range [{}, {}]",
                speed.default, speed.min, speed.max
            )));
        }
        let run = &self.run_params;
        if run.delay < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "delay must be nonnegative, got {}",
                run.delay
            )));
        }
        if run.coord_deadband < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "coord_deadband must be nonnegative, got {}",
                run.coord_deadband
            )));
        }
        if run.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        for name in mnemonic::REQUIRED {
            if !self.gcode.contains(name) {
                return Err(ConfigError::MissingMnemonic(name));
            }
        }
        Ok(())
    }
}
