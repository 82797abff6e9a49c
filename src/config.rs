use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::Level;

use crate::acquisition::settings::{SettingsSnapshot, TriggerMode};
use crate::error::{LoggerError, Result};

/// Contents of `config.yaml` (or a `.json` equivalent).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub sqm_serial_port: String,
    pub sqm_baud_rate: u32,
    pub sqm_timeout_secs: u64,
    pub gps_serial_port: String,
    pub gps_baud_rate: u32,
    pub gps_timeout_secs: u64,
    /// How long start-up waits for the first fix.
    pub gps_fix_timeout_secs: u64,
    /// Bound on each steady-state GGA/RMC read; unbounded when absent.
    pub gps_report_timeout_secs: Option<u64>,
    pub measurements_per_trigger: u32,
    /// Seconds between measurements within a cycle.
    pub measurement_interval: f64,
    pub extra_measurement: bool,
    pub local_timezone: String,
    pub trigger_behavior: TriggerMode,
    pub logging_level: String,
    pub data_dir: PathBuf,
    pub diagnostics_dir: PathBuf,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            sqm_serial_port: "/dev/ttyUSB0".to_string(),
            sqm_baud_rate: 115_200,
            sqm_timeout_secs: 30,
            gps_serial_port: "/dev/ttyACM0".to_string(),
            gps_baud_rate: 4800,
            gps_timeout_secs: 2,
            gps_fix_timeout_secs: 180,
            gps_report_timeout_secs: None,
            measurements_per_trigger: 1,
            measurement_interval: 0.0,
            extra_measurement: true,
            local_timezone: "America/Los_Angeles".to_string(),
            trigger_behavior: TriggerMode::Single,
            logging_level: "INFO".to_string(),
            data_dir: PathBuf::from("data"),
            diagnostics_dir: PathBuf::from("diagnostics"),
        }
    }
}

impl LoggerConfig {
    /// Load and validate. `.json` files are read as JSON, everything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: LoggerConfig = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => serde_json::from_str(&text)?,
            _ => serde_yaml::from_str(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.measurements_per_trigger < 1 {
            return Err(LoggerError::InvalidConfig(
                "measurements_per_trigger must be at least 1".to_string(),
            ));
        }
        self.measurement_interval()?;
        self.timezone()?;
        self.log_level()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.local_timezone
            .parse::<Tz>()
            .map_err(|_| LoggerError::UnknownTimezone(self.local_timezone.clone()))
    }

    /// Accepts the Python-style names used in existing config files.
    pub fn log_level(&self) -> Result<Level> {
        match self.logging_level.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::TRACE),
            "DEBUG" => Ok(Level::DEBUG),
            "INFO" => Ok(Level::INFO),
            "WARN" | "WARNING" => Ok(Level::WARN),
            "ERROR" | "CRITICAL" => Ok(Level::ERROR),
            other => Err(LoggerError::InvalidConfig(format!(
                "unknown logging_level {:?}",
                other
            ))),
        }
    }

    pub fn measurement_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.measurement_interval).map_err(|_| {
            LoggerError::InvalidConfig(format!(
                "measurement_interval must be a non-negative number of seconds, got {}",
                self.measurement_interval
            ))
        })
    }

    pub fn initial_settings(&self) -> Result<SettingsSnapshot> {
        Ok(SettingsSnapshot {
            measurements_per_trigger: self.measurements_per_trigger,
            measurement_interval: self.measurement_interval()?,
            extra_measurement: self.extra_measurement,
            local_timezone: self.timezone()?,
            trigger_mode: self.trigger_behavior,
            logging_active: false,
        })
    }
}
