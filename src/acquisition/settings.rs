use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::LoggerError;

/// What a trigger pulse does.
///
/// Config files spell it `SINGLE` or `TOGGLE_CONTINUOUS`, in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum TriggerMode {
    /// One trigger cycle per pulse.
    Single,
    /// A pulse starts repeating cycles, the next pulse stops them.
    ToggleContinuous,
}

impl TriggerMode {
    pub fn toggled(self) -> Self {
        match self {
            TriggerMode::Single => TriggerMode::ToggleContinuous,
            TriggerMode::ToggleContinuous => TriggerMode::Single,
        }
    }
}

impl FromStr for TriggerMode {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SINGLE" => Ok(TriggerMode::Single),
            "TOGGLE_CONTINUOUS" => Ok(TriggerMode::ToggleContinuous),
            _ => Err(LoggerError::InvalidConfig(format!(
                "unknown trigger_behavior {:?}, expected SINGLE or TOGGLE_CONTINUOUS",
                s
            ))),
        }
    }
}

impl TryFrom<String> for TriggerMode {
    type Error = LoggerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Single => write!(f, "SINGLE"),
            TriggerMode::ToggleContinuous => write!(f, "TOGGLE_CONTINUOUS"),
        }
    }
}

/// Copy of every setting taken under one lock.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsSnapshot {
    pub measurements_per_trigger: u32,
    pub measurement_interval: Duration,
    pub extra_measurement: bool,
    pub local_timezone: Tz,
    pub trigger_mode: TriggerMode,
    pub logging_active: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            measurements_per_trigger: 1,
            measurement_interval: Duration::ZERO,
            extra_measurement: true,
            local_timezone: chrono_tz::America::Los_Angeles,
            trigger_mode: TriggerMode::Single,
            logging_active: false,
        }
    }
}

/// Settings shared by the shell and the acquisition worker.
///
/// Each accessor holds the lock for that one field only. Values are not
/// validated here.
#[derive(Debug, Default)]
pub struct Settings {
    inner: Mutex<SettingsSnapshot>,
}

impl Settings {
    pub fn new(initial: SettingsSnapshot) -> Self {
        Settings {
            inner: Mutex::new(initial),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SettingsSnapshot> {
        // Every write is a single assignment, so a poisoned value is still whole.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.lock().clone()
    }

    pub fn measurements_per_trigger(&self) -> u32 {
        self.lock().measurements_per_trigger
    }

    pub fn set_measurements_per_trigger(&self, value: u32) {
        self.lock().measurements_per_trigger = value;
    }

    pub fn measurement_interval(&self) -> Duration {
        self.lock().measurement_interval
    }

    pub fn set_measurement_interval(&self, value: Duration) {
        self.lock().measurement_interval = value;
    }

    pub fn is_extra_measurement_enabled(&self) -> bool {
        self.lock().extra_measurement
    }

    pub fn set_extra_measurement(&self, value: bool) {
        self.lock().extra_measurement = value;
    }

    pub fn local_timezone(&self) -> Tz {
        self.lock().local_timezone
    }

    pub fn set_local_timezone(&self, value: Tz) {
        self.lock().local_timezone = value;
    }

    pub fn trigger_mode(&self) -> TriggerMode {
        self.lock().trigger_mode
    }

    pub fn set_trigger_mode(&self, value: TriggerMode) {
        self.lock().trigger_mode = value;
    }

    /// Flip the trigger mode and return the new one.
    pub fn toggle_trigger_mode(&self) -> TriggerMode {
        let mut guard = self.lock();
        guard.trigger_mode = guard.trigger_mode.toggled();
        guard.trigger_mode
    }

    /// Flip the extra measurement flag and return the new value.
    pub fn toggle_extra_measurement(&self) -> bool {
        let mut guard = self.lock();
        guard.extra_measurement = !guard.extra_measurement;
        guard.extra_measurement
    }

    pub fn is_logging_active(&self) -> bool {
        self.lock().logging_active
    }

    pub fn set_logging_active(&self, value: bool) {
        self.lock().logging_active = value;
    }
}
