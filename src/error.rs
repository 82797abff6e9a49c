use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GPS fix not acquired within {timeout:?}")]
    NoFixAcquired { timeout: Duration },

    #[error("No GGA/RMC sentence pair received within {timeout:?}")]
    ReportTimeout { timeout: Duration },

    #[error("Directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

pub type Result<T> = std::result::Result<T, LoggerError>;
