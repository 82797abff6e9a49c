use std::time::Duration;

use serde::Serialize;

use crate::devices::{GpsReport, SqmReading};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Column order of the data file.
pub const DATA_FILE_HEADER: [&str; 16] = [
    "brightness",
    "count",
    "frequency",
    "period",
    "temperature",
    "time_utc",
    "time_local",
    "latitude",
    "longitude",
    "altitude",
    "speed",
    "satellites",
    "trigger_id",
    "measurement_id",
    "gps_time",
    "sqm_time",
];

/// One measurement as taken.
#[derive(Debug, Clone)]
pub struct Record {
    pub gps: GpsReport,
    pub sqm: SqmReading,
    pub trigger_id: u32,
    pub measurement_id: u32,
    pub gps_latency: Duration,
    pub sqm_latency: Duration,
}

/// One line of the data file, already formatted. Field order is
/// [`DATA_FILE_HEADER`].
#[derive(Serialize, Debug, PartialEq)]
pub struct DataRow {
    pub brightness: String,
    pub count: String,
    pub frequency: String,
    pub period: String,
    pub temperature: String,
    pub time_utc: String,
    pub time_local: String,
    pub latitude: String,
    pub longitude: String,
    pub altitude: String,
    pub speed: String,
    pub satellites: String,
    pub trigger_id: String,
    pub measurement_id: String,
    pub gps_time: String,
    pub sqm_time: String,
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl From<&Record> for DataRow {
    fn from(record: &Record) -> Self {
        DataRow {
            brightness: record.sqm.brightness.clone(),
            count: record.sqm.count.clone(),
            frequency: record.sqm.frequency.clone(),
            period: record.sqm.period.clone(),
            temperature: record.sqm.temperature.clone(),
            time_utc: record.gps.time_utc.format(TIMESTAMP_FORMAT).to_string(),
            time_local: record.gps.time_local.format(TIMESTAMP_FORMAT).to_string(),
            latitude: format!("{:.5}", record.gps.latitude),
            longitude: format!("{:.5}", record.gps.longitude),
            altitude: optional(record.gps.altitude),
            speed: optional(record.gps.speed),
            satellites: optional(record.gps.satellites),
            trigger_id: format!("{:05}", record.trigger_id),
            measurement_id: format!("{:03}", record.measurement_id),
            gps_time: format!("{:.4}", record.gps_latency.as_secs_f64()),
            sqm_time: format!("{:.4}", record.sqm_latency.as_secs_f64()),
        }
    }
}
