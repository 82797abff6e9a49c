pub mod gps;
pub mod line;
pub mod sqm;

use chrono_tz::Tz;

use crate::error::Result;

pub use gps::{GpsReceiver, GpsReport};
pub use sqm::{Sqm, SqmReading};

/// Anything that can timestamp and place a measurement.
pub trait PositionSource {
    fn acquire_report(&mut self, zone: Tz) -> Result<GpsReport>;
}

/// Anything that answers a brightness query.
pub trait BrightnessMeter {
    fn read_brightness(&mut self) -> Result<SqmReading>;
}
