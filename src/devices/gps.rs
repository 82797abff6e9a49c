use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use nmea::sentences::FixType;
use nmea::{ParseResult, parse_str};
use tracing::{debug, error, info};

use super::line::{Channel, read_line};
use super::PositionSource;
use crate::error::{LoggerError, Result};

/// Talker variants accepted for each sentence we consume.
const POSITION_PREFIXES: [&str; 2] = ["$GNGGA", "$GPGGA"];
const NAVIGATION_PREFIXES: [&str; 2] = ["$GNRMC", "$GPRMC"];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SentenceKind {
    /// GGA: time of day, position, altitude, fix quality, satellites.
    Position,
    /// RMC: date and speed over ground.
    Navigation,
}

fn classify(line: &str) -> Option<SentenceKind> {
    if POSITION_PREFIXES.iter().any(|p| line.starts_with(p)) {
        Some(SentenceKind::Position)
    } else if NAVIGATION_PREFIXES.iter().any(|p| line.starts_with(p)) {
        Some(SentenceKind::Navigation)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PositionFix {
    time: NaiveTime,
    latitude: f64,
    longitude: f64,
    altitude: Option<f32>,
    satellites: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
struct NavigationFix {
    date: NaiveDate,
    speed: Option<f32>,
}

fn decode_position(line: &str) -> Option<PositionFix> {
    match parse_str(line) {
        Ok(ParseResult::GGA(gga)) => Some(PositionFix {
            time: gga.fix_time?,
            latitude: gga.latitude?,
            longitude: gga.longitude?,
            altitude: gga.altitude,
            satellites: gga.fix_satellites,
        }),
        Ok(_) => None,
        Err(e) => {
            debug!("Skipping malformed GGA sentence {:?}: {:?}", line, e);
            None
        }
    }
}

fn decode_navigation(line: &str) -> Option<NavigationFix> {
    match parse_str(line) {
        Ok(ParseResult::RMC(rmc)) => Some(NavigationFix {
            date: rmc.fix_date?,
            speed: rmc.speed_over_ground,
        }),
        Ok(_) => None,
        Err(e) => {
            debug!("Skipping malformed RMC sentence {:?}: {:?}", line, e);
            None
        }
    }
}

/// Position and time for one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsReport {
    pub time_utc: DateTime<Utc>,
    pub time_local: DateTime<Tz>,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above mean sea level.
    pub altitude: Option<f32>,
    /// Knots.
    pub speed: Option<f32>,
    pub satellites: Option<u32>,
}

impl GpsReport {
    fn combine(position: &PositionFix, navigation: &NavigationFix, zone: Tz) -> Self {
        let time_utc = navigation.date.and_time(position.time).and_utc();
        GpsReport {
            time_utc,
            time_local: time_utc.with_timezone(&zone),
            latitude: position.latitude,
            longitude: position.longitude,
            altitude: position.altitude,
            speed: navigation.speed,
            satellites: position.satellites,
        }
    }
}

/// NMEA receiver on a serial line.
pub struct GpsReceiver<C> {
    channel: C,
    poll_interval: Duration,
    report_timeout: Option<Duration>,
}

impl<C: Channel> GpsReceiver<C> {
    pub fn new(channel: C) -> Self {
        GpsReceiver {
            channel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_timeout: None,
        }
    }

    /// Pause between fix checks, and after empty reads.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bound applied to reports taken through [`PositionSource`].
    pub fn with_report_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.report_timeout = timeout;
        self
    }

    /// Block until a GGA sentence reports fix quality >= 1.
    pub fn wait_for_fix(&mut self, timeout: Duration) -> Result<()> {
        self.channel.discard_input()?;
        let start = Instant::now();

        while start.elapsed() < timeout {
            let raw = read_line(&mut self.channel).map_err(|e| {
                error!("Unexpected error while waiting for GPS fix: {}", e);
                e
            })?;
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            if line.is_empty() {
                thread::sleep(self.poll_interval);
                continue;
            }
            if classify(line) != Some(SentenceKind::Position) {
                continue;
            }

            match parse_str(line) {
                Ok(ParseResult::GGA(gga)) => {
                    let satellites = gga.fix_satellites.unwrap_or(0);
                    if !matches!(gga.fix_type, None | Some(FixType::Invalid)) {
                        info!("GPS fix obtained, satellites used: {}", satellites);
                        return Ok(());
                    }
                    info!(
                        "Waiting for GPS fix... Satellites: {}, Quality: {:?}",
                        satellites, gga.fix_type
                    );
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping malformed GGA sentence {:?}: {:?}", line, e);
                    continue;
                }
            }

            thread::sleep(self.poll_interval);
        }

        error!("GPS fix not acquired.");
        Err(LoggerError::NoFixAcquired { timeout })
    }

    /// Read fresh GGA and RMC sentences and join them into one report.
    ///
    /// Arrival order does not matter and unrelated or malformed lines are
    /// skipped. With `timeout == None` this blocks until a pair arrives.
    pub fn read_report(&mut self, zone: Tz, timeout: Option<Duration>) -> Result<GpsReport> {
        self.channel.discard_input()?;
        let start = Instant::now();
        let mut position = None;
        let mut navigation = None;

        loop {
            if let Some(limit) = timeout {
                if start.elapsed() >= limit {
                    return Err(LoggerError::ReportTimeout { timeout: limit });
                }
            }

            let read_started = Instant::now();
            let raw = read_line(&mut self.channel).map_err(|e| {
                error!("Unexpected error reading GPS data: {}", e);
                e
            })?;
            if raw.is_empty() {
                if let Some(pause) = idle_pause(self.poll_interval, read_started.elapsed()) {
                    thread::sleep(pause);
                }
                continue;
            }
            let line = match String::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    error!("Error decoding GPS data: {}", e);
                    continue;
                }
            };
            let line = line.trim();

            match classify(line) {
                Some(SentenceKind::Position) => {
                    if let Some(fix) = decode_position(line) {
                        position = Some(fix);
                    }
                }
                Some(SentenceKind::Navigation) => {
                    if let Some(fix) = decode_navigation(line) {
                        navigation = Some(fix);
                    }
                }
                None => continue,
            }

            if let (Some(position), Some(navigation)) = (&position, &navigation) {
                return Ok(GpsReport::combine(position, navigation, zone));
            }
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> C {
        self.channel
    }
}

/// How long to pause after an empty read. A read that already blocked for the
/// port timeout has waited long enough.
fn idle_pause(poll_interval: Duration, waited: Duration) -> Option<Duration> {
    poll_interval
        .checked_sub(waited)
        .filter(|pause| !pause.is_zero())
}

impl<C: Channel> PositionSource for GpsReceiver<C> {
    fn acquire_report(&mut self, zone: Tz) -> Result<GpsReport> {
        self.read_report(zone, self.report_timeout)
    }
}
