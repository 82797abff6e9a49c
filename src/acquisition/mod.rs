pub mod data;
pub mod settings;
pub mod trigger;
pub mod writer;

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono_tz::Tz;
use tracing::{debug, error, info};

use crate::devices::{BrightnessMeter, PositionSource};
use crate::error::Result;
use data::Record;
use settings::Settings;
use trigger::{Transition, TriggerMachine, TriggerSignal, Wake};
use writer::RecordWriter;

/// The background acquisition loop.
///
/// Owns both instruments and the data file once started.
pub struct Worker<G, M> {
    gps: G,
    meter: M,
    writer: RecordWriter,
    settings: Arc<Settings>,
    signal: TriggerSignal,
    trigger_id: u32,
}

impl<G: PositionSource, M: BrightnessMeter> Worker<G, M> {
    pub fn new(
        gps: G,
        meter: M,
        writer: RecordWriter,
        settings: Arc<Settings>,
        signal: TriggerSignal,
    ) -> Self {
        Worker {
            gps,
            meter,
            writer,
            settings,
            signal,
            trigger_id: 0,
        }
    }

    /// Run until shutdown is requested or an instrument/storage error occurs.
    pub fn run(mut self) -> Result<()> {
        self.initialize()?;
        self.serve()
    }

    /// Drop any stale pulse and start the file.
    pub fn initialize(&mut self) -> Result<()> {
        self.signal.clear();
        self.writer.write_header()
    }

    /// Wait for pulses and run them. Shutdown is only noticed here, between
    /// trigger runs.
    pub fn serve(mut self) -> Result<()> {
        let result = self.serve_until_shutdown();
        self.settings.set_logging_active(false);
        match result {
            Ok(()) => self.writer.close(),
            Err(e) => {
                error!("Unexpected error in logging worker: {}", e);
                Err(e)
            }
        }
    }

    fn serve_until_shutdown(&mut self) -> Result<()> {
        loop {
            match self.signal.wait() {
                Wake::Triggered => self.run_trigger()?,
                Wake::Shutdown => {
                    info!("Logging worker shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Handle one consumed trigger pulse: one or more cycles, depending on mode.
    pub fn run_trigger(&mut self) -> Result<()> {
        // Settings changes apply from the next trigger on.
        let settings = self.settings.snapshot();
        let mut machine = TriggerMachine::new(settings.trigger_mode);
        if machine.trigger() != Transition::Start {
            return Ok(());
        }

        self.settings.set_logging_active(true);
        info!(
            "Trigger {} started ({} mode, {} measurements per cycle)",
            self.trigger_id, settings.trigger_mode, settings.measurements_per_trigger
        );
        let mut measurement_id = 0;

        loop {
            // Lets the meter's temperature compensation settle; the reading is thrown away.
            if settings.extra_measurement {
                let _ = self.meter.read_brightness()?;
                debug!("Discarded extra SQM reading");
            }

            for _ in 0..settings.measurements_per_trigger {
                self.log_measurement(measurement_id, settings.local_timezone)?;
                measurement_id += 1;
                thread::sleep(settings.measurement_interval);
            }

            self.trigger_id += 1;

            if !machine.cycle_complete(self.signal.is_set()) {
                break;
            }
        }

        info!("Trigger run finished, next trigger id {}", self.trigger_id);
        self.settings.set_logging_active(false);
        self.signal.clear();
        Ok(())
    }

    fn log_measurement(&mut self, measurement_id: u32, zone: Tz) -> Result<()> {
        let start = Instant::now();
        let gps = self.gps.acquire_report(zone)?;
        let gps_done = Instant::now();
        let sqm = self.meter.read_brightness()?;
        let sqm_done = Instant::now();

        let record = Record {
            gps,
            sqm,
            trigger_id: self.trigger_id,
            measurement_id,
            gps_latency: gps_done - start,
            sqm_latency: sqm_done - gps_done,
        };
        self.writer.write_record(&record)?;
        info!("Logged SQM & GPS data.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::data::testing::{sample_reading, sample_report};
    use super::settings::{SettingsSnapshot, TriggerMode};
    use super::*;
    use crate::devices::{GpsReport, SqmReading};
    use crate::error::LoggerError;
    use std::fs;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Hands out canned reports and fires trigger pulses on chosen calls.
    struct FakeGps {
        calls: usize,
        pulse_on: Vec<usize>,
        signal: TriggerSignal,
    }

    impl PositionSource for FakeGps {
        fn acquire_report(&mut self, zone: Tz) -> Result<GpsReport> {
            self.calls += 1;
            if self.pulse_on.contains(&self.calls) {
                self.signal.set();
            }
            let mut report = sample_report();
            report.time_local = report.time_utc.with_timezone(&zone);
            Ok(report)
        }
    }

    struct FakeMeter {
        queries: Arc<AtomicUsize>,
        fail_after: Option<usize>,
    }

    impl BrightnessMeter for FakeMeter {
        fn read_brightness(&mut self) -> Result<SqmReading> {
            let n = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_after.is_some_and(|limit| n > limit) {
                return Err(LoggerError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "SQM unplugged",
                )));
            }
            Ok(sample_reading())
        }
    }

    struct Rig {
        _dir: TempDir,
        path: std::path::PathBuf,
        signal: TriggerSignal,
        settings: Arc<Settings>,
        queries: Arc<AtomicUsize>,
        worker: Worker<FakeGps, FakeMeter>,
    }

    fn rig(initial: SettingsSnapshot, pulse_on: Vec<usize>) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let signal = TriggerSignal::new();
        let settings = Arc::new(Settings::new(initial));
        let queries = Arc::new(AtomicUsize::new(0));
        let worker = Worker::new(
            FakeGps {
                calls: 0,
                pulse_on,
                signal: signal.clone(),
            },
            FakeMeter {
                queries: Arc::clone(&queries),
                fail_after: None,
            },
            RecordWriter::create(&path).unwrap(),
            Arc::clone(&settings),
            signal.clone(),
        );
        Rig {
            _dir: dir,
            path,
            signal,
            settings,
            queries,
            worker,
        }
    }

    /// (trigger_id, measurement_id) of every data line.
    fn ids(path: &Path) -> Vec<(u32, u32)> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[12].parse().unwrap(), r[13].parse().unwrap())
            })
            .collect()
    }

    fn snapshot(mode: TriggerMode, per_trigger: u32, extra: bool) -> SettingsSnapshot {
        SettingsSnapshot {
            measurements_per_trigger: per_trigger,
            extra_measurement: extra,
            trigger_mode: mode,
            ..SettingsSnapshot::default()
        }
    }

    #[test]
    fn single_mode_one_cycle_despite_extra_pulses() {
        let mut rig = rig(snapshot(TriggerMode::Single, 3, false), vec![1, 2]);
        rig.worker.initialize().unwrap();
        rig.signal.set();
        rig.signal.request_shutdown();
        rig.worker.serve().unwrap();

        assert_eq!(ids(&rig.path), vec![(0, 0), (0, 1), (0, 2)]);
        assert!(!rig.settings.is_logging_active());
    }

    #[test]
    fn continuous_mode_finishes_in_flight_cycle_then_stops() {
        // Pulse arrives during the first measurement of the third cycle.
        let mut rig = rig(snapshot(TriggerMode::ToggleContinuous, 2, false), vec![5]);
        rig.worker.initialize().unwrap();
        rig.worker.run_trigger().unwrap();

        assert_eq!(
            ids(&rig.path),
            vec![(0, 0), (0, 1), (1, 2), (1, 3), (2, 4), (2, 5)]
        );
        assert!(!rig.signal.is_set());
        assert!(!rig.settings.is_logging_active());
    }

    #[test]
    fn ids_across_triggers() {
        let mut rig = rig(snapshot(TriggerMode::Single, 2, false), vec![]);
        rig.worker.initialize().unwrap();
        rig.worker.run_trigger().unwrap();
        rig.worker.run_trigger().unwrap();

        rig.settings.set_trigger_mode(TriggerMode::ToggleContinuous);
        rig.settings.set_measurements_per_trigger(1);
        rig.worker.gps.pulse_on = vec![7];
        rig.worker.run_trigger().unwrap();

        assert_eq!(
            ids(&rig.path),
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (3, 1), (4, 2)]
        );
    }

    #[test]
    fn extra_measurement_adds_one_query_per_cycle() {
        let mut rig = rig(snapshot(TriggerMode::ToggleContinuous, 2, true), vec![3]);
        rig.worker.initialize().unwrap();
        rig.worker.run_trigger().unwrap();

        // Two cycles of (1 extra + 2 recorded).
        assert_eq!(rig.queries.load(Ordering::SeqCst), 6);
        assert_eq!(ids(&rig.path).len(), 4);
    }

    #[test]
    fn instrument_failure_stops_worker() {
        let mut rig = rig(snapshot(TriggerMode::Single, 3, false), vec![]);
        rig.worker.meter.fail_after = Some(1);
        rig.worker.initialize().unwrap();
        rig.signal.set();

        let result = rig.worker.serve();
        assert!(matches!(result, Err(LoggerError::Io(_))));
        assert!(!rig.settings.is_logging_active());

        // Header plus the record taken before the failure.
        let contents = fs::read_to_string(&rig.path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn runs_on_its_own_thread() {
        let rig = rig(snapshot(TriggerMode::Single, 1, false), vec![]);
        let signal = rig.signal.clone();
        let settings = Arc::clone(&rig.settings);
        let handle = thread::spawn(move || rig.worker.run());

        // Wait for the header so the pulse is not cleared by start-up.
        while fs::read_to_string(&rig.path).map(|c| c.is_empty()).unwrap_or(true) {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        signal.set();
        while fs::read_to_string(&rig.path).unwrap().lines().count() < 2 {
            thread::sleep(std::time::Duration::from_millis(5));
        }
        signal.request_shutdown();
        handle.join().unwrap().unwrap();
        assert!(!settings.is_logging_active());
        assert_eq!(ids(&rig.path), vec![(0, 0)]);
    }
}
