use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serialport::SerialPort;
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt;

use sqm_gps_logger::acquisition::Worker;
use sqm_gps_logger::acquisition::settings::Settings;
use sqm_gps_logger::acquisition::trigger::TriggerSignal;
use sqm_gps_logger::acquisition::writer::RecordWriter;
use sqm_gps_logger::config::LoggerConfig;
use sqm_gps_logger::devices::{GpsReceiver, Sqm};
use sqm_gps_logger::error::Result;
use sqm_gps_logger::shell::{Flow, Shell};

const TEMP_LOG_NAME: &str = "temp.log";
const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Parser, Debug)]
#[command(about = "Sky-quality meter + GPS field logger")]
struct Cli {
    /// Path to the YAML (or .json) configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

/// What the foreground loop reacts to.
enum Event {
    Input(String),
    InputClosed,
    WorkerExited(Result<()>),
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match LoggerConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading {}: {}", cli.config.display(), e);
            return Err(Box::new(e));
        }
    };

    // Set up logging
    let _guard = setup_logging(&config.diagnostics_dir, config.log_level()?);
    info!("Starting application");
    info!("Successfully loaded configuration file {}", cli.config.display());

    if let Err(e) = run(config) {
        error!("Logger stopped: {}", e);
        eprintln!("Logger stopped: {}", e);
        return Err(Box::new(e));
    }

    info!("Program terminated.");
    Ok(())
}

fn run(config: LoggerConfig) -> Result<()> {
    let settings = Arc::new(Settings::new(config.initial_settings()?));
    let snapshot = settings.snapshot();
    info!(
        "Measurements per trigger {}, interval {:?}, extra measurement {}, timezone {}, trigger behavior {}",
        snapshot.measurements_per_trigger,
        snapshot.measurement_interval,
        snapshot.extra_measurement,
        snapshot.local_timezone.name(),
        snapshot.trigger_mode
    );

    let sqm_port = open_port(
        &config.sqm_serial_port,
        config.sqm_baud_rate,
        Duration::from_secs(config.sqm_timeout_secs),
    )?;
    let gps_port = open_port(
        &config.gps_serial_port,
        config.gps_baud_rate,
        Duration::from_secs(config.gps_timeout_secs),
    )?;

    // Fix and first report happen before the worker owns the port.
    let fix_timeout = Duration::from_secs(config.gps_fix_timeout_secs);
    let mut gps = GpsReceiver::new(gps_port)
        .with_report_timeout(config.gps_report_timeout_secs.map(Duration::from_secs));
    gps.wait_for_fix(fix_timeout)?;

    let start = gps.read_report(snapshot.local_timezone, Some(fix_timeout))?;
    let stamp = start.time_local.format(FILE_STAMP_FORMAT).to_string();
    info!("Start time is {}", stamp);

    let diagnostics_path = config.diagnostics_dir.join(format!("{}.log", stamp));
    std::fs::rename(config.diagnostics_dir.join(TEMP_LOG_NAME), &diagnostics_path)?;
    info!(
        "Renamed diagnostic file using GPS timestamp: {}",
        diagnostics_path.display()
    );

    let data_path = config.data_dir.join(format!("{}.csv", stamp));
    let writer = RecordWriter::create(&data_path)?;

    let signal = TriggerSignal::new();
    let worker = Worker::new(
        gps,
        Sqm::new(sqm_port),
        writer,
        Arc::clone(&settings),
        signal.clone(),
    );

    let (events, inbox) = mpsc::channel();
    {
        let events = events.clone();
        thread::Builder::new()
            .name("logging-worker".to_string())
            .spawn(move || {
                let _ = events.send(Event::WorkerExited(worker.run()));
            })?;
    }
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || read_input(events))?;

    let shell = Shell::new(settings, signal.clone(), data_path, diagnostics_path);
    prompt();
    for event in inbox {
        match event {
            Event::Input(line) => {
                let (flow, output) = shell.handle(&line);
                println!("{}", output);
                if flow == Flow::Quit {
                    break;
                }
                prompt();
            }
            Event::InputClosed => {
                info!("Input closed, exiting");
                break;
            }
            Event::WorkerExited(result) => {
                result?;
                break;
            }
        }
    }

    // The worker may be blocked on a serial read; every record is already synced.
    signal.request_shutdown();
    Ok(())
}

fn open_port(path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    match serialport::new(path, baud_rate).timeout(timeout).open() {
        Ok(port) => {
            info!("Successfully opened serial port {} at {} baud", path, baud_rate);
            Ok(port)
        }
        Err(e) => {
            error!("Unexpected error opening serial port {}: {}", path, e);
            Err(e.into())
        }
    }
}

fn read_input(events: mpsc::Sender<Event>) {
    for line in io::stdin().lock().lines() {
        let event = match line {
            Ok(line) => Event::Input(line),
            Err(_) => Event::InputClosed,
        };
        if events.send(event).is_err() {
            return;
        }
    }
    let _ = events.send(Event::InputClosed);
}

fn prompt() {
    print!("Enter command: ");
    let _ = io::stdout().flush();
}

fn setup_logging(dir: &Path, level: Level) -> WorkerGuard {
    // Renamed after the first GPS fix gives us a timestamp.
    let file_appender = rolling::never(dir, TEMP_LOG_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    fmt()
        .with_writer(non_blocking)
        .with_ansi(false) // Disable ANSI colors in log files
        .with_level(true)
        .with_thread_names(true)
        .with_max_level(level)
        .init();

    guard
}
