use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::acquisition::settings::Settings;
use crate::acquisition::trigger::{Transition, TriggerSignal, TriggerState};

pub const HELP: &str = "Unknown command. Use one of the following:
t - trigger measurement
m - toggle trigger behavior mode (single measurement or toggle continuous mode)
x - toggle extra measurement (to account for temperature error)
n<number> - set number of measurements per trigger
i<number> - set interval between measurements in seconds
data<number> - print the last N lines from the data file
diag<number> - print the last N lines from the diagnostic file
s - show current settings
q - quit the program";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Trigger,
    ToggleMode,
    ToggleExtraMeasurement,
    SetMeasurementsPerTrigger(u32),
    SetInterval(Duration),
    TailData(usize),
    TailDiagnostics(usize),
    ShowSettings,
    Quit,
}

impl Command {
    /// Parse one line of operator input. `None` for anything unrecognised
    /// or out of range.
    pub fn parse(input: &str) -> Option<Command> {
        let input = input.trim().to_ascii_lowercase();
        let command = match input.as_str() {
            "t" => Command::Trigger,
            "m" => Command::ToggleMode,
            "x" => Command::ToggleExtraMeasurement,
            "s" => Command::ShowSettings,
            "q" => Command::Quit,
            _ => {
                if let Some(n) = input.strip_prefix("data") {
                    Command::TailData(n.parse().ok()?)
                } else if let Some(n) = input.strip_prefix("diag") {
                    Command::TailDiagnostics(n.parse().ok()?)
                } else if let Some(n) = input.strip_prefix('n') {
                    match n.parse::<u32>().ok()? {
                        0 => return None,
                        n => Command::SetMeasurementsPerTrigger(n),
                    }
                } else if let Some(secs) = input.strip_prefix('i') {
                    // Rejects negative, NaN and values too large for a Duration.
                    let secs = secs.parse::<f64>().ok()?;
                    Command::SetInterval(Duration::try_from_secs_f64(secs).ok()?)
                } else {
                    return None;
                }
            }
        };
        Some(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The foreground side: everything the operator can touch.
pub struct Shell {
    settings: Arc<Settings>,
    signal: TriggerSignal,
    data_path: PathBuf,
    diagnostics_path: PathBuf,
}

impl Shell {
    pub fn new(
        settings: Arc<Settings>,
        signal: TriggerSignal,
        data_path: PathBuf,
        diagnostics_path: PathBuf,
    ) -> Self {
        Shell {
            settings,
            signal,
            data_path,
            diagnostics_path,
        }
    }

    /// Run one line of input and return the text to show the operator.
    pub fn handle(&self, input: &str) -> (Flow, String) {
        let Some(command) = Command::parse(input) else {
            return (Flow::Continue, HELP.to_string());
        };

        let output = match command {
            Command::Trigger => {
                let state = TriggerState::from_logging_active(self.settings.is_logging_active());
                let outcome = match state.on_trigger(self.settings.trigger_mode()) {
                    Transition::Start => "Trigger received, starting measurements",
                    Transition::Stop => "Trigger received, stopping after the current cycle",
                    Transition::Ignore => "Trigger ignored, a single measurement is in progress",
                };
                self.signal.set();
                info!("{}", outcome);
                outcome.to_string()
            }
            Command::ToggleMode => {
                let mode = self.settings.toggle_trigger_mode();
                info!("Trigger behavior set to {}", mode);
                format!("Trigger behavior set to {}", mode)
            }
            Command::ToggleExtraMeasurement => {
                let enabled = self.settings.toggle_extra_measurement();
                let state = if enabled { "enabled" } else { "disabled" };
                info!("Extra measurement set to {}", state);
                format!("Extra measurement set to {}", state)
            }
            Command::SetMeasurementsPerTrigger(n) => {
                self.settings.set_measurements_per_trigger(n);
                info!("User set measurements per trigger to {}", n);
                format!("Measurements per trigger set to {}", n)
            }
            Command::SetInterval(interval) => {
                self.settings.set_measurement_interval(interval);
                info!("User set measurement interval to {:?}", interval);
                format!("Measurement interval set to {} seconds", interval.as_secs_f64())
            }
            Command::TailData(n) => tail(&self.data_path, n).replace(',', ", "),
            Command::TailDiagnostics(n) => tail(&self.diagnostics_path, n),
            Command::ShowSettings => self.describe_settings(),
            Command::Quit => {
                info!("User requested to quit the program.");
                return (Flow::Quit, "Exiting program...".to_string());
            }
        };

        (Flow::Continue, output)
    }

    fn describe_settings(&self) -> String {
        let s = self.settings.snapshot();
        format!(
            "Measurements per trigger: {}\n\
             Measurement interval: {} seconds\n\
             Extra measurement: {}\n\
             Trigger behavior mode: {}\n\
             Local timezone: {}\n\
             Currently logging: {}",
            s.measurements_per_trigger,
            s.measurement_interval.as_secs_f64(),
            if s.extra_measurement { "Yes" } else { "No" },
            s.trigger_mode,
            s.local_timezone.name(),
            if s.logging_active { "Yes" } else { "No" },
        )
    }
}

fn tail(path: &Path, n: usize) -> String {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let lines: Vec<&str> = contents.lines().collect();
            lines[lines.len().saturating_sub(n)..].join("\n")
        }
        Err(e) => format!("Could not read {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::settings::TriggerMode;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse(" T \n"), Some(Command::Trigger));
        assert_eq!(Command::parse("m"), Some(Command::ToggleMode));
        assert_eq!(Command::parse("x"), Some(Command::ToggleExtraMeasurement));
        assert_eq!(Command::parse("n10"), Some(Command::SetMeasurementsPerTrigger(10)));
        assert_eq!(
            Command::parse("i2.5"),
            Some(Command::SetInterval(Duration::from_millis(2500)))
        );
        assert_eq!(Command::parse("i0"), Some(Command::SetInterval(Duration::ZERO)));
        assert_eq!(Command::parse("data5"), Some(Command::TailData(5)));
        assert_eq!(Command::parse("DIAG20"), Some(Command::TailDiagnostics(20)));
        assert_eq!(Command::parse("s"), Some(Command::ShowSettings));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
    }

    #[test]
    fn rejects_bad_input() {
        for input in [
            "", "z", "n", "n0", "n-3", "i-1", "i1e300", "iNaN", "ifast", "data", "diagx", "tt",
        ] {
            assert_eq!(Command::parse(input), None, "{:?}", input);
        }
    }

    fn shell(dir: &tempfile::TempDir) -> (Shell, Arc<Settings>, TriggerSignal) {
        let settings = Arc::new(Settings::default());
        let signal = TriggerSignal::new();
        let shell = Shell::new(
            Arc::clone(&settings),
            signal.clone(),
            dir.path().join("data.csv"),
            dir.path().join("temp.log"),
        );
        (shell, settings, signal)
    }

    #[test]
    fn commands_update_settings_and_signal() {
        let dir = tempfile::tempdir().unwrap();
        let (shell, settings, signal) = shell(&dir);

        assert_eq!(shell.handle("m").0, Flow::Continue);
        assert_eq!(settings.trigger_mode(), TriggerMode::ToggleContinuous);
        shell.handle("x");
        assert!(!settings.is_extra_measurement_enabled());
        shell.handle("n4");
        assert_eq!(settings.measurements_per_trigger(), 4);
        shell.handle("i3");
        assert_eq!(settings.measurement_interval(), Duration::from_secs(3));

        assert!(!signal.is_set());
        let (_, text) = shell.handle("t");
        assert!(signal.is_set());
        assert!(text.contains("starting"));

        settings.set_logging_active(true);
        let (_, text) = shell.handle("t");
        assert!(text.contains("stopping"));

        assert_eq!(shell.handle("q").0, Flow::Quit);
        let (flow, text) = shell.handle("bogus");
        assert_eq!(flow, Flow::Continue);
        assert_eq!(text, HELP);
    }

    #[test]
    fn tails_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let (shell, _, _) = shell(&dir);
        fs::write(dir.path().join("data.csv"), "a,b\n1,2\n3,4\n").unwrap();

        assert_eq!(shell.handle("data2").1, "1, 2\n3, 4");
        assert_eq!(shell.handle("data10").1, "a, b\n1, 2\n3, 4");
        assert!(shell.handle("diag1").1.starts_with("Could not read"));
    }
}
