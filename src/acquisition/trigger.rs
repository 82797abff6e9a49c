use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::settings::TriggerMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Running,
}

impl TriggerState {
    pub fn from_logging_active(active: bool) -> Self {
        if active {
            TriggerState::Running
        } else {
            TriggerState::Idle
        }
    }

    /// What a trigger pulse means in this state.
    pub fn on_trigger(self, mode: TriggerMode) -> Transition {
        match (self, mode) {
            (TriggerState::Idle, _) => Transition::Start,
            (TriggerState::Running, TriggerMode::ToggleContinuous) => Transition::Stop,
            (TriggerState::Running, TriggerMode::Single) => Transition::Ignore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle -> Running.
    Start,
    /// Running -> Idle once the in-flight cycle has finished.
    Stop,
    /// Stay as we are.
    Ignore,
}

/// Tracks one trigger run on the worker side.
///
/// Stops are cooperative: they are only looked at between cycles.
#[derive(Debug)]
pub struct TriggerMachine {
    state: TriggerState,
    mode: TriggerMode,
}

impl TriggerMachine {
    pub fn new(mode: TriggerMode) -> Self {
        TriggerMachine {
            state: TriggerState::Idle,
            mode,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn trigger(&mut self) -> Transition {
        let transition = self.state.on_trigger(self.mode);
        match transition {
            Transition::Start => self.state = TriggerState::Running,
            Transition::Stop => self.state = TriggerState::Idle,
            Transition::Ignore => {}
        }
        transition
    }

    /// Called after each cycle. Returns whether another cycle should run.
    pub fn cycle_complete(&mut self, pulse_pending: bool) -> bool {
        if pulse_pending {
            self.trigger();
        }
        if self.mode == TriggerMode::Single {
            self.state = TriggerState::Idle;
        }
        self.state == TriggerState::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Triggered,
    Shutdown,
}

#[derive(Debug, Default)]
struct SignalState {
    pending: bool,
    shutdown: bool,
}

/// Single-slot, edge-triggered wake-up for the acquisition worker.
///
/// Setting it again before the worker consumes it has no extra effect.
#[derive(Debug, Clone, Default)]
pub struct TriggerSignal {
    inner: Arc<(Mutex<SignalState>, Condvar)>,
}

impl TriggerSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self) {
        self.lock().pending = true;
        self.inner.1.notify_all();
    }

    pub fn clear(&self) {
        self.lock().pending = false;
    }

    pub fn is_set(&self) -> bool {
        self.lock().pending
    }

    /// Ask the worker to exit next time it waits for a trigger.
    pub fn request_shutdown(&self) {
        self.lock().shutdown = true;
        self.inner.1.notify_all();
    }

    /// Block until a trigger is pending and consume it. A pending trigger
    /// wins over a shutdown request.
    pub fn wait(&self) -> Wake {
        let mut state = self.lock();
        loop {
            if state.pending {
                state.pending = false;
                return Wake::Triggered;
            }
            if state.shutdown {
                return Wake::Shutdown;
            }
            state = self
                .inner
                .1
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn transition_table() {
        use TriggerMode::*;
        assert_eq!(TriggerState::Idle.on_trigger(Single), Transition::Start);
        assert_eq!(TriggerState::Idle.on_trigger(ToggleContinuous), Transition::Start);
        assert_eq!(TriggerState::Running.on_trigger(ToggleContinuous), Transition::Stop);
        assert_eq!(TriggerState::Running.on_trigger(Single), Transition::Ignore);
    }

    #[test]
    fn single_runs_one_cycle_even_with_pulses() {
        let mut machine = TriggerMachine::new(TriggerMode::Single);
        assert_eq!(machine.trigger(), Transition::Start);
        assert_eq!(machine.trigger(), Transition::Ignore);
        assert!(!machine.cycle_complete(true));
        assert_eq!(machine.state(), TriggerState::Idle);
    }

    #[test]
    fn continuous_runs_until_pulse() {
        let mut machine = TriggerMachine::new(TriggerMode::ToggleContinuous);
        assert_eq!(machine.trigger(), Transition::Start);
        assert!(machine.cycle_complete(false));
        assert!(machine.cycle_complete(false));
        assert!(!machine.cycle_complete(true));
        assert_eq!(machine.state(), TriggerState::Idle);
    }

    #[test]
    fn repeated_sets_collapse() {
        let signal = TriggerSignal::new();
        signal.set();
        signal.set();
        signal.set();
        assert_eq!(signal.wait(), Wake::Triggered);
        assert!(!signal.is_set());
        signal.request_shutdown();
        assert_eq!(signal.wait(), Wake::Shutdown);
    }

    #[test]
    fn pending_trigger_beats_shutdown() {
        let signal = TriggerSignal::new();
        signal.request_shutdown();
        signal.set();
        assert_eq!(signal.wait(), Wake::Triggered);
        assert_eq!(signal.wait(), Wake::Shutdown);
    }

    #[test]
    fn wakes_waiting_thread() {
        let signal = TriggerSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait())
        };
        thread::sleep(Duration::from_millis(50));
        signal.set();
        assert_eq!(waiter.join().unwrap(), Wake::Triggered);
    }

    #[test]
    fn clear_drops_pending_pulse() {
        let signal = TriggerSignal::new();
        signal.set();
        signal.clear();
        assert!(!signal.is_set());
    }
}
