use chrono::{DateTime, Local};
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen},
};
use serde::Serialize;
use std::io;
use std::sync::{Arc, Mutex};

/// Environment signal that counts as one violation per occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegritySignal {
    VisibilityLost,
    FullscreenExited,
}

impl IntegritySignal {
    fn warning_text(&self) -> &'static str {
        match self {
            IntegritySignal::VisibilityLost => {
                "Switching tabs or windows is not allowed during the quiz."
            }
            IntegritySignal::FullscreenExited => {
                "Exiting full-screen mode is not allowed during the quiz."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub kind: IntegritySignal,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityState {
    pub warning_count: u32,
    pub max_warnings: u32,
    pub violation_log: Vec<Violation>,
}

impl IntegrityState {
    fn new(max_warnings: u32) -> Self {
        Self {
            warning_count: 0,
            max_warnings,
            violation_log: Vec::new(),
        }
    }
}

/// What the monitor made of one signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// Not listening (never started, stopped, or already breached)
    Ignored,
    Warning { count: u32, max: u32, message: String },
    ThresholdBreached { count: u32, max: u32, message: String },
}

/// Capability to listen to the execution environment.
///
/// Signals themselves arrive on the runtime event channel; this trait turns
/// their production on and off and owns the fullscreen mode.
pub trait IntegrityEventSource {
    fn attach(&mut self) -> io::Result<()>;
    fn detach(&mut self) -> io::Result<()>;
    fn enter_fullscreen(&mut self) -> io::Result<()>;
    fn exit_fullscreen(&mut self) -> io::Result<()>;
}

/// Production environment: terminal focus reporting and the alternate screen
#[derive(Debug, Default)]
pub struct TerminalEnvironment;

impl IntegrityEventSource for TerminalEnvironment {
    fn attach(&mut self) -> io::Result<()> {
        execute!(io::stdout(), EnableFocusChange)
    }

    fn detach(&mut self) -> io::Result<()> {
        execute!(io::stdout(), DisableFocusChange)
    }

    fn enter_fullscreen(&mut self) -> io::Result<()> {
        execute!(io::stdout(), EnterAlternateScreen)
    }

    fn exit_fullscreen(&mut self) -> io::Result<()> {
        execute!(io::stdout(), LeaveAlternateScreen)
    }
}

/// Calls observed by a [`SyntheticEnvironment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentCall {
    Attach,
    Detach,
    EnterFullscreen,
    ExitFullscreen,
}

/// Test environment that records calls; fullscreen can be made to fail
#[derive(Debug, Clone, Default)]
pub struct SyntheticEnvironment {
    calls: Arc<Mutex<Vec<EnvironmentCall>>>,
    refuse_fullscreen: bool,
}

impl SyntheticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing_fullscreen() -> Self {
        Self {
            refuse_fullscreen: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<EnvironmentCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: EnvironmentCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl IntegrityEventSource for SyntheticEnvironment {
    fn attach(&mut self) -> io::Result<()> {
        self.record(EnvironmentCall::Attach);
        Ok(())
    }

    fn detach(&mut self) -> io::Result<()> {
        self.record(EnvironmentCall::Detach);
        Ok(())
    }

    fn enter_fullscreen(&mut self) -> io::Result<()> {
        if self.refuse_fullscreen {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "fullscreen refused",
            ));
        }
        self.record(EnvironmentCall::EnterFullscreen);
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> io::Result<()> {
        self.record(EnvironmentCall::ExitFullscreen);
        Ok(())
    }
}

/// Counts violations up to a threshold and reports the breach once
pub struct IntegrityMonitor {
    environment: Box<dyn IntegrityEventSource>,
    state: IntegrityState,
    listening: bool,
    attached: bool,
    fullscreen: bool,
    started: bool,
}

impl std::fmt::Debug for IntegrityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityMonitor")
            .field("state", &self.state)
            .field("listening", &self.listening)
            .field("attached", &self.attached)
            .field("fullscreen", &self.fullscreen)
            .finish()
    }
}

impl IntegrityMonitor {
    pub fn new(environment: Box<dyn IntegrityEventSource>) -> Self {
        Self {
            environment,
            state: IntegrityState::new(0),
            listening: false,
            attached: false,
            fullscreen: false,
            started: false,
        }
    }

    /// Begin counting; a threshold of zero is treated as one
    pub fn start(&mut self, max_warnings: u32) {
        let max_warnings = max_warnings.max(1);
        self.state = IntegrityState::new(max_warnings);
        self.started = true;

        match self.environment.enter_fullscreen() {
            Ok(()) => self.fullscreen = true,
            Err(e) => tracing::warn!("could not enter fullscreen mode: {e}"),
        }
        match self.environment.attach() {
            Ok(()) => self.attached = true,
            Err(e) => tracing::warn!("could not enable focus reporting: {e}"),
        }
        self.listening = true;
        tracing::debug!(max_warnings, "integrity monitor started");
    }

    pub fn observe(&mut self, signal: IntegritySignal, at: DateTime<Local>) -> MonitorOutcome {
        if !self.listening {
            tracing::trace!(%signal, "signal ignored, monitor not listening");
            return MonitorOutcome::Ignored;
        }

        self.state.warning_count += 1;
        self.state.violation_log.push(Violation { kind: signal, at });

        let count = self.state.warning_count;
        let max = self.state.max_warnings;
        let message = format!("Warning {count}/{max}: {}", signal.warning_text());
        tracing::warn!(%signal, count, max, "integrity violation");

        if count >= max {
            self.listening = false;
            self.detach();
            MonitorOutcome::ThresholdBreached {
                count,
                max,
                message,
            }
        } else {
            MonitorOutcome::Warning {
                count,
                max,
                message,
            }
        }
    }

    fn detach(&mut self) {
        if self.attached {
            if let Err(e) = self.environment.detach() {
                tracing::warn!("could not disable focus reporting: {e}");
            }
            self.attached = false;
        }
    }

    /// Stop counting and detach listeners. Idempotent.
    pub fn stop(&mut self) {
        self.listening = false;
        self.detach();
    }

    /// Leave the fullscreen mode entered by `start`, if any. Idempotent.
    pub fn exit_fullscreen(&mut self) {
        if self.fullscreen {
            if let Err(e) = self.environment.exit_fullscreen() {
                tracing::warn!("could not leave fullscreen mode: {e}");
            }
            self.fullscreen = false;
        }
    }

    pub fn state(&self) -> &IntegrityState {
        &self.state
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn has_breached(&self) -> bool {
        self.started && self.state.warning_count >= self.state.max_warnings
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        self.stop();
        self.exit_fullscreen();
    }
}
