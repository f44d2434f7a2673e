use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

use crate::integrity::IntegritySignal;

/// Unified event type consumed by the session loop
#[derive(Clone, Debug, PartialEq)]
pub enum ProctorEvent {
    Key(KeyEvent),
    Signal(IntegritySignal),
    Resize,
    Tick,
}

/// Source of loop events (keyboard, environment signals, resize)
pub trait ProctorEventSource: Send + 'static {
    /// Wait at most `timeout` for the next event
    fn recv_timeout(&self, timeout: Duration) -> Result<ProctorEvent, RecvTimeoutError>;
}

/// Tracks terminal transitions that count as integrity signals.
///
/// One signal per transition: losing focus while focused, and shrinking below
/// the starting size while still at full size.
#[derive(Debug, Clone, Copy)]
pub struct SignalTracker {
    full_size: (u16, u16),
    focused: bool,
    fullscreen: bool,
}

impl SignalTracker {
    pub fn new(full_size: (u16, u16)) -> Self {
        Self {
            full_size,
            focused: true,
            fullscreen: true,
        }
    }

    pub fn translate(&mut self, event: CtEvent) -> Option<ProctorEvent> {
        match event {
            CtEvent::Key(key) if key.kind != KeyEventKind::Release => Some(ProctorEvent::Key(key)),
            CtEvent::FocusLost => {
                if self.focused {
                    self.focused = false;
                    Some(ProctorEvent::Signal(IntegritySignal::VisibilityLost))
                } else {
                    None
                }
            }
            CtEvent::FocusGained => {
                self.focused = true;
                None
            }
            CtEvent::Resize(w, h) => {
                let (full_w, full_h) = self.full_size;
                let shrunk = w < full_w || h < full_h;
                if shrunk && self.fullscreen {
                    self.fullscreen = false;
                    Some(ProctorEvent::Signal(IntegritySignal::FullscreenExited))
                } else {
                    if !shrunk {
                        self.fullscreen = true;
                    }
                    Some(ProctorEvent::Resize)
                }
            }
            _ => None,
        }
    }
}

/// Reads crossterm events on a background thread and translates them
pub struct CrosstermEventSource {
    rx: Receiver<ProctorEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let full_size = crossterm::terminal::size().unwrap_or((0, 0));

        std::thread::spawn(move || {
            let mut tracker = SignalTracker::new(full_size);
            loop {
                match event::read() {
                    Ok(ev) => {
                        if let Some(ev) = tracker.translate(ev) {
                            if tx.send(ev).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("terminal event reader stopped: {e}");
                        break;
                    }
                }
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProctorEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ProctorEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Interval after which the loop wakes up without an event
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Event source fed from a channel, for headless runs
pub struct TestEventSource {
    rx: Receiver<ProctorEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ProctorEvent>) -> Self {
        Self { rx }
    }
}

impl ProctorEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ProctorEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the session one event/tick at a time
pub struct Runner<E: ProctorEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: ProctorEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Next event, or `Tick` once the interval passes without one
    pub fn step(&self) -> ProctorEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => ProctorEvent::Tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};
    use std::sync::mpsc;

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(1));
        let runner = Runner::new(es, ticker);

        assert_eq!(runner.step(), ProctorEvent::Tick);
    }

    #[test]
    fn step_passes_through_signals() {
        let (tx, rx) = mpsc::channel();
        tx.send(ProctorEvent::Signal(IntegritySignal::VisibilityLost))
            .unwrap();
        let es = TestEventSource::new(rx);
        let ticker = FixedTicker::new(Duration::from_millis(10));
        let runner = Runner::new(es, ticker);

        assert_eq!(
            runner.step(),
            ProctorEvent::Signal(IntegritySignal::VisibilityLost)
        );
    }

    #[test]
    fn focus_lost_fires_once_per_transition() {
        let mut tracker = SignalTracker::new((80, 24));
        assert_eq!(
            tracker.translate(CtEvent::FocusLost),
            Some(ProctorEvent::Signal(IntegritySignal::VisibilityLost))
        );
        assert_eq!(tracker.translate(CtEvent::FocusLost), None);
        assert_eq!(tracker.translate(CtEvent::FocusGained), None);
        assert_eq!(
            tracker.translate(CtEvent::FocusLost),
            Some(ProctorEvent::Signal(IntegritySignal::VisibilityLost))
        );
    }

    #[test]
    fn shrinking_exits_fullscreen_once() {
        let mut tracker = SignalTracker::new((120, 40));
        assert_eq!(
            tracker.translate(CtEvent::Resize(100, 40)),
            Some(ProctorEvent::Signal(IntegritySignal::FullscreenExited))
        );
        // Still shrunk: plain resize
        assert_eq!(
            tracker.translate(CtEvent::Resize(90, 30)),
            Some(ProctorEvent::Resize)
        );
        // Back to full size re-arms the signal
        assert_eq!(
            tracker.translate(CtEvent::Resize(120, 40)),
            Some(ProctorEvent::Resize)
        );
        assert_eq!(
            tracker.translate(CtEvent::Resize(120, 39)),
            Some(ProctorEvent::Signal(IntegritySignal::FullscreenExited))
        );
    }

    #[test]
    fn growing_is_not_a_violation() {
        let mut tracker = SignalTracker::new((80, 24));
        assert_eq!(
            tracker.translate(CtEvent::Resize(200, 60)),
            Some(ProctorEvent::Resize)
        );
    }

    #[test]
    fn key_presses_pass_through() {
        let mut tracker = SignalTracker::new((80, 24));
        let key = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(
            tracker.translate(CtEvent::Key(key)),
            Some(ProctorEvent::Key(key))
        );
    }
}
