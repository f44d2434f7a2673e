use std::time::Duration;

const ONE_SECOND: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Remaining whole seconds after this tick
    Tick(u64),
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Running,
    Expired,
    Stopped,
}

/// Countdown driven by the event loop.
///
/// The loop reports elapsed wall time through [`CountdownTimer::advance`];
/// every whole second produces one `Tick`, and reaching zero produces a single
/// `Expired` after which the timer is inert.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    remaining: u64,
    carry: Duration,
    state: TimerState,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self {
            remaining: 0,
            carry: Duration::ZERO,
            state: TimerState::Idle,
        }
    }

    pub fn start(&mut self, total_secs: u64) {
        self.remaining = total_secs;
        self.carry = Duration::ZERO;
        self.state = TimerState::Running;
    }

    pub fn advance(&mut self, elapsed: Duration) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        if self.state != TimerState::Running {
            return events;
        }

        if self.remaining == 0 {
            self.expire(&mut events);
            return events;
        }

        self.carry += elapsed;
        while self.state == TimerState::Running && self.carry >= ONE_SECOND {
            self.carry -= ONE_SECOND;
            self.remaining -= 1;
            events.push(TimerEvent::Tick(self.remaining));
            if self.remaining == 0 {
                self.expire(&mut events);
            }
        }
        events
    }

    fn expire(&mut self, events: &mut Vec<TimerEvent>) {
        self.state = TimerState::Expired;
        self.carry = Duration::ZERO;
        events.push(TimerEvent::Expired);
    }

    /// Cancel pending ticks. Safe to call repeatedly or after expiry.
    pub fn stop(&mut self) {
        if self.state == TimerState::Running {
            self.state = TimerState::Stopped;
        }
        self.carry = Duration::ZERO;
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn has_expired(&self) -> bool {
        self.state == TimerState::Expired
    }
}
