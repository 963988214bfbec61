//! Network status LED.
//!
//! The LED is off while unregistered and steadily on while registered with
//! an unknown signal level. With a known level it blinks once per bar every
//! cadence interval. Blinking is a state machine advanced by each dispatch
//! tick, so a tick never sleeps for the blink sequence.

use std::time::Duration;

use tracing::warn;

use gsmlink_core::{Deadline, OutputPin, SharedClock, SignalLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Between blink bursts.
    Idle,
    /// LED lit; `remaining` blinks left including this one.
    On { remaining: u8 },
    /// LED dark after a blink; `remaining` blinks still to come.
    Off { remaining: u8 },
}

/// Drives the network LED from registration and signal state.
pub struct NetworkIndicator {
    pin: Box<dyn OutputPin>,
    cadence: Deadline,
    step: Deadline,
    on_time: Duration,
    off_time: Duration,
    phase: Phase,
    /// Last level written, to avoid rewriting the pin every tick.
    level: Option<bool>,
}

impl NetworkIndicator {
    pub fn new(
        pin: Box<dyn OutputPin>,
        clock: SharedClock,
        interval: Duration,
        on_time: Duration,
        off_time: Duration,
    ) -> Self {
        NetworkIndicator {
            pin,
            cadence: Deadline::armed(clock.clone(), interval),
            step: Deadline::new(clock),
            on_time,
            off_time,
            phase: Phase::Idle,
            level: None,
        }
    }

    /// Restart the cadence interval from now.
    pub fn restart(&mut self) {
        self.cadence.reset();
    }

    /// Whether a blink burst is in progress.
    pub fn is_blinking(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Advance the LED for the current state.
    pub fn update(&mut self, registered: bool, signal: SignalLevel) {
        let bars = match (registered, signal) {
            (false, _) => {
                self.phase = Phase::Idle;
                self.drive(false);
                return;
            }
            (true, SignalLevel::Unknown) => {
                self.phase = Phase::Idle;
                self.drive(true);
                return;
            }
            (true, SignalLevel::Bars(bars)) => bars,
        };

        match self.phase {
            Phase::Idle => {
                if self.cadence.is_expired() {
                    self.cadence.reset();
                    if bars > 0 {
                        self.blink_on(bars);
                    }
                }
            }
            Phase::On { remaining } => {
                if self.step.is_expired() {
                    self.drive(false);
                    self.step.set(self.off_time);
                    self.phase = Phase::Off {
                        remaining: remaining.saturating_sub(1),
                    };
                }
            }
            Phase::Off { remaining } => {
                if self.step.is_expired() {
                    if remaining > 0 {
                        self.blink_on(remaining);
                    } else {
                        self.phase = Phase::Idle;
                    }
                }
            }
        }
    }

    fn blink_on(&mut self, remaining: u8) {
        self.drive(true);
        self.step.set(self.on_time);
        self.phase = Phase::On { remaining };
    }

    fn drive(&mut self, high: bool) {
        if self.level == Some(high) {
            return;
        }
        match self.pin.set_level(high) {
            Ok(()) => self.level = Some(high),
            Err(e) => warn!(error = %e, "failed to drive network indicator"),
        }
    }
}
