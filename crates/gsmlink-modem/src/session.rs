//! Modem session state and the pure transitions the dispatch loop applies
//! to it.
//!
//! Nothing here performs I/O. [`Session`] records what the engine currently
//! believes about the modem; the transition methods return what the caller
//! has to do next (power the modem off, drop a message, emit an event).

use gsmlink_core::SignalLevel;

/// Result of recording a keepalive outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveOutcome {
    /// The modem answered and nothing was wrong before.
    Healthy,
    /// The modem answered after the fatal state had been entered.
    Recovered,
    /// The modem did not answer; still within the tolerated failures.
    Failed { consecutive: u32 },
    /// The failure threshold was just exceeded. The caller must power the
    /// modem off.
    EnteredFatal,
    /// Still failing while already fatal.
    StillFatal,
}

/// Result of recording a failed outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendDecision {
    /// Wait for the backoff to expire, then try again.
    Retry { remaining: u32 },
    /// The retry budget is spent; drop the message.
    Drop,
}

/// Everything the engine knows about the modem between ticks.
///
/// Reset to defaults on every (re)initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Registered on the network (after any settle delay).
    pub registered: bool,
    /// A registration report is waiting out its settle delay.
    pub registration_pending: bool,
    pub signal: SignalLevel,
    pub phonebook_ready: bool,
    pub keepalive_failures: u32,
    pub fatal: bool,
    /// Attempts left for the outbound head while a backoff is in effect;
    /// `None` when no backoff is running.
    pub resend_remaining: Option<u32>,
}

impl Session {
    pub fn reset(&mut self) {
        *self = Session::default();
    }

    /// Whether an outbound backoff cycle is in effect.
    pub fn resend_pending(&self) -> bool {
        self.resend_remaining.is_some()
    }

    /// Fold a keepalive result into the failure counter.
    ///
    /// The fatal state is entered once, on the failure that exceeds
    /// `threshold`; any later success leaves it.
    pub fn record_keepalive(&mut self, answered: bool, threshold: u32) -> KeepaliveOutcome {
        if answered {
            let was_fatal = self.fatal;
            self.keepalive_failures = 0;
            self.fatal = false;
            return if was_fatal {
                KeepaliveOutcome::Recovered
            } else {
                KeepaliveOutcome::Healthy
            };
        }

        self.keepalive_failures = self.keepalive_failures.saturating_add(1);
        if self.keepalive_failures <= threshold {
            KeepaliveOutcome::Failed {
                consecutive: self.keepalive_failures,
            }
        } else if self.fatal {
            KeepaliveOutcome::StillFatal
        } else {
            self.fatal = true;
            KeepaliveOutcome::EnteredFatal
        }
    }

    /// Fold a failed send of the outbound head into the backoff state.
    ///
    /// `retry_count` is the total number of attempts a message gets: the
    /// first failure starts the backoff and the `retry_count`-th drops it.
    pub fn record_send_failure(&mut self, retry_count: u32) -> ResendDecision {
        let remaining = match self.resend_remaining {
            None => retry_count.saturating_sub(1),
            Some(remaining) => remaining.saturating_sub(1),
        };
        if remaining == 0 {
            self.resend_remaining = None;
            ResendDecision::Drop
        } else {
            self.resend_remaining = Some(remaining);
            ResendDecision::Retry { remaining }
        }
    }

    /// The outbound head was sent; leave any backoff.
    pub fn record_send_success(&mut self) {
        self.resend_remaining = None;
    }

    /// Update the signal level from a `+CIEV` value. Returns `true` if the
    /// level changed.
    pub fn record_signal(&mut self, raw: i32) -> bool {
        let level = SignalLevel::from_raw(raw);
        let changed = level != self.signal;
        self.signal = level;
        changed
    }
}
