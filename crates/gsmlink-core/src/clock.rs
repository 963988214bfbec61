//! Wraparound-safe millisecond timing.
//!
//! The engine never reads a clock directly. Every timed activity (keepalive,
//! resend backoff, registration settle delay, indicator cadence) owns a
//! [`Deadline`], and the deadline is the only place the fixed-width counter
//! wrapping past `u32::MAX` is handled.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A monotonic millisecond counter of fixed width.
///
/// The counter is allowed to wrap; consumers must go through [`elapsed_ms`]
/// (or a [`Deadline`]) rather than subtracting raw readings.
pub trait Clock: Send + Sync {
    /// Current counter value in milliseconds.
    fn now_ms(&self) -> u32;
}

/// A clock shared between the engine and its deadlines.
pub type SharedClock = Arc<dyn Clock>;

/// [`Clock`] backed by tokio's monotonic [`Instant`](tokio::time::Instant).
///
/// Reading tokio's clock (rather than `std::time::Instant`) means paused-time
/// tests drive every deadline through `tokio::time::advance`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Create a clock whose counter starts at zero now.
    pub fn new() -> Self {
        TokioClock {
            origin: tokio::time::Instant::now(),
        }
    }

    /// Create a new clock wrapped for sharing.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u32 {
        // Truncate to the counter width; wrapping is expected.
        (self.origin.elapsed().as_millis() & u128::from(u32::MAX)) as u32
    }
}

/// Milliseconds elapsed from `start` to `now` on a wrapping `u32` counter.
///
/// If `now` is behind `start` the counter has wrapped, and the elapsed time
/// is `(u32::MAX - start) + now + 1`.
///
/// # Example
///
/// ```
/// use gsmlink_core::elapsed_ms;
///
/// assert_eq!(elapsed_ms(1500, 1000), 500);
/// assert_eq!(elapsed_ms(9, u32::MAX - 10), 20);
/// ```
pub fn elapsed_ms(now: u32, start: u32) -> u32 {
    if now >= start {
        now - start
    } else {
        (u32::MAX - start) + now + 1
    }
}

/// A start timestamp plus a duration.
///
/// [`set`](Deadline::set) arms the deadline from now, [`reset`](Deadline::reset)
/// re-arms it from now with the previously set duration, and
/// [`is_expired`](Deadline::is_expired) is read-only.
#[derive(Clone)]
pub struct Deadline {
    clock: SharedClock,
    start: u32,
    duration_ms: u32,
}

impl Deadline {
    /// Create a deadline with zero duration, started now.
    pub fn new(clock: SharedClock) -> Self {
        let start = clock.now_ms();
        Deadline {
            clock,
            start,
            duration_ms: 0,
        }
    }

    /// Create a deadline armed with `duration` from now.
    pub fn armed(clock: SharedClock, duration: Duration) -> Self {
        let mut deadline = Self::new(clock);
        deadline.set(duration);
        deadline
    }

    /// Arm the deadline with a new duration, starting now.
    ///
    /// Durations longer than the counter can represent are clamped.
    pub fn set(&mut self, duration: Duration) {
        self.duration_ms = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        self.reset();
    }

    /// Re-arm the deadline from now, keeping the current duration.
    pub fn reset(&mut self) {
        self.start = self.clock.now_ms();
    }

    /// Whether strictly more than the duration has elapsed since the last
    /// `set` or `reset`.
    pub fn is_expired(&self) -> bool {
        elapsed_ms(self.clock.now_ms(), self.start) > self.duration_ms
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        let elapsed = elapsed_ms(self.clock.now_ms(), self.start);
        Duration::from_millis(u64::from(self.duration_ms.saturating_sub(elapsed)))
    }

    /// The duration this deadline is armed with.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.duration_ms))
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deadline")
            .field("start", &self.start)
            .field("duration_ms", &self.duration_ms)
            .finish()
    }
}
