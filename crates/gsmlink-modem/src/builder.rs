//! ModemBuilder -- fluent builder for constructing [`Modem`] instances.
//!
//! Separates configuration from construction so that callers can set up
//! the serial port, timing policy and hardware pins before the transport
//! is opened.
//!
//! # Example
//!
//! ```no_run
//! use gsmlink_core::NullPin;
//! use gsmlink_modem::{ModemBuilder, RegistrationPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> gsmlink_core::Result<()> {
//! let mut modem = ModemBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .registration_policy(RegistrationPolicy::Settle(Duration::from_secs(10)))
//!     .build(Box::new(NullPin), Box::new(NullPin))
//!     .await?;
//! modem.initialize().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use gsmlink_core::{Error, OutputPin, Result, SharedClock, TokioClock, Transport};
use gsmlink_transport::SerialTransport;

use crate::config::{CommandTimeouts, ModemConfig, RegistrationPolicy};
use crate::modem::Modem;

/// Fluent builder for [`Modem`].
///
/// Everything defaults to [`ModemConfig::default()`], so the simplest usage
/// is:
///
/// ```ignore
/// let modem = ModemBuilder::new()
///     .serial_port("/dev/ttyUSB0")
///     .build(led, power_key)
///     .await?;
/// ```
pub struct ModemBuilder {
    config: ModemConfig,
    serial_port: Option<String>,
    clock: Option<SharedClock>,
}

impl Default for ModemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModemBuilder {
    pub fn new() -> Self {
        ModemBuilder {
            config: ModemConfig::default(),
            serial_port: None,
            clock: None,
        }
    }

    /// Start from a complete configuration.
    pub fn config(mut self, config: ModemConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Set the steady-state baud rate (default: 9600).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.config.baud_rate = baud;
        self
    }

    /// Set the rate the modem is addressed at before switching
    /// (default: 115200).
    pub fn initial_baud_rate(mut self, baud: u32) -> Self {
        self.config.initial_baud_rate = baud;
        self
    }

    /// Set how registration reports are trusted (default: settle 15 s).
    pub fn registration_policy(mut self, policy: RegistrationPolicy) -> Self {
        self.config.registration = policy;
        self
    }

    /// Set the keepalive interval (default: 15 s).
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Set the consecutive keepalive failures tolerated before powering the
    /// modem off (default: 5).
    pub fn keepalive_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.keepalive_failure_threshold = threshold;
        self
    }

    /// Set the outbound send attempts per message and the backoff between
    /// them (default: 12 attempts, 15 s apart).
    pub fn sms_retry(mut self, count: u32, interval: Duration) -> Self {
        self.config.sms_retry_count = count;
        self.config.sms_retry_interval = interval;
        self
    }

    /// Set the indicator cadence and blink timing.
    pub fn indicator_timing(mut self, interval: Duration, on: Duration, off: Duration) -> Self {
        self.config.indicator_interval = interval;
        self.config.indicator_on = on;
        self.config.indicator_off = off;
        self
    }

    /// Set the power key pulse length (default: 2 s).
    pub fn power_pulse(mut self, pulse: Duration) -> Self {
        self.config.power_pulse = pulse;
        self
    }

    /// Set the idle poll timeout used when draining input (default: 100 ms).
    pub fn urc_poll(mut self, timeout: Duration) -> Self {
        self.config.urc_poll = timeout;
        self
    }

    /// Set the per-command answer timeouts.
    pub fn timeouts(mut self, timeouts: CommandTimeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    /// Use a custom clock for deadlines. Defaults to [`TokioClock`].
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build a [`Modem`] with a caller-provided transport.
    ///
    /// This is the primary entry point for testing (pass a `MockTransport`
    /// or `SimulatedModem` from `gsmlink-test-harness`).
    pub fn build_with_transport(
        self,
        transport: Box<dyn Transport>,
        indicator_pin: Box<dyn OutputPin>,
        power_pin: Box<dyn OutputPin>,
    ) -> Result<Modem> {
        if self.config.line_capacity == 0 {
            return Err(Error::InvalidParameter(
                "line capacity must be at least 1".into(),
            ));
        }
        if self.config.sms_retry_count == 0 {
            return Err(Error::InvalidParameter(
                "SMS retry count must be at least 1".into(),
            ));
        }
        if self.config.baud_rate == 0 || self.config.initial_baud_rate == 0 {
            return Err(Error::InvalidParameter("baud rate must be non-zero".into()));
        }

        let clock = self.clock.unwrap_or_else(TokioClock::shared);
        Ok(Modem::new(
            transport,
            indicator_pin,
            power_pin,
            self.config,
            clock,
        ))
    }

    /// Build a [`Modem`] over a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    /// The port is opened at the initial baud rate.
    pub async fn build(
        self,
        indicator_pin: Box<dyn OutputPin>,
        power_pin: Box<dyn OutputPin>,
    ) -> Result<Modem> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;

        let transport = SerialTransport::open(port, self.config.initial_baud_rate).await?;
        self.build_with_transport(Box::new(transport), indicator_pin, power_pin)
    }
}
