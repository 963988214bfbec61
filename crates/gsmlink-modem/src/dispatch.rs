//! The cooperative scheduler tick.
//!
//! [`Modem::dispatch`] runs a fixed sequence every call:
//!
//! 1. advance the network indicator
//! 2. promote a registration whose settle delay has expired
//! 3. keepalive, with escalation to the fatal state
//! 4. drain one unit of input, preferring a queued URC over the transport
//! 5. outbound send with bounded retry and backoff
//!
//! While fatal, a tick that runs the keepalive stops there, and other ticks
//! still drain input but never send. A keepalive answer or a reset
//! notification from the modem ends the fatal state.
//!
//! The tick awaits bounded command waits and settle delays, so its
//! duration follows modem responsiveness.

use tracing::{debug, error, info, warn};

use gsmlink_core::{ModemEvent, Result, SignalLevel};

use crate::commands::{self, SIGNAL_INDICATOR, Urc};
use crate::config::RegistrationPolicy;
use crate::modem::Modem;
use crate::protocol::Framing;
use crate::session::{KeepaliveOutcome, ResendDecision};

/// What a dispatch tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// No input and no outbound work.
    Idle,
    /// A line was processed or an outbound send was attempted.
    Handled,
    /// The engine is in the fatal state; outbound work was skipped.
    Fatal,
}

impl Modem {
    /// Run one scheduler tick.
    ///
    /// Operation failures are logged and folded into the session state.
    /// Only a link failure while draining input is returned as `Err`.
    pub async fn dispatch(&mut self) -> Result<DispatchStatus> {
        self.indicator
            .update(self.session.registered, self.session.signal);

        if self.session.registration_pending && self.registration_delay.is_expired() {
            info!("registration settle delay expired");
            self.session.registration_pending = false;
            self.set_registered(true);
        }

        if self.keepalive.is_expired() && self.run_keepalive().await {
            return Ok(DispatchStatus::Fatal);
        }

        let mut status = DispatchStatus::Idle;

        let line = match self.engine.next_urc() {
            Some(line) => Some(line),
            None => {
                self.engine
                    .read_line(self.config.urc_poll, Framing::Standard)
                    .await?
            }
        };
        if let Some(line) = line {
            self.handle_urc(&line).await;
            status = DispatchStatus::Handled;
        }

        if self.session.fatal {
            return Ok(DispatchStatus::Fatal);
        }

        let backoff_active = self.session.resend_pending() && !self.resend.is_expired();
        if !self.outbound.is_empty() && self.session.registered && !backoff_active {
            self.send_outbound_head().await;
            status = DispatchStatus::Handled;
        }

        Ok(status)
    }

    /// Ping the modem and apply the failure policy. Returns `true` if the
    /// engine is fatal and the tick must stop.
    async fn run_keepalive(&mut self) -> bool {
        let answered = match self.keepalive().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "keepalive not answered");
                false
            }
        };
        self.keepalive.reset();

        match self
            .session
            .record_keepalive(answered, self.config.keepalive_failure_threshold)
        {
            KeepaliveOutcome::Healthy => false,
            KeepaliveOutcome::Recovered => {
                info!("modem answering again");
                self.emit(ModemEvent::Recovered);
                false
            }
            KeepaliveOutcome::Failed { consecutive } => {
                warn!(consecutive, "keepalive failed");
                false
            }
            KeepaliveOutcome::EnteredFatal => {
                error!(
                    failures = self.session.keepalive_failures,
                    "modem not answering, powering off"
                );
                if let Err(e) = self.power_off().await {
                    warn!(error = %e, "power-off command failed");
                }
                self.emit(ModemEvent::Fatal);
                true
            }
            KeepaliveOutcome::StillFatal => true,
        }
    }

    /// Act on one unsolicited line.
    async fn handle_urc(&mut self, line: &str) {
        match commands::parse_urc(line) {
            Urc::NewMessage { index } => {
                if self.inbound.enqueue(index).is_err() {
                    warn!(index, "inbound queue full, dropping received SMS");
                } else {
                    info!(index, "SMS received");
                    self.emit(ModemEvent::SmsReceived { index });
                }
            }
            Urc::SendConfirmation { reference } => {
                debug!(reference, "last message sent");
            }
            Urc::Indicator { indicator, value } if indicator == SIGNAL_INDICATOR => {
                let changed = self.session.record_signal(value);
                match self.session.signal {
                    SignalLevel::Bars(bars) => debug!(bars, "signal strength"),
                    SignalLevel::Unknown => warn!(value, "signal strength out of range"),
                }
                if changed {
                    self.emit(ModemEvent::SignalChanged(self.session.signal));
                }
            }
            Urc::Indicator { indicator, value } => {
                debug!(indicator, value, "indicator ignored");
            }
            Urc::Registration { status } => self.handle_registration(status),
            Urc::ModemReset => self.handle_modem_reset().await,
            Urc::PhonebookReady => self.handle_phonebook_ready().await,
            Urc::Unhandled => debug!(line, "unhandled line"),
        }
    }

    fn handle_registration(&mut self, status: i32) {
        if commands::is_registered_status(status) {
            match self.config.registration {
                RegistrationPolicy::Immediate => self.set_registered(true),
                RegistrationPolicy::Settle(delay) => {
                    info!(?delay, "registered to network, settling");
                    self.session.registration_pending = true;
                    self.registration_delay.reset();
                }
            }
        } else {
            debug!(status, "not registered to network");
            self.session.registration_pending = false;
            self.set_registered(false);
        }

        self.indicator.restart();
        self.indicator
            .update(self.session.registered, self.session.signal);
    }

    async fn handle_modem_reset(&mut self) {
        warn!("modem reset");
        self.emit(ModemEvent::ModemReset);
        if let Err(e) = self.engine.discard_input(self.config.reset_flush).await {
            warn!(error = %e, "flush after modem reset failed");
        }
        if let Err(e) = self.inner_setup().await {
            error!(error = %e, "handshake after modem reset failed");
        }
    }

    async fn handle_phonebook_ready(&mut self) {
        info!("phonebook ready");
        self.session.phonebook_ready = true;
        self.emit(ModemEvent::PhonebookReady);

        let attempts = self.config.memory_clear_attempts;
        for attempt in 1..=attempts {
            match self.clear_sms_memory().await {
                Ok(()) => break,
                Err(e) => {
                    warn!(attempt, error = %e, "clearing SMS memory failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.memory_clear_interval).await;
                    }
                }
            }
        }
        // The clear can take a long time; don't count it against the modem.
        self.keepalive.reset();
    }

    /// Try to send the outbound head and apply the retry policy.
    async fn send_outbound_head(&mut self) {
        let Some(&index) = self.outbound.peek() else {
            return;
        };

        match self.send_sms_at_index(index).await {
            Ok(()) => {
                self.outbound.dequeue();
                self.session.record_send_success();
                info!(index, "SMS sent");
                self.emit(ModemEvent::SmsSent { index });
                if let Err(e) = self.delete_sms_at_index(index).await {
                    warn!(index, error = %e, "could not delete sent SMS");
                }
            }
            Err(e) => match self.session.record_send_failure(self.config.sms_retry_count) {
                ResendDecision::Retry { remaining } => {
                    warn!(index, remaining, error = %e, "SMS send failed, retrying later");
                    self.resend.reset();
                }
                ResendDecision::Drop => {
                    self.outbound.dequeue();
                    warn!(index, error = %e, "SMS send failed too many times, dropped");
                    self.emit(ModemEvent::SmsDropped { index });
                }
            },
        }
    }

    fn set_registered(&mut self, registered: bool) {
        if self.session.registered == registered {
            return;
        }
        self.session.registered = registered;
        if registered {
            info!("registered to network");
        } else {
            info!("not registered to network");
        }
        self.emit(ModemEvent::RegistrationChanged { registered });
    }
}
