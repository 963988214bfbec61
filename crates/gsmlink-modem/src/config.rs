//! Timing and policy configuration for the modem engine.
//!
//! [`ModemConfig::default()`] holds timings that suit u-blox class modules. Every
//! value can be overridden through [`ModemBuilder`](crate::builder::ModemBuilder).

use std::time::Duration;

/// What to do when the modem reports it has registered on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPolicy {
    /// Trust the registration at once.
    Immediate,
    /// Wait this long before treating the modem as registered. A
    /// "not registered" report during the wait cancels it.
    Settle(Duration),
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        RegistrationPolicy::Settle(Duration::from_secs(15))
    }
}

/// Per-command answer timeouts.
///
/// Each bounds the idle time between received lines, not the whole
/// exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTimeouts {
    /// `AT` keepalive.
    pub keepalive: Duration,
    /// `+CMGW` store, after the body is committed.
    pub store: Duration,
    /// `+CMSS` send from storage. Network round trip, hence long.
    pub send: Duration,
    /// `+CMGR` header.
    pub read: Duration,
    /// Message body following the `+CMGR` header.
    pub body: Duration,
    /// `+CMGD` single delete.
    pub delete: Duration,
    /// `+CMGD=0,4` bulk delete.
    pub clear: Duration,
    /// `+CPBR` phonebook listing.
    pub phonebook_read: Duration,
    /// `+CPBF` phonebook search.
    pub phonebook_find: Duration,
    /// `+CPBW` phonebook write.
    pub phonebook_write: Duration,
    /// `+CPBW=<index>` phonebook delete.
    pub phonebook_delete: Duration,
    /// Final `OK` of the initialization sequence.
    pub handshake: Duration,
    /// Window for the `>` prompt after `+CMGW`.
    pub prompt: Duration,
    /// `+CPWROFF`.
    pub power_off: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        CommandTimeouts {
            keepalive: Duration::from_secs(1),
            store: Duration::from_secs(20),
            send: Duration::from_secs(45),
            read: Duration::from_secs(5),
            body: Duration::from_millis(500),
            delete: Duration::from_secs(10),
            clear: Duration::from_secs(20),
            phonebook_read: Duration::from_secs(5),
            phonebook_find: Duration::from_secs(10),
            phonebook_write: Duration::from_secs(5),
            phonebook_delete: Duration::from_secs(1),
            handshake: Duration::from_secs(1),
            prompt: Duration::from_millis(1500),
            power_off: Duration::from_secs(1),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemConfig {
    /// Baud rate the modem is assumed to be at after power-up.
    pub initial_baud_rate: u32,
    /// Baud rate negotiated for steady-state communication.
    pub baud_rate: u32,
    /// Pause between the baud-rate command and switching the local port.
    pub baud_switch_delay: Duration,
    /// Quiet period used to flush stale bytes between handshake steps.
    pub handshake_settle: Duration,
    /// Stale input flushed before the handshake on a fresh start.
    pub handshake_flush: Duration,
    /// Stale input flushed before the handshake after a modem reset.
    pub reset_flush: Duration,
    /// Length of the pulse on the power key.
    pub power_pulse: Duration,

    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Consecutive keepalive failures tolerated before the modem is
    /// powered off and the engine enters the fatal state.
    pub keepalive_failure_threshold: u32,

    /// How a registration report is trusted.
    pub registration: RegistrationPolicy,

    /// Send attempts for one outbound message before it is dropped.
    pub sms_retry_count: u32,
    /// Backoff between outbound send attempts.
    pub sms_retry_interval: Duration,
    /// Pause between writing a message body and committing it with Ctrl+Z.
    pub body_commit_delay: Duration,

    /// Cadence of the network indicator.
    pub indicator_interval: Duration,
    /// Indicator on-time per blink.
    pub indicator_on: Duration,
    /// Indicator off-time between blinks.
    pub indicator_off: Duration,

    /// Longest response line kept; longer lines are truncated.
    pub line_capacity: usize,
    /// Idle read timeout when polling for unsolicited input.
    pub urc_poll: Duration,

    /// Bulk memory clears attempted after `+PBREADY`.
    pub memory_clear_attempts: u32,
    /// Pause between those attempts.
    pub memory_clear_interval: Duration,
    /// Quiet period after a bulk clear or phonebook write.
    pub settle_delay: Duration,

    pub timeouts: CommandTimeouts,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            initial_baud_rate: 115_200,
            baud_rate: 9600,
            baud_switch_delay: Duration::from_millis(500),
            handshake_settle: Duration::from_millis(500),
            handshake_flush: Duration::from_secs(2),
            reset_flush: Duration::from_secs(5),
            power_pulse: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(15),
            keepalive_failure_threshold: 5,
            registration: RegistrationPolicy::default(),
            sms_retry_count: 12,
            sms_retry_interval: Duration::from_secs(15),
            body_commit_delay: Duration::from_millis(500),
            indicator_interval: Duration::from_secs(5),
            indicator_on: Duration::from_millis(150),
            indicator_off: Duration::from_millis(100),
            line_capacity: gsmlink_core::SMS_BODY_MAX_LEN,
            urc_poll: Duration::from_millis(100),
            memory_clear_attempts: 10,
            memory_clear_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            timeouts: CommandTimeouts::default(),
        }
    }
}
