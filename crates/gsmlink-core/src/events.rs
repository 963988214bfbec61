//! Asynchronous modem event types.
//!
//! Events are emitted by the engine through a [`tokio::sync::broadcast`]
//! channel as the session state changes. The thermostat logic (or a CLI
//! monitor) subscribes to these instead of polling the status queries.

use crate::types::SignalLevel;

/// An event emitted by the modem engine.
///
/// Delivery is best-effort through a bounded broadcast channel; slow
/// consumers may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    /// A message arrived and its storage index was queued inbound.
    SmsReceived {
        /// SIM storage index of the new message.
        index: u16,
    },

    /// An outbound message was written to the store and queued for sending.
    SmsStored {
        /// SIM storage index assigned by the modem.
        index: u16,
    },

    /// A queued outbound message was sent.
    SmsSent {
        /// SIM storage index of the sent message.
        index: u16,
    },

    /// A queued outbound message exhausted its retry budget and was dropped.
    SmsDropped {
        /// SIM storage index of the dropped message.
        index: u16,
    },

    /// The signal indicator changed.
    SignalChanged(SignalLevel),

    /// Network registration was gained or lost.
    RegistrationChanged {
        /// `true` once the modem is considered registered.
        registered: bool,
    },

    /// The modem reported a reset; the handshake was re-run.
    ModemReset,

    /// The SIM phonebook became ready.
    PhonebookReady,

    /// Keepalive failures crossed the threshold; the modem was powered off.
    Fatal,

    /// A keepalive succeeded after the fatal state was entered.
    Recovered,
}
