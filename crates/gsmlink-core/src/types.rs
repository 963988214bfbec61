//! Shared value types for the modem engine and its callers.

use std::fmt;

/// Maximum characters kept from a phone number.
pub const PHONE_NUMBER_MAX_LEN: usize = 20;

/// Maximum characters kept from an SMS body (one text-mode SMS).
pub const SMS_BODY_MAX_LEN: usize = 160;

/// A text message read from (or destined for) the modem's message store.
///
/// An ephemeral value: produced by reading a stored message and consumed by
/// the caller immediately. The engine never caches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sms {
    /// Originating or destination number, at most [`PHONE_NUMBER_MAX_LEN`] chars.
    pub phone: String,
    /// Message text, at most [`SMS_BODY_MAX_LEN`] chars. May contain bare `\n`.
    pub body: String,
}

impl Sms {
    /// Build a record, truncating both fields to their storage limits.
    pub fn new(phone: &str, body: &str) -> Self {
        Sms {
            phone: truncate_chars(phone, PHONE_NUMBER_MAX_LEN),
            body: truncate_chars(body, SMS_BODY_MAX_LEN),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Which of the two SIM-storage index queues an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmsQueue {
    /// Messages received by the modem and not yet consumed by the host.
    Inbound,
    /// Messages stored by the host and waiting to be sent.
    Outbound,
}

impl fmt::Display for SmsQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmsQueue::Inbound => write!(f, "inbound"),
            SmsQueue::Outbound => write!(f, "outbound"),
        }
    }
}

/// Last signal level reported by the modem's indicator URC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalLevel {
    /// No report yet, or the last report was out of range.
    #[default]
    Unknown,
    /// Signal bars, always in `1..=5`.
    Bars(u8),
}

impl SignalLevel {
    /// Map a raw indicator value to a level; anything outside `1..=5` is
    /// [`SignalLevel::Unknown`].
    pub fn from_raw(level: i32) -> Self {
        match u8::try_from(level) {
            Ok(bars @ 1..=5) => SignalLevel::Bars(bars),
            _ => SignalLevel::Unknown,
        }
    }

    /// Number of bars, or `None` when unknown.
    pub fn bars(&self) -> Option<u8> {
        match self {
            SignalLevel::Bars(b) => Some(*b),
            SignalLevel::Unknown => None,
        }
    }
}

impl fmt::Display for SignalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalLevel::Unknown => write!(f, "unknown"),
            SignalLevel::Bars(b) => write!(f, "{b}/5"),
        }
    }
}

/// A phonebook slot as reported by `+CPBR` / `+CPBF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonebookEntry {
    /// Slot index in the SIM phonebook.
    pub index: u16,
    /// Stored number.
    pub number: String,
}
