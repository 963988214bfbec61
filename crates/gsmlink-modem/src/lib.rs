//! AT command protocol engine for SMS remote control over a GSM modem.
//!
//! This crate drives a cellular modem over a serial link in text mode. It
//! provides:
//!
//! - **Line framing** ([`protocol`]) -- turn the byte stream into
//!   `<CR><LF>`-framed lines, including SMS bodies that carry bare `<LF>`,
//!   and classify terminal results.
//! - **Command builders** ([`commands`]) -- construct AT commands and parse
//!   intermediate results and unsolicited result codes.
//! - **Command engine** ([`engine`]) -- half-duplex command/response
//!   exchanges with URC interception into a bounded queue.
//! - **Modem** ([`modem`], [`operations`], [`dispatch`]) -- SMS
//!   store-and-forward queues, phonebook operations, keepalive and
//!   registration state, and the cooperative dispatch tick.
//! - **Builder** ([`builder`]) -- fluent construction with module-tested
//!   timing defaults.
//!
//! # Example
//!
//! ```
//! use gsmlink_modem::commands::{cmd_write_sms, parse_urc, Urc};
//! use gsmlink_modem::protocol::encode_command;
//!
//! let cmd = encode_command(&cmd_write_sms("+391234567890"));
//! assert_eq!(cmd, b"AT+CMGW=\"+391234567890\"\r");
//!
//! assert_eq!(parse_urc("+CMTI: \"SM\",3"), Urc::NewMessage { index: 3 });
//! ```

pub mod builder;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod indicator;
pub mod modem;
pub mod operations;
pub mod protocol;
pub mod session;

// Re-export the primary types for ergonomic `use gsmlink_modem::*`.
pub use builder::ModemBuilder;
pub use config::{CommandTimeouts, ModemConfig, RegistrationPolicy};
pub use dispatch::DispatchStatus;
pub use engine::Answer;
pub use modem::{Modem, SMS_QUEUE_CAPACITY};
