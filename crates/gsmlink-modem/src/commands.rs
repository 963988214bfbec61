//! AT command builders and response parsers.
//!
//! All functions are pure: they produce command strings or pick apart
//! response lines without performing any I/O. The engine sends the strings
//! (see [`encode_command`](crate::protocol::encode_command)) and feeds
//! received lines back into the parsers.
//!
//! # Command reference
//!
//! GSM 07.07 / 07.05 in text mode (`+CMGF=1`), with the vendor extensions
//! of the u-blox/Libelium class of modules: `+XDRVI` on reset, `+PBREADY`
//! once the SIM phonebook is readable, `+CPWROFF` to power down.

use gsmlink_core::{Error, PHONE_NUMBER_MAX_LEN, PhonebookEntry, Result, SMS_BODY_MAX_LEN};

/// Handshake sent once the line runs at the steady-state baud rate: echo
/// off, registration URCs, text mode, IRA charset, new-message indications,
/// indicator events, verbose errors.
pub const INIT_SEQUENCE: &str =
    "ATE0 ; +CREG=1; +CMGF=1; +CSCS=\"IRA\"; +CNMI=1,1; +CMER=2,0,0,1,1; +CMEE=2";

/// `+CIEV` indicator number carrying signal strength.
pub const SIGNAL_INDICATOR: i32 = 2;

/// First and last phonebook slots searched by number.
pub const PHONEBOOK_SEARCH_RANGE: (u16, u16) = (1, 20);

// ---------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------

/// Keepalive ping (`AT`).
pub fn cmd_keepalive() -> String {
    "AT".to_string()
}

/// Fix the modem's line speed (`AT+IPR=<baud>`).
pub fn cmd_set_baud_rate(baud_rate: u32) -> String {
    format!("AT+IPR={baud_rate}")
}

/// Store a message in the SIM (`AT+CMGW="<number>"`); the body follows the
/// `>` prompt.
pub fn cmd_write_sms(number: &str) -> String {
    format!("AT+CMGW=\"{number}\"")
}

/// Send a stored message (`AT+CMSS=<index>`).
pub fn cmd_send_stored_sms(index: u16) -> String {
    format!("AT+CMSS={index}")
}

/// Read a stored message (`AT+CMGR=<index>`).
pub fn cmd_read_sms(index: u16) -> String {
    format!("AT+CMGR={index}")
}

/// Delete one stored message (`AT+CMGD=<index>`).
pub fn cmd_delete_sms(index: u16) -> String {
    format!("AT+CMGD={index}")
}

/// Delete every stored message regardless of status (`AT+CMGD=0,4`).
pub fn cmd_delete_all_sms() -> String {
    "AT+CMGD=0,4".to_string()
}

/// List phonebook slots `first..=last` (`AT+CPBR=<first>,<last>`).
pub fn cmd_read_phonebook(first: u16, last: u16) -> String {
    format!("AT+CPBR={first},{last}")
}

/// Find phonebook entries by name prefix (`AT+CPBF="<name>"`).
pub fn cmd_find_phonebook(name: &str) -> String {
    format!("AT+CPBF=\"{name}\"")
}

/// Write a number into the first free phonebook slot, optionally named.
pub fn cmd_write_phonebook(number: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("AT+CPBW=,\"{number}\",,\"{name}\""),
        None => format!("AT+CPBW=,\"{number}\""),
    }
}

/// Clear one phonebook slot (`AT+CPBW=<index>`).
pub fn cmd_delete_phonebook(index: u16) -> String {
    format!("AT+CPBW={index}")
}

/// Power the module down (`AT+CPWROFF`).
pub fn cmd_power_off() -> String {
    "AT+CPWROFF".to_string()
}

// ---------------------------------------------------------------
// Argument validation
// ---------------------------------------------------------------

/// Check a phone number can be embedded in a quoted command argument.
pub fn validate_number(number: &str) -> Result<()> {
    if number.is_empty() {
        return Err(Error::InvalidParameter("empty phone number".into()));
    }
    if number.chars().count() > PHONE_NUMBER_MAX_LEN {
        return Err(Error::InvalidParameter(format!(
            "phone number longer than {PHONE_NUMBER_MAX_LEN} characters"
        )));
    }
    if !number
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '*' | '#'))
    {
        return Err(Error::InvalidParameter(format!(
            "phone number {number:?} contains invalid characters"
        )));
    }
    Ok(())
}

/// Check a phonebook name can be embedded in a quoted command argument.
pub fn validate_name(name: &str) -> Result<()> {
    if name.contains('"') || name.contains('\r') || name.contains('\n') {
        return Err(Error::InvalidParameter(format!(
            "phonebook name {name:?} contains a quote or line break"
        )));
    }
    Ok(())
}

/// Check a body fits one text-mode SMS and cannot end the body early.
pub fn validate_body(body: &str) -> Result<()> {
    if body.chars().count() > SMS_BODY_MAX_LEN {
        return Err(Error::InvalidParameter(format!(
            "SMS body longer than {SMS_BODY_MAX_LEN} characters"
        )));
    }
    if body.contains(['\u{1A}', '\u{1B}']) {
        return Err(Error::InvalidParameter(
            "SMS body contains Ctrl+Z or Esc".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------
// Scanning helpers
// ---------------------------------------------------------------

/// Scan a decimal integer after optional whitespace, like `%d`.
fn scan_int(s: &str) -> Option<(i32, &str)> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && matches!(c, '-' | '+'))))
        .map_or(s.len(), |(i, _)| i);
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

/// Scan a non-negative integer that fits a storage index.
fn scan_index(s: &str) -> Option<(u16, &str)> {
    let (value, rest) = scan_int(s)?;
    Some((u16::try_from(value).ok()?, rest))
}

/// Scan a `"..."` field after optional whitespace.
fn scan_quoted(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start().strip_prefix('"')?;
    let end = s.find('"')?;
    Some((&s[..end], &s[end + 1..]))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ---------------------------------------------------------------
// Unsolicited result codes
// ---------------------------------------------------------------

/// A recognised unsolicited result code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Urc {
    /// `+CMTI: "<mem>",<index>`: a message was stored at `index`.
    NewMessage { index: u16 },
    /// `+CMGS: <mr>` / `+CMSS: <mr>`: a send completed.
    SendConfirmation { reference: i32 },
    /// `+CIEV: <indicator>,<value>`.
    Indicator { indicator: i32, value: i32 },
    /// `+CREG: <status>`.
    Registration { status: i32 },
    /// `+XDRVI: ...`: the module restarted.
    ModemReset,
    /// `+PBREADY`: the SIM phonebook can be accessed.
    PhonebookReady,
    /// Anything else.
    Unhandled,
}

/// Classify an unsolicited line.
pub fn parse_urc(line: &str) -> Urc {
    if let Some(rest) = line.strip_prefix("+CMTI:") {
        return scan_quoted(rest)
            .and_then(|(_, rest)| rest.trim_start().strip_prefix(','))
            .and_then(scan_index)
            .map_or(Urc::Unhandled, |(index, _)| Urc::NewMessage { index });
    }
    if let Some(rest) = line
        .strip_prefix("+CMGS:")
        .or_else(|| line.strip_prefix("+CMSS:"))
    {
        return scan_int(rest).map_or(Urc::Unhandled, |(reference, _)| {
            Urc::SendConfirmation { reference }
        });
    }
    if let Some(rest) = line.strip_prefix("+CIEV:") {
        return scan_int(rest)
            .and_then(|(indicator, rest)| {
                let rest = rest.trim_start().strip_prefix(',')?;
                let (value, _) = scan_int(rest)?;
                Some(Urc::Indicator { indicator, value })
            })
            .unwrap_or(Urc::Unhandled);
    }
    if let Some(rest) = line.strip_prefix("+CREG:") {
        return scan_int(rest).map_or(Urc::Unhandled, |(status, _)| Urc::Registration { status });
    }
    if line.starts_with("+XDRVI: ") {
        return Urc::ModemReset;
    }
    if line == "+PBREADY" {
        return Urc::PhonebookReady;
    }
    Urc::Unhandled
}

/// Whether a `+CREG` status means registered (home network or roaming).
pub fn is_registered_status(status: i32) -> bool {
    matches!(status, 1 | 5)
}

// ---------------------------------------------------------------
// Intermediate result parsers
// ---------------------------------------------------------------

/// Storage index from a `+CMGW: <index>` store confirmation.
pub fn parse_stored_index(line: &str) -> Option<u16> {
    let rest = line.strip_prefix("+CMGW:")?;
    scan_index(rest).map(|(index, _)| index)
}

/// Sender number from a `+CMGR: "<stat>","<number>",...` header.
///
/// The number is truncated to [`PHONE_NUMBER_MAX_LEN`] characters.
pub fn parse_read_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix("+CMGR:")?;
    let (_status, rest) = scan_quoted(rest)?;
    let rest = rest.trim_start().strip_prefix(',')?;
    let (number, _) = scan_quoted(rest)?;
    if number.is_empty() {
        return None;
    }
    Some(truncate(number, PHONE_NUMBER_MAX_LEN))
}

/// Phonebook entry from a `<prefix>: <index>,"<number>",...` line, where
/// `prefix` is `+CPBR` or `+CPBF`.
pub fn parse_phonebook_entry(line: &str, prefix: &str) -> Option<PhonebookEntry> {
    let rest = line.strip_prefix(prefix)?.strip_prefix(':')?;
    let (index, rest) = scan_index(rest)?;
    let rest = rest.trim_start().strip_prefix(',')?;
    let (number, _) = scan_quoted(rest)?;
    if number.is_empty() {
        return None;
    }
    Some(PhonebookEntry {
        index,
        number: truncate(number, PHONE_NUMBER_MAX_LEN),
    })
}
