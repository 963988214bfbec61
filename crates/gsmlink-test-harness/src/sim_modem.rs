//! An in-memory AT modem.
//!
//! [`SimulatedModem`] answers the subset of the GSM 07.05/07.07 command set
//! the engine uses, with a SIM message store, a phonebook, the `>` body
//! prompt, and URC injection. It replaces a compile-time simulation build:
//! the host injects it as its [`Transport`] and everything above the wire
//! runs unchanged.
//!
//! Replies are framed the way real modules frame them
//! (`<CR><LF>text<CR><LF>`); echo is never produced.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use gsmlink_core::error::{Error, Result};
use gsmlink_core::transport::Transport;
use tracing::debug;

/// Message slots in the simulated SIM store.
const STORE_SLOTS: u16 = 30;
/// Slots in the simulated SIM phonebook.
const PHONEBOOK_SLOTS: u16 = 250;
/// Ctrl+Z, terminates an SMS body.
const SUB: u8 = 0x1A;
/// Esc, aborts an SMS body.
const ESC: u8 = 0x1B;

#[derive(Debug, Clone)]
struct StoredMessage {
    status: &'static str,
    phone: String,
    body: String,
}

#[derive(Debug, Clone)]
struct Contact {
    number: String,
    name: String,
}

#[derive(Debug)]
enum InputMode {
    Command,
    Body { phone: String },
}

#[derive(Debug)]
struct SimState {
    inbound: VecDeque<u8>,
    line: Vec<u8>,
    mode: InputMode,
    store: BTreeMap<u16, StoredMessage>,
    phonebook: BTreeMap<u16, Contact>,
    sent: Vec<(String, String)>,
    failing_sends: u32,
    responsive: bool,
    powered: bool,
    connected: bool,
    baud_rate: u32,
    next_reference: u16,
}

impl SimState {
    fn reply(&mut self, text: &str) {
        self.inbound.extend(b"\r\n");
        self.inbound.extend(text.as_bytes());
        self.inbound.extend(b"\r\n");
    }

    fn ok(&mut self) {
        self.reply("OK");
    }

    fn free_slot<T>(map: &BTreeMap<u16, T>, slots: u16) -> Option<u16> {
        (1..=slots).find(|i| !map.contains_key(i))
    }

    fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            match &self.mode {
                InputMode::Command => match byte {
                    b'\r' => {
                        let line = String::from_utf8_lossy(&self.line).trim().to_string();
                        self.line.clear();
                        if !line.is_empty() {
                            self.execute(&line);
                        }
                    }
                    b'\n' => {}
                    _ => self.line.push(byte),
                },
                InputMode::Body { phone } => match byte {
                    SUB => {
                        let phone = phone.clone();
                        let body = String::from_utf8_lossy(&self.line).into_owned();
                        self.line.clear();
                        self.mode = InputMode::Command;
                        self.store_outgoing(phone, body);
                    }
                    ESC => {
                        self.line.clear();
                        self.mode = InputMode::Command;
                        self.ok();
                    }
                    _ => self.line.push(byte),
                },
            }
        }
    }

    fn store_outgoing(&mut self, phone: String, body: String) {
        match Self::free_slot(&self.store, STORE_SLOTS) {
            Some(index) => {
                self.store.insert(
                    index,
                    StoredMessage {
                        status: "STO UNSENT",
                        phone,
                        body,
                    },
                );
                self.reply(&format!("+CMGW: {index}"));
                self.ok();
            }
            None => self.reply("+CMS ERROR: 322"),
        }
    }

    fn execute(&mut self, line: &str) {
        if !self.powered || !self.responsive {
            debug!(line, "simulated modem ignoring command");
            return;
        }
        debug!(line, "simulated modem command");

        if line == "AT" || line.starts_with("ATE0") || line.starts_with("AT+IPR=") {
            self.ok();
        } else if line == "AT+CPWROFF" {
            self.ok();
            self.powered = false;
        } else if let Some(rest) = line.strip_prefix("AT+CMGW=") {
            let phone = quoted_fields(rest).into_iter().next().unwrap_or_default();
            self.mode = InputMode::Body { phone };
            self.inbound.extend(b"\r\n> ");
        } else if let Some(rest) = line.strip_prefix("AT+CMSS=") {
            self.send_stored(rest);
        } else if let Some(rest) = line.strip_prefix("AT+CMGR=") {
            self.read_stored(rest);
        } else if let Some(rest) = line.strip_prefix("AT+CMGD=") {
            self.delete_stored(rest);
        } else if let Some(rest) = line.strip_prefix("AT+CPBR=") {
            self.read_phonebook(rest);
        } else if let Some(rest) = line.strip_prefix("AT+CPBF=") {
            self.find_phonebook(rest);
        } else if let Some(rest) = line.strip_prefix("AT+CPBW=") {
            self.write_phonebook(rest);
        } else {
            self.reply("ERROR");
        }
    }

    fn send_stored(&mut self, args: &str) {
        if self.failing_sends > 0 {
            self.failing_sends -= 1;
            self.reply("+CMS ERROR: 500");
            return;
        }
        let message = args
            .trim()
            .parse::<u16>()
            .ok()
            .and_then(|index| self.store.get(&index).cloned());
        match message {
            Some(message) => {
                self.sent.push((message.phone, message.body));
                self.next_reference = self.next_reference.wrapping_add(1);
                let reference = self.next_reference;
                self.reply(&format!("+CMSS: {reference}"));
                self.ok();
            }
            None => self.reply("+CMS ERROR: 321"),
        }
    }

    fn read_stored(&mut self, args: &str) {
        let index = args.trim().parse::<u16>().ok();
        let message = index.and_then(|index| self.store.get_mut(&index));
        match message {
            Some(message) => {
                let status = message.status;
                if status == "REC UNREAD" {
                    message.status = "REC READ";
                }
                let header = format!(
                    "+CMGR: \"{}\",\"{}\",,\"26/10/18,12:00:00+08\"",
                    status, message.phone
                );
                let body = message.body.clone();
                self.reply(&header);
                // The body line carries no leading framing of its own.
                self.inbound.extend(body.as_bytes());
                self.inbound.extend(b"\r\n");
                self.ok();
            }
            None => self.reply("+CMS ERROR: 321"),
        }
    }

    fn delete_stored(&mut self, args: &str) {
        let mut parts = args.split(',').map(str::trim);
        let index = parts.next().and_then(|p| p.parse::<u16>().ok());
        let flag = parts.next().and_then(|p| p.parse::<u8>().ok()).unwrap_or(0);
        match (index, flag) {
            (Some(_), 4) => {
                self.store.clear();
                self.ok();
            }
            (Some(index), 0) => {
                self.store.remove(&index);
                self.ok();
            }
            _ => self.reply("+CMS ERROR: 302"),
        }
    }

    fn contact_line(prefix: &str, index: u16, contact: &Contact) -> String {
        let number_type = if contact.number.starts_with('+') { 145 } else { 129 };
        format!(
            "{prefix}: {index},\"{}\",{number_type},\"{}\"",
            contact.number, contact.name
        )
    }

    fn read_phonebook(&mut self, args: &str) {
        let bounds: Vec<u16> = args
            .split(',')
            .filter_map(|p| p.trim().parse::<u16>().ok())
            .collect();
        let (first, last) = match bounds.as_slice() {
            [first, last] if first <= last => (*first, *last),
            [single] => (*single, *single),
            _ => {
                self.reply("+CME ERROR: 21");
                return;
            }
        };
        let lines: Vec<String> = self
            .phonebook
            .range(first..=last)
            .map(|(index, contact)| Self::contact_line("+CPBR", *index, contact))
            .collect();
        for line in lines {
            self.reply(&line);
        }
        self.ok();
    }

    fn find_phonebook(&mut self, args: &str) {
        let name = quoted_fields(args).into_iter().next().unwrap_or_default();
        let lines: Vec<String> = self
            .phonebook
            .iter()
            .filter(|(_, contact)| contact.name.starts_with(&name))
            .map(|(index, contact)| Self::contact_line("+CPBF", *index, contact))
            .collect();
        if lines.is_empty() {
            self.reply("+CME ERROR: 22");
            return;
        }
        for line in lines {
            self.reply(&line);
        }
        self.ok();
    }

    fn write_phonebook(&mut self, args: &str) {
        if args.starts_with(',') {
            let mut fields = quoted_fields(args).into_iter();
            let number = fields.next().unwrap_or_default();
            let name = fields.next().unwrap_or_default();
            match Self::free_slot(&self.phonebook, PHONEBOOK_SLOTS) {
                Some(index) => {
                    self.phonebook.insert(index, Contact { number, name });
                    self.ok();
                }
                None => self.reply("+CME ERROR: 20"),
            }
        } else {
            match args.trim().parse::<u16>() {
                Ok(index) => {
                    self.phonebook.remove(&index);
                    self.ok();
                }
                Err(_) => self.reply("+CME ERROR: 21"),
            }
        }
    }
}

/// Contents of every `"..."` field in `s`, in order.
fn quoted_fields(s: &str) -> Vec<String> {
    s.split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

/// A simulated modem usable as the engine's [`Transport`].
#[derive(Debug)]
pub struct SimulatedModem {
    state: Arc<Mutex<SimState>>,
}

/// A shared view of a [`SimulatedModem`] for injecting network activity and
/// inspecting its store after the modem has been moved into the engine.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl SimulatedModem {
    /// Create a powered, responsive modem with empty storage.
    pub fn new() -> Self {
        SimulatedModem {
            state: Arc::new(Mutex::new(SimState {
                inbound: VecDeque::new(),
                line: Vec::new(),
                mode: InputMode::Command,
                store: BTreeMap::new(),
                phonebook: BTreeMap::new(),
                sent: Vec::new(),
                failing_sends: 0,
                responsive: true,
                powered: true,
                connected: true,
                baud_rate: 115_200,
                next_reference: 0,
            })),
        }
    }

    /// Get a handle for driving this modem from the test or host.
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimulatedModem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHandle {
    /// Store an incoming message and announce it with `+CMTI`.
    ///
    /// Returns the storage index, or `None` if the store is full.
    pub fn deliver_sms(&self, phone: &str, body: &str) -> Option<u16> {
        let mut state = lock(&self.state);
        let index = SimState::free_slot(&state.store, STORE_SLOTS)?;
        state.store.insert(
            index,
            StoredMessage {
                status: "REC UNREAD",
                phone: phone.to_string(),
                body: body.to_string(),
            },
        );
        state.reply(&format!("+CMTI: \"SM\",{index}"));
        Some(index)
    }

    /// Push an arbitrary unsolicited line, framed.
    pub fn push_urc(&self, line: &str) {
        lock(&self.state).reply(line);
    }

    /// Announce network registration and a signal level.
    pub fn attach(&self, signal: u8) {
        let mut state = lock(&self.state);
        state.reply("+CREG: 1");
        state.reply(&format!("+CIEV: 2,{signal}"));
    }

    /// Add a phonebook entry directly, returning its slot.
    pub fn add_contact(&self, number: &str, name: &str) -> Option<u16> {
        let mut state = lock(&self.state);
        let index = SimState::free_slot(&state.phonebook, PHONEBOOK_SLOTS)?;
        state.phonebook.insert(
            index,
            Contact {
                number: number.to_string(),
                name: name.to_string(),
            },
        );
        Some(index)
    }

    /// Make the next `count` send-from-storage commands fail.
    pub fn fail_next_sends(&self, count: u32) {
        lock(&self.state).failing_sends = count;
    }

    /// Stop (or resume) answering commands, as a hung module would.
    pub fn set_responsive(&self, responsive: bool) {
        lock(&self.state).responsive = responsive;
    }

    /// Whether the modem is still powered (cleared by `AT+CPWROFF`).
    pub fn is_powered(&self) -> bool {
        lock(&self.state).powered
    }

    /// Power the modem back on, as a power-key pulse would.
    pub fn power_on(&self) {
        lock(&self.state).powered = true;
    }

    /// Messages sent to the network so far, as `(phone, body)`.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        lock(&self.state).sent.clone()
    }

    /// Number of occupied message slots.
    pub fn stored_count(&self) -> usize {
        lock(&self.state).store.len()
    }

    /// Whether slot `index` holds a message.
    pub fn has_message(&self, index: u16) -> bool {
        lock(&self.state).store.contains_key(&index)
    }

    /// Phonebook slots and numbers.
    pub fn contacts(&self) -> Vec<(u16, String)> {
        lock(&self.state)
            .phonebook
            .iter()
            .map(|(index, contact)| (*index, contact.number.clone()))
            .collect()
    }

    /// Current line speed.
    pub fn baud_rate(&self) -> u32 {
        lock(&self.state).baud_rate
    }
}

#[async_trait]
impl Transport for SimulatedModem {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.feed(data);
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if !state.inbound.is_empty() {
                let n = state.inbound.len().min(buf.len());
                for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        // Idle line: behave like a quiet serial port.
        tokio::time::sleep(timeout).await;
        Err(Error::Timeout)
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        lock(&self.state).baud_rate = baud_rate;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(modem: &mut SimulatedModem) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = modem.receive(&mut buf, Duration::ZERO).await {
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test(start_paused = true)]
    async fn answers_keepalive() {
        let mut modem = SimulatedModem::new();
        modem.send(b"AT\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\nOK\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn stores_and_sends_a_message() {
        let mut modem = SimulatedModem::new();
        let handle = modem.handle();

        modem.send(b"AT+CMGW=\"+391234567890\"\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\n> ");

        modem.send(b"ON 22").await.unwrap();
        modem.send(&[SUB]).await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\n+CMGW: 1\r\n\r\nOK\r\n");

        modem.send(b"AT+CMSS=1\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\n+CMSS: 1\r\n\r\nOK\r\n");
        assert_eq!(
            handle.sent_messages(),
            vec![("+391234567890".to_string(), "ON 22".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_and_reads_a_message() {
        let mut modem = SimulatedModem::new();
        let handle = modem.handle();

        let index = handle.deliver_sms("+390000000000", "OFF").unwrap();
        assert_eq!(read_all(&mut modem).await, format!("\r\n+CMTI: \"SM\",{index}\r\n"));

        modem.send(format!("AT+CMGR={index}\r").as_bytes()).await.unwrap();
        let text = read_all(&mut modem).await;
        assert!(text.starts_with("\r\n+CMGR: \"REC UNREAD\",\"+390000000000\""));
        assert!(text.ends_with("\r\nOFF\r\n\r\nOK\r\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn injected_send_failures() {
        let mut modem = SimulatedModem::new();
        let handle = modem.handle();
        handle.fail_next_sends(1);

        modem.send(b"AT+CMSS=1\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\n+CMS ERROR: 500\r\n");
        modem.send(b"AT+CMSS=1\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\n+CMS ERROR: 321\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn phonebook_write_find_delete() {
        let mut modem = SimulatedModem::new();
        let handle = modem.handle();

        modem.send(b"AT+CPBW=,\"+391112223334\",,\"ADMIN\"\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\nOK\r\n");

        modem.send(b"AT+CPBF=\"ADMIN\"\r").await.unwrap();
        assert_eq!(
            read_all(&mut modem).await,
            "\r\n+CPBF: 1,\"+391112223334\",145,\"ADMIN\"\r\n\r\nOK\r\n"
        );

        modem.send(b"AT+CPBW=1\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\nOK\r\n");
        assert!(handle.contacts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_silences_the_modem() {
        let mut modem = SimulatedModem::new();
        let handle = modem.handle();

        modem.send(b"AT+CPWROFF\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "\r\nOK\r\n");
        assert!(!handle.is_powered());

        modem.send(b"AT\r").await.unwrap();
        assert_eq!(read_all(&mut modem).await, "");
    }

    #[test]
    fn quoted_fields_extracts_in_order() {
        assert_eq!(
            quoted_fields(",\"+39123\",,\"BOB\""),
            vec!["+39123".to_string(), "BOB".to_string()]
        );
        assert!(quoted_fields("1,20").is_empty());
    }
}
