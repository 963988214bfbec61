//! SMS and phonebook operations.
//!
//! Each operation is a fixed script: one command, then answers read until
//! a terminal result. Structured intermediate lines (`+CMGW:`, `+CMGR:`,
//! `+CPBR:`, `+CPBF:`) are parsed inline; any other line is parked in the
//! URC queue for the dispatch loop, never treated as a protocol error.

use tracing::{debug, info, warn};

use gsmlink_core::{Error, PhonebookEntry, Result, Sms};

use crate::commands::{self, PHONEBOOK_SEARCH_RANGE};
use crate::engine::Answer;
use crate::modem::Modem;
use crate::protocol::{CTRL_Z, ESC, Framing};

impl Modem {
    /// Store a message in the SIM for later sending and return its index.
    pub async fn write_sms(&mut self, number: &str, body: &str) -> Result<u16> {
        commands::validate_number(number)?;
        commands::validate_body(body)?;
        debug!(number, body, "writing SMS");

        self.engine
            .send_command(&commands::cmd_write_sms(number))
            .await?;
        match self.engine.wait_prompt(self.config.timeouts.prompt).await {
            Ok(()) => {}
            Err(Error::Timeout) => {
                warn!("no body prompt from modem, abandoning message");
                // A late prompt must not swallow the next command as body text.
                self.engine.send_raw(&[ESC]).await?;
                return Err(Error::Timeout);
            }
            Err(Error::Modem(line)) => {
                warn!(line = %line, "modem refused to store message");
                return Err(Error::Modem(line));
            }
            Err(e) => return Err(e),
        }
        self.engine.send_raw(body.as_bytes()).await?;
        tokio::time::sleep(self.config.body_commit_delay).await;
        self.engine.send_raw(&[CTRL_Z]).await?;

        let mut index = None;
        loop {
            match self
                .engine
                .wait_answer(self.config.timeouts.store, false)
                .await?
            {
                Answer::Ok => {
                    return index.ok_or_else(|| {
                        Error::Protocol("message stored without a storage index".into())
                    });
                }
                Answer::Unknown(line) => match commands::parse_stored_index(&line) {
                    Some(i) => {
                        debug!(index = i, "SMS written");
                        index = Some(i);
                    }
                    None => self.engine.stash_urc(line),
                },
                Answer::Error(line) => return Err(Error::Modem(line)),
                Answer::Timeout => return Err(Error::Timeout),
            }
        }
    }

    /// Send the message stored at `index`.
    pub async fn send_sms_at_index(&mut self, index: u16) -> Result<()> {
        debug!(index, "sending stored SMS");
        self.engine
            .execute(
                &commands::cmd_send_stored_sms(index),
                self.config.timeouts.send,
            )
            .await
    }

    /// Read the message stored at `index`.
    ///
    /// `Ok(None)` means the modem answered `OK` without a message header.
    pub async fn read_sms_at_index(&mut self, index: u16) -> Result<Option<Sms>> {
        debug!(index, "reading stored SMS");
        self.engine
            .send_command(&commands::cmd_read_sms(index))
            .await?;

        let mut sms = None;
        loop {
            match self
                .engine
                .wait_answer(self.config.timeouts.read, false)
                .await?
            {
                Answer::Ok => return Ok(sms),
                Answer::Unknown(line) => {
                    let Some(phone) = commands::parse_read_header(&line) else {
                        self.engine.stash_urc(line);
                        continue;
                    };
                    // The body follows the header without its own leading
                    // framing.
                    match self
                        .engine
                        .read_line(self.config.timeouts.body, Framing::Payload)
                        .await?
                    {
                        Some(body) => {
                            debug!(index, phone = %phone, body = %body, "SMS read");
                            sms = Some(Sms::new(&phone, &body));
                        }
                        None => {
                            warn!(index, "timed out reading SMS body");
                            return Err(Error::Timeout);
                        }
                    }
                }
                Answer::Error(line) => return Err(Error::Modem(line)),
                Answer::Timeout => return Err(Error::Timeout),
            }
        }
    }

    /// Delete the message stored at `index`.
    pub async fn delete_sms_at_index(&mut self, index: u16) -> Result<()> {
        debug!(index, "deleting stored SMS");
        self.engine
            .execute(&commands::cmd_delete_sms(index), self.config.timeouts.delete)
            .await
    }

    /// Delete every stored message.
    ///
    /// Waits for the settle delay afterwards whatever the outcome; the
    /// modem hangs if commanded again immediately.
    pub async fn clear_sms_memory(&mut self) -> Result<()> {
        info!("deleting all stored SMS");
        let result = self
            .engine
            .execute(&commands::cmd_delete_all_sms(), self.config.timeouts.clear)
            .await;
        tokio::time::sleep(self.config.settle_delay).await;
        result
    }

    /// Ping the modem.
    pub async fn keepalive(&mut self) -> Result<()> {
        debug!("sending keepalive");
        self.engine
            .execute(&commands::cmd_keepalive(), self.config.timeouts.keepalive)
            .await
    }

    /// Search the first phonebook slots for `number`, returning the slot
    /// of the first match.
    pub async fn number_exists_in_pb(&mut self, number: &str) -> Result<Option<u16>> {
        commands::validate_number(number)?;
        let (first, last) = PHONEBOOK_SEARCH_RANGE;
        debug!(number, first, last, "searching phonebook by number");
        self.engine
            .send_command(&commands::cmd_read_phonebook(first, last))
            .await?;

        let mut found = None;
        loop {
            match self
                .engine
                .wait_answer(self.config.timeouts.phonebook_read, false)
                .await?
            {
                Answer::Ok => {
                    match found {
                        Some(index) => debug!(index, "number found in phonebook"),
                        None => debug!("number not in phonebook"),
                    }
                    return Ok(found);
                }
                Answer::Unknown(line) => match commands::parse_phonebook_entry(&line, "+CPBR") {
                    Some(entry) => {
                        if found.is_none() && entry.number == number {
                            found = Some(entry.index);
                        }
                    }
                    None => self.engine.stash_urc(line),
                },
                Answer::Error(line) => return Err(Error::Modem(line)),
                Answer::Timeout => return Err(Error::Timeout),
            }
        }
    }

    /// Look up the first phonebook entry whose name starts with `name`.
    pub async fn get_pb_entry_by_name(&mut self, name: &str) -> Result<Option<PhonebookEntry>> {
        commands::validate_name(name)?;
        debug!(name, "searching phonebook by name");
        self.engine
            .send_command(&commands::cmd_find_phonebook(name))
            .await?;

        let mut found = None;
        loop {
            match self
                .engine
                .wait_answer(self.config.timeouts.phonebook_find, false)
                .await?
            {
                Answer::Ok => return Ok(found),
                Answer::Unknown(line) => match commands::parse_phonebook_entry(&line, "+CPBF") {
                    Some(entry) => {
                        if found.is_none() {
                            debug!(index = entry.index, number = %entry.number, "phonebook entry found");
                            found = Some(entry);
                        }
                    }
                    None => self.engine.stash_urc(line),
                },
                Answer::Error(line) => return Err(Error::Modem(line)),
                Answer::Timeout => return Err(Error::Timeout),
            }
        }
    }

    /// Write `number` into the first free phonebook slot, optionally with
    /// a name.
    ///
    /// Waits for the settle delay afterwards whatever the outcome.
    pub async fn register_number_in_pb(&mut self, number: &str, name: Option<&str>) -> Result<()> {
        commands::validate_number(number)?;
        if let Some(name) = name {
            commands::validate_name(name)?;
        }
        info!(number, name, "writing phonebook entry");
        let result = self
            .engine
            .execute(
                &commands::cmd_write_phonebook(number, name),
                self.config.timeouts.phonebook_write,
            )
            .await;
        tokio::time::sleep(self.config.settle_delay).await;
        result
    }

    /// Clear phonebook slot `index`.
    pub async fn delete_pb_entry_at_index(&mut self, index: u16) -> Result<()> {
        info!(index, "deleting phonebook entry");
        self.engine
            .execute(
                &commands::cmd_delete_phonebook(index),
                self.config.timeouts.phonebook_delete,
            )
            .await
    }
}
