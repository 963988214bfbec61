//! Command/response engine.
//!
//! [`CommandEngine`] owns the transport and is the only code that touches
//! it. It frames received bytes into lines, classifies lines into
//! [`Answer`]s, and parks unsolicited lines that arrive during a command
//! wait in a bounded URC queue so the dispatch loop can process them later.
//!
//! The link is strictly half-duplex: a command is sent, then lines are read
//! until a terminal result (or a timeout) before anything else is sent.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use gsmlink_core::{BoundedQueue, Deadline, Error, Result, SharedClock, Transport};

use crate::protocol::{self, Framing, FramerStep, LineFramer, LineKind};

/// Capacity of the unsolicited-line queue.
pub const URC_QUEUE_CAPACITY: usize = 10;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 64;

/// Classified outcome of waiting for a command's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// `OK`.
    Ok,
    /// `ERROR`, `+CME ERROR: ..` or `+CMS ERROR: ..`; the line verbatim.
    Error(String),
    /// No line arrived within the idle timeout.
    Timeout,
    /// Any other line, returned for caller-specific parsing.
    Unknown(String),
}

impl Answer {
    /// Map a terminal answer onto `Result`.
    ///
    /// An `Unknown` line at this point means the caller asked for the line
    /// back and then did not parse it; it is reported as a protocol error.
    pub fn into_result(self) -> Result<()> {
        match self {
            Answer::Ok => Ok(()),
            Answer::Error(line) => Err(Error::Modem(line)),
            Answer::Timeout => Err(Error::Timeout),
            Answer::Unknown(line) => Err(Error::Protocol(format!("unexpected line {line:?}"))),
        }
    }
}

/// Sends commands and reads framed, classified answers.
pub struct CommandEngine {
    transport: Box<dyn Transport>,
    clock: SharedClock,
    /// Received bytes not yet consumed by the framer.
    pending: BytesMut,
    line_capacity: usize,
    urcs: BoundedQueue<String, URC_QUEUE_CAPACITY>,
}

impl CommandEngine {
    pub fn new(transport: Box<dyn Transport>, clock: SharedClock, line_capacity: usize) -> Self {
        CommandEngine {
            transport,
            clock,
            pending: BytesMut::with_capacity(READ_CHUNK * 2),
            line_capacity,
            urcs: BoundedQueue::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Change the local line speed.
    pub async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        debug!(baud_rate, "setting local baud rate");
        self.transport.set_baud_rate(baud_rate).await
    }

    /// Close the underlying transport.
    pub async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        self.transport.close().await
    }

    // ---------------------------------------------------------------
    // Sending
    // ---------------------------------------------------------------

    /// Send a command line, appending the CR terminator.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        debug!(command, "sending command");
        self.transport
            .send(&protocol::encode_command(command))
            .await
    }

    /// Send bytes verbatim, without a terminator.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        trace!(len = data.len(), "sending raw bytes");
        self.transport.send(data).await
    }

    /// Send a command and wait for `OK`, queueing any other line as a URC.
    pub async fn execute(&mut self, command: &str, timeout: Duration) -> Result<()> {
        self.send_command(command).await?;
        self.wait_answer(timeout, true).await?.into_result()
    }

    // ---------------------------------------------------------------
    // Receiving
    // ---------------------------------------------------------------

    /// Read one framed line.
    ///
    /// `timeout` bounds the idle time between reads, not the total time.
    /// Returns `Ok(None)` if the link goes quiet before a line completes; a
    /// partially accumulated line is discarded. A line that outgrows the
    /// line capacity is cut short and returned, and the byte that did not
    /// fit is kept for the next read.
    pub async fn read_line(
        &mut self,
        timeout: Duration,
        framing: Framing,
    ) -> Result<Option<String>> {
        let mut framer = LineFramer::new(framing, self.line_capacity);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some(&byte) = self.pending.first() {
                match framer.push(byte) {
                    FramerStep::Continue => self.pending.advance(1),
                    FramerStep::Line => {
                        self.pending.advance(1);
                        let line = framer.into_line();
                        trace!(line = %line, "received line");
                        return Ok(Some(line));
                    }
                    FramerStep::Full => {
                        warn!(
                            capacity = self.line_capacity,
                            "receive line overflow, truncating"
                        );
                        return Ok(Some(framer.into_line()));
                    }
                }
            }

            match self.transport.receive(&mut chunk, timeout).await {
                Ok(0) | Err(Error::Timeout) => {
                    if framer.has_partial() {
                        debug!(len = framer.len(), "discarding partial line on timeout");
                    }
                    return Ok(None);
                }
                Ok(n) => {
                    trace!(len = n, "received bytes");
                    self.pending.extend_from_slice(&chunk[..n]);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read lines until a terminal result or a timeout.
    ///
    /// With `handle_urc` set, every non-terminal line is queued as an
    /// unsolicited code and the wait continues; otherwise the first such
    /// line is handed back as [`Answer::Unknown`].
    pub async fn wait_answer(&mut self, timeout: Duration, handle_urc: bool) -> Result<Answer> {
        loop {
            let Some(line) = self.read_line(timeout, Framing::Standard).await? else {
                debug!("no answer before timeout");
                return Ok(Answer::Timeout);
            };

            match protocol::classify_line(&line) {
                LineKind::Ok => return Ok(Answer::Ok),
                LineKind::Error => {
                    debug!(line = %line, "modem reported error");
                    return Ok(Answer::Error(line));
                }
                LineKind::Other if handle_urc => self.stash_urc(line),
                LineKind::Other => return Ok(Answer::Unknown(line)),
            }
        }
    }

    /// Wait for the `>` body prompt, discarding anything before it.
    ///
    /// A terminal failure line ahead of the prompt means the command was
    /// refused; it is returned as [`Error::Modem`]. Bytes after the prompt
    /// stay pending.
    pub async fn wait_prompt(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Deadline::armed(self.clock.clone(), timeout);
        let mut chunk = [0u8; READ_CHUNK];
        let mut framer = LineFramer::new(Framing::Standard, self.line_capacity);

        loop {
            let prompt = self.pending.iter().position(|&b| b == protocol::PROMPT);
            let skipped = &self.pending[..prompt.unwrap_or(self.pending.len())];
            if let Some(line) = find_refusal(&mut framer, skipped, self.line_capacity) {
                self.pending.clear();
                return Err(Error::Modem(line));
            }
            if let Some(pos) = prompt {
                self.pending.advance(pos + 1);
                return Ok(());
            }
            self.pending.clear();

            if deadline.is_expired() {
                return Err(Error::Timeout);
            }
            match self.transport.receive(&mut chunk, deadline.remaining()).await {
                Ok(0) | Err(Error::Timeout) => return Err(Error::Timeout),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(e),
            }
        }
    }

    /// Drop everything the modem sends for up to `duration`.
    ///
    /// Stops early once the link stays quiet for the rest of the window.
    pub async fn discard_input(&mut self, duration: Duration) -> Result<()> {
        let deadline = Deadline::armed(self.clock.clone(), duration);
        let mut chunk = [0u8; READ_CHUNK];
        let mut discarded = self.pending.len();
        self.pending.clear();

        while !deadline.is_expired() {
            match self.transport.receive(&mut chunk, deadline.remaining()).await {
                Ok(0) | Err(Error::Timeout) => break,
                Ok(n) => discarded += n,
                Err(e) => return Err(e),
            }
        }
        if discarded > 0 {
            debug!(discarded, "flushed stale input");
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Unsolicited lines
    // ---------------------------------------------------------------

    /// Queue a line for later URC processing. Dropped with a warning if
    /// the queue is full.
    pub fn stash_urc(&mut self, line: String) {
        debug!(line = %line, "queueing unsolicited line");
        if let Err(line) = self.urcs.enqueue(line) {
            warn!(line = %line, "URC queue full, dropping line");
        }
    }

    /// Take the oldest queued unsolicited line.
    pub fn next_urc(&mut self) -> Option<String> {
        self.urcs.dequeue()
    }

    pub fn pending_urcs(&self) -> usize {
        self.urcs.count()
    }
}

/// Frame `bytes` and return the first terminal failure line among them.
///
/// `framer` carries a partial line over to the next call.
fn find_refusal(framer: &mut LineFramer, bytes: &[u8], capacity: usize) -> Option<String> {
    for &byte in bytes {
        match framer.push(byte) {
            FramerStep::Continue => {}
            FramerStep::Line => {
                let done = std::mem::replace(framer, LineFramer::new(Framing::Standard, capacity));
                let line = done.into_line();
                if protocol::classify_line(&line) == LineKind::Error {
                    return Some(line);
                }
                trace!(line = %line, "skipped line before prompt");
            }
            // Overlong noise; start over.
            FramerStep::Full => *framer = LineFramer::new(Framing::Standard, capacity),
        }
    }
    None
}
