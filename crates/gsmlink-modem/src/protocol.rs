//! Line framing and terminal-line classification for the AT protocol.
//!
//! Modem responses arrive on a byte stream with no message boundaries of its
//! own. Every response line is framed as `<CR><LF>text<CR><LF>`, except the
//! body of a stored SMS, which follows its header line directly and is
//! closed by `<CR><LF>`. SMS bodies may contain a bare `<LF>`, so only the
//! `<CR><LF>` pair ever terminates a line.
//!
//! [`LineFramer`] is a pure push-parser over single bytes; the engine owns
//! the transport and feeds it.

/// Carriage return.
pub const CR: u8 = b'\r';
/// Line feed.
pub const LF: u8 = b'\n';
/// Ctrl+Z, commits an SMS body in text mode.
pub const CTRL_Z: u8 = 0x1A;
/// Escape, abandons an SMS body in text mode.
pub const ESC: u8 = 0x1B;
/// The prompt the modem sends when it is ready for an SMS body.
pub const PROMPT: u8 = b'>';

/// Terminal success line.
pub const OK: &str = "OK";
/// Terminal failure line.
pub const ERROR: &str = "ERROR";
/// Prefix of an equipment (07.07) error report.
pub const CME_ERROR: &str = "+CME ERROR:";
/// Prefix of a message-service (07.05) error report.
pub const CMS_ERROR: &str = "+CMS ERROR:";

/// How the start of a line is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Bytes up to the first `<CR><LF>` are discarded; the payload runs to
    /// the next `<CR><LF>`. Blank framed lines are skipped.
    Standard,
    /// No leading `<CR><LF>` is expected: payload accumulation starts with
    /// the first byte. Used for SMS text following a `+CMGR:` header.
    Payload,
}

/// Outcome of feeding one byte to a [`LineFramer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerStep {
    /// The byte was consumed; no line yet.
    Continue,
    /// The byte was consumed and completed a line.
    Line,
    /// The line buffer is full. The byte was **not** consumed.
    Full,
}

/// Accumulates one response line from single bytes.
#[derive(Debug)]
pub struct LineFramer {
    framing: Framing,
    capacity: usize,
    started: bool,
    pending_cr: bool,
    line: Vec<u8>,
}

impl LineFramer {
    /// Create a framer whose line holds at most `capacity` bytes.
    pub fn new(framing: Framing, capacity: usize) -> Self {
        LineFramer {
            framing,
            capacity,
            started: framing == Framing::Payload,
            pending_cr: false,
            line: Vec::with_capacity(capacity),
        }
    }

    /// Feed one byte.
    pub fn push(&mut self, byte: u8) -> FramerStep {
        if byte == CR {
            // A CR is never stored; a second CR simply keeps the flag set.
            self.pending_cr = true;
            return FramerStep::Continue;
        }

        if byte == LF && self.pending_cr {
            self.pending_cr = false;
            if !self.started {
                self.started = true;
                return FramerStep::Continue;
            }
            if self.line.is_empty() && self.framing == Framing::Standard {
                // `<CR><LF><CR><LF>`: treat the second pair as framing.
                return FramerStep::Continue;
            }
            return FramerStep::Line;
        }

        self.pending_cr = false;
        if !self.started {
            return FramerStep::Continue;
        }
        if self.line.len() >= self.capacity {
            return FramerStep::Full;
        }
        self.line.push(byte);
        FramerStep::Continue
    }

    /// Whether any payload byte has been accumulated.
    pub fn has_partial(&self) -> bool {
        !self.line.is_empty()
    }

    /// Number of payload bytes accumulated.
    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// Consume the framer, returning the accumulated line.
    ///
    /// Invalid UTF-8 is replaced rather than rejected: the line is still
    /// useful for classification and logging.
    pub fn into_line(self) -> String {
        String::from_utf8_lossy(&self.line).into_owned()
    }
}

/// Classification of a complete response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Exactly `OK`.
    Ok,
    /// Exactly `ERROR`, or a `+CME ERROR:` / `+CMS ERROR:` report.
    Error,
    /// Anything else: an intermediate result or an unsolicited code.
    Other,
}

/// Classify a response line as terminal success, terminal failure, or other.
pub fn classify_line(line: &str) -> LineKind {
    if line == OK {
        LineKind::Ok
    } else if line == ERROR || line.starts_with(CME_ERROR) || line.starts_with(CMS_ERROR) {
        LineKind::Error
    } else {
        LineKind::Other
    }
}

/// Append the transport-level terminator to a command line.
pub fn encode_command(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(CR);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed bytes until a line completes or the buffer fills.
    fn frame(input: &[u8], framing: Framing, capacity: usize) -> (Option<String>, usize) {
        let mut framer = LineFramer::new(framing, capacity);
        for (consumed, &byte) in input.iter().enumerate() {
            match framer.push(byte) {
                FramerStep::Continue => {}
                FramerStep::Line => return (Some(framer.into_line()), consumed + 1),
                FramerStep::Full => return (Some(framer.into_line()), consumed),
            }
        }
        (None, input.len())
    }

    // -----------------------------------------------------------------------
    // Standard framing
    // -----------------------------------------------------------------------

    #[test]
    fn standard_line() {
        assert_eq!(
            frame(b"\r\nHELLO\r\n", Framing::Standard, 160),
            (Some("HELLO".into()), 9)
        );
    }

    #[test]
    fn standard_discards_noise_before_framing() {
        assert_eq!(
            frame(b"AT\r\r\nOK\r\n", Framing::Standard, 160).0.as_deref(),
            Some("OK")
        );
    }

    #[test]
    fn standard_skips_blank_lines() {
        assert_eq!(
            frame(b"\r\n\r\n\r\nOK\r\n", Framing::Standard, 160).0.as_deref(),
            Some("OK")
        );
    }

    #[test]
    fn standard_keeps_bare_lf() {
        assert_eq!(
            frame(b"\r\nA\nB\r\n", Framing::Standard, 160).0.as_deref(),
            Some("A\nB")
        );
    }

    #[test]
    fn standard_incomplete_yields_nothing() {
        let (line, consumed) = frame(b"\r\n+CMTI: \"SM\",", Framing::Standard, 160);
        assert_eq!(line, None);
        assert_eq!(consumed, 14);
    }

    #[test]
    fn back_to_back_lines_consume_their_own_framing() {
        let input = b"\r\n+CMGW: 3\r\n\r\nOK\r\n";
        let (first, consumed) = frame(input, Framing::Standard, 160);
        assert_eq!(first.as_deref(), Some("+CMGW: 3"));
        let (second, _) = frame(&input[consumed..], Framing::Standard, 160);
        assert_eq!(second.as_deref(), Some("OK"));
    }

    // -----------------------------------------------------------------------
    // Payload framing
    // -----------------------------------------------------------------------

    #[test]
    fn payload_starts_immediately_and_keeps_bare_lf() {
        assert_eq!(
            frame(b"A\nB\r\n", Framing::Payload, 160).0.as_deref(),
            Some("A\nB")
        );
    }

    #[test]
    fn payload_allows_empty_line() {
        assert_eq!(frame(b"\r\n", Framing::Payload, 160).0.as_deref(), Some(""));
    }

    #[test]
    fn stray_cr_is_dropped() {
        assert_eq!(
            frame(b"ON\r22\r\n", Framing::Payload, 160).0.as_deref(),
            Some("ON22")
        );
    }

    // -----------------------------------------------------------------------
    // Overflow
    // -----------------------------------------------------------------------

    #[test]
    fn overflow_terminates_without_consuming() {
        let (line, consumed) = frame(b"\r\nABCDEFG\r\n", Framing::Standard, 4);
        assert_eq!(line.as_deref(), Some("ABCD"));
        // 2 framing bytes + 4 payload bytes; `E` is left for the next read.
        assert_eq!(consumed, 6);
    }

    #[test]
    fn exact_capacity_line_is_not_overflow() {
        let (line, consumed) = frame(b"\r\nABCD\r\n", Framing::Standard, 4);
        assert_eq!(line.as_deref(), Some("ABCD"));
        assert_eq!(consumed, 8);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let line = frame(b"\r\n\xFFOK\r\n", Framing::Standard, 160).0.unwrap();
        assert!(line.ends_with("OK"));
        assert_ne!(line, "OK");
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    #[test]
    fn classify_terminal_lines() {
        assert_eq!(classify_line("OK"), LineKind::Ok);
        assert_eq!(classify_line("ERROR"), LineKind::Error);
        assert_eq!(classify_line("+CME ERROR: 123"), LineKind::Error);
        assert_eq!(classify_line("+CMS ERROR: 500"), LineKind::Error);
    }

    #[test]
    fn classify_is_exact_for_ok_and_error() {
        assert_eq!(classify_line("OK "), LineKind::Other);
        assert_eq!(classify_line("ERRORS"), LineKind::Other);
        assert_eq!(classify_line("+CMTI: \"SM\",1"), LineKind::Other);
        assert_eq!(classify_line(""), LineKind::Other);
    }

    #[test]
    fn encode_appends_cr() {
        assert_eq!(encode_command("AT+CMSS=3"), b"AT+CMSS=3\r".to_vec());
    }
}
