//! Error types for gsmlink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! queue-capacity errors are all captured here.

/// The error type for all gsmlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open/configure failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (missing storage index, malformed reply).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a response from the modem.
    ///
    /// Never fatal on its own: the modem may be busy, registering, or
    /// resetting.
    #[error("timeout waiting for response")]
    Timeout,

    /// The modem answered with `ERROR`, `+CME ERROR:` or `+CMS ERROR:`.
    ///
    /// The payload is the terminal line as received.
    #[error("modem error: {0}")]
    Modem(String),

    /// An invalid parameter was passed to a modem operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A bounded queue was full and the item was not stored.
    #[error("{0} queue is full")]
    QueueFull(String),

    /// A bounded queue was empty.
    #[error("{0} queue is empty")]
    QueueEmpty(String),

    /// No connection to the modem has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the modem was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from the link itself rather than from the
    /// modem's answer.
    ///
    /// Link failures are the only errors the dispatch loop propagates to its
    /// caller; everything else is folded into the session state machine.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Error::NotConnected | Error::ConnectionLost | Error::Io(_) | Error::Transport(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
