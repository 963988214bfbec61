//! Transport trait for modem communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the modem.
//! The serial implementation lives in `gsmlink-transport`; the mock and
//! simulated transports used for testing live in `gsmlink-test-harness`.
//!
//! The protocol engine in `gsmlink-modem` operates on a `Transport` rather
//! than directly on a serial port, which is also how a simulation mode is
//! injected at runtime.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a modem.
///
/// Implementations handle buffering and error recovery at the physical
/// layer. Line framing and AT command structure are handled by the engine
/// that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the modem.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the modem into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Change the line speed of the link.
    ///
    /// The modem handshake starts at a high rate and falls back to a fixed
    /// low rate, so the transport must be able to switch without reopening.
    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
