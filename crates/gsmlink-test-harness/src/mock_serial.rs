//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs plus a stream of unsolicited bytes that can be
//! delivered without any request, the way a modem pushes URCs. Bytes can
//! also be scheduled to arrive later on the tokio clock, for exercising
//! read timeouts with paused time.
//!
//! # Example
//!
//! ```
//! use gsmlink_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // When the engine sends the keepalive, answer OK.
//! mock.expect(b"AT\r", b"\r\nOK\r\n");
//! // A new-message notification arrives on its own.
//! mock.queue_unsolicited(b"\r\n+CMTI: \"SM\",3\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use gsmlink_core::error::{Error, Result};
use gsmlink_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes made readable once the matching request is sent.
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be returned by `receive()`.
    inbound: VecDeque<u8>,
    /// Chunks that become readable at a later instant, earliest first.
    scheduled: VecDeque<(Instant, Vec<u8>)>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all bytes sent through this transport, one entry per `send()`.
    sent_log: Vec<Vec<u8>>,
    /// Every baud rate requested through `set_baud_rate()`.
    baud_log: Vec<u32>,
}

/// A mock [`Transport`] for testing the engine without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; on a match
/// the paired response is appended to the readable byte stream.
///
/// If no expectation matches or the queue is exhausted, `send()` returns
/// [`Error::Protocol`]. `receive()` returns [`Error::Timeout`] immediately
/// when nothing is readable or scheduled, so tests never wait on the wall
/// clock. A scheduled chunk makes `receive()` sleep until it arrives, or
/// for the full timeout if it is due later.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// A shared view of a [`MockTransport`] that stays with the test after the
/// transport itself has been moved into the engine.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                inbound: VecDeque::new(),
                scheduled: VecDeque::new(),
                connected: true,
                sent_log: Vec::new(),
                baud_log: Vec::new(),
            })),
        }
    }

    /// Get a handle for scripting and inspecting this mock later.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Add an expected request/response pair. See [`MockHandle::expect`].
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.handle().expect(request, response);
    }

    /// Make bytes readable without a request. See [`MockHandle::queue_unsolicited`].
    pub fn queue_unsolicited(&self, bytes: &[u8]) {
        self.handle().queue_unsolicited(bytes);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data equal to `request`, `response` is
    /// appended to the bytes subsequent `receive()` calls return. An empty
    /// response makes nothing readable.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Append bytes to the readable stream without any request.
    pub fn queue_unsolicited(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes.iter().copied());
    }

    /// Make `bytes` readable `delay` after now, on the tokio clock.
    ///
    /// Chunks must be scheduled in arrival order. Meant for tests running
    /// with paused time.
    pub fn queue_delayed(&self, delay: Duration, bytes: &[u8]) {
        lock(&self.state)
            .scheduled
            .push_back((Instant::now() + delay, bytes.to_vec()));
    }

    /// All data sent through the transport, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// All data sent, concatenated and decoded lossily.
    pub fn sent_text(&self) -> String {
        let state = lock(&self.state);
        let bytes: Vec<u8> = state.sent_log.iter().flatten().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Number of `send()` calls whose data equals `request`.
    pub fn count_sent(&self, request: &[u8]) -> usize {
        lock(&self.state)
            .sent_log
            .iter()
            .filter(|sent| sent.as_slice() == request)
            .count()
    }

    /// Every baud rate requested, oldest first.
    pub fn baud_rates(&self) -> Vec<u32> {
        lock(&self.state).baud_log.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    /// Number of bytes still readable.
    pub fn unread_bytes(&self) -> usize {
        lock(&self.state).inbound.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        match state.expectations.pop_front() {
            Some(expectation) if data == expectation.request.as_slice() => {
                state.inbound.extend(expectation.response);
                Ok(())
            }
            Some(expectation) => Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            ))),
            None => Err(Error::Protocol(format!(
                "no more expectations in mock transport (sent {:?})",
                String::from_utf8_lossy(data)
            ))),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let due = {
            let state = lock(&self.state);
            if !state.connected {
                return Err(Error::NotConnected);
            }
            match state.scheduled.front() {
                Some(&(at, _)) if state.inbound.is_empty() => Some(at),
                _ => None,
            }
        };

        if let Some(at) = due {
            let give_up = Instant::now() + timeout;
            if at > give_up {
                tokio::time::sleep_until(give_up).await;
                return Err(Error::Timeout);
            }
            tokio::time::sleep_until(at).await;
            let mut state = lock(&self.state);
            if let Some((_, chunk)) = state.scheduled.pop_front() {
                state.inbound.extend(chunk);
            }
        }

        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }
        if state.inbound.is_empty() {
            return Err(Error::Timeout);
        }

        let n = state.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.baud_log.push(baud_rate);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.inbound.clear();
        state.scheduled.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}
