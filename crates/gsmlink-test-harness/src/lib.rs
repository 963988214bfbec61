//! gsmlink-test-harness: Test utilities and simulated hardware for gsmlink.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the protocol engine with scripted byte exchanges, [`SimulatedModem`], an
//! in-memory AT modem that stands in for real hardware (the host's
//! simulation mode), and [`RecordingPin`] for asserting on LED and power-key
//! activity.

pub mod mock_pin;
pub mod mock_serial;
pub mod sim_modem;

pub use mock_pin::RecordingPin;
pub use mock_serial::{MockHandle, MockTransport};
pub use sim_modem::{SimHandle, SimulatedModem};
