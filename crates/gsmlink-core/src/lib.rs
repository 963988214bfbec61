//! gsmlink-core: Core traits, types, and error definitions for gsmlink.
//!
//! This crate defines the hardware-agnostic abstractions the modem protocol
//! engine is built on. Host applications and test harnesses depend on these
//! types without pulling in the engine or a concrete serial port.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to the modem
//! - [`OutputPin`] -- a digital output (network LED, power key)
//! - [`Clock`] / [`Deadline`] -- wraparound-safe millisecond timing
//! - [`BoundedQueue`] -- fixed-capacity FIFO used for URCs and SIM indices
//! - [`ModemEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod clock;
pub mod error;
pub mod events;
pub mod pin;
pub mod queue;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use gsmlink_core::*`.
pub use clock::{Clock, Deadline, SharedClock, TokioClock, elapsed_ms};
pub use error::{Error, Result};
pub use events::ModemEvent;
pub use pin::{NullPin, OutputPin};
pub use queue::BoundedQueue;
pub use transport::Transport;
pub use types::*;
