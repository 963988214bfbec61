//! Transport implementations for gsmlink.
//!
//! This crate provides the serial implementation of the
//! [`Transport`](gsmlink_core::Transport) trait from `gsmlink-core`.
//!
//! # Example
//!
//! ```no_run
//! use gsmlink_transport::SerialTransport;
//! use gsmlink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> gsmlink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115_200).await?;
//!
//! transport.send(b"AT\r").await?;
//!
//! let mut buf = [0u8; 64];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits};
