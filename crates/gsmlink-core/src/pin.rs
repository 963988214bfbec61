//! Digital output abstraction for the board pins the engine drives.
//!
//! The engine toggles two lines: the network status LED and the modem's
//! power key. Board support code implements [`OutputPin`] for its GPIO.

use crate::error::Result;

/// A single digital output.
pub trait OutputPin: Send + Sync {
    /// Drive the line high.
    fn set_high(&mut self) -> Result<()>;

    /// Drive the line low.
    fn set_low(&mut self) -> Result<()>;

    /// Drive the line to `high`.
    fn set_level(&mut self, high: bool) -> Result<()> {
        if high { self.set_high() } else { self.set_low() }
    }
}

/// An output that goes nowhere, for hosts without the corresponding line.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPin;

impl OutputPin for NullPin {
    fn set_high(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_low(&mut self) -> Result<()> {
        Ok(())
    }
}
