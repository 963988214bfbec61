//! An [`OutputPin`] that records every level written to it.

use std::sync::{Arc, Mutex, MutexGuard};

use gsmlink_core::error::Result;
use gsmlink_core::pin::OutputPin;

/// A pin that logs its level history.
///
/// Clones share the same history, so a test can keep one clone while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingPin {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl RecordingPin {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<bool>> {
        self.levels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every level written, oldest first.
    pub fn levels(&self) -> Vec<bool> {
        self.log().clone()
    }

    /// The last level written, `false` if never driven.
    pub fn is_high(&self) -> bool {
        self.log().last().copied().unwrap_or(false)
    }

    /// Number of low-to-high transitions (a pin starts low).
    pub fn rising_edges(&self) -> usize {
        let levels = self.log();
        let mut previous = false;
        let mut edges = 0;
        for &level in levels.iter() {
            if level && !previous {
                edges += 1;
            }
            previous = level;
        }
        edges
    }

    /// Forget the recorded history.
    pub fn clear(&self) {
        self.log().clear();
    }
}

impl OutputPin for RecordingPin {
    fn set_high(&mut self) -> Result<()> {
        self.log().push(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<()> {
        self.log().push(false);
        Ok(())
    }
}
