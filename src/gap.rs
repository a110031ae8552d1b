//! Hardware counter continuity checks.

use log::{trace, warn};

use crate::protocol::EEG_SAMPLES_PER_READING;
use crate::types::GapOutcome;

/// Watches the 16-bit block counter carried by each completed sample block.
#[derive(Debug, Clone, Default)]
pub struct GapDetector {
    last: Option<u16>,
}

impl GapDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter of the previous observation, if any.
    pub fn last_counter(&self) -> Option<u16> {
        self.last
    }

    /// Classify `counter` against the previous observation.
    ///
    /// The first call always reports [`GapOutcome::Normal`]. A roll-over from
    /// 0xFFFF to 0 is a [`GapOutcome::Reset`] and needs no correction. Any
    /// other discontinuity reports `12 × (delta + 1)` missing samples, where
    /// `delta` is taken modulo 2¹⁶ so gaps that straddle the roll-over are
    /// still counted forward. A counter that lands behind its predecessor by
    /// less than half the counter space is treated as a device restart.
    ///
    /// Forward and backward jumps of 0x8000 blocks or more look the same
    /// modulo 2¹⁶, so an outage that long (about 25 minutes at 256 Hz) is
    /// also reported as a restart and gets no time-axis correction.
    pub fn observe(&mut self, counter: u16) -> GapOutcome {
        let Some(last) = self.last.replace(counter) else {
            return GapOutcome::Normal;
        };

        let diff = i32::from(counter) - i32::from(last);
        if diff == 1 {
            return GapOutcome::Normal;
        }
        if diff == -0xFFFF {
            trace!("hardware counter rolled over ({last} -> {counter})");
            return GapOutcome::Reset;
        }

        let delta = counter.wrapping_sub(last);
        if delta >= 0x8000 {
            warn!("hardware counter discontinuity ({last} -> {counter}); assuming restart");
            return GapOutcome::Reset;
        }
        GapOutcome::Lost(EEG_SAMPLES_PER_READING as u64 * (u64::from(delta) + 1))
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
