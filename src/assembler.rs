//! Reassembly of per-electrode notifications into multi-channel blocks.
//!
//! The headset notifies each electrode characteristic separately, one
//! 12-sample frame at a time. Frames belonging to the same block share a
//! hardware counter; TP10 is notified last and closes the block.

use log::trace;

use crate::protocol::{EEG_CHANNEL_COUNT, EEG_SAMPLES_PER_READING};
use crate::types::{EegFrame, Electrode};

/// Electrode whose frame closes a block.
pub const TRIGGER_ELECTRODE: Electrode = Electrode::Tp10;

/// Electrodes every block is expected to carry.
const REQUIRED: [Electrode; 4] = [Electrode::Tp9, Electrode::Af7, Electrode::Af8, Electrode::Tp10];

/// What to do with a block whose trigger arrives before its other rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Flush whatever the rows hold: unset (`NaN`) or a frame left over
    /// from the previous cycle.
    #[default]
    Always,
    /// Drop blocks in which any required electrode is missing or stale.
    RequireAllChannels,
}

/// An in-flight or freshly flushed block of 12 samples per electrode.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    /// µV per `[row][sample]`; `NaN` until written.
    pub data: [[f64; EEG_SAMPLES_PER_READING]; EEG_CHANNEL_COUNT],
    /// Host arrival time per row; `NaN` until written.
    pub arrivals: [f64; EEG_CHANNEL_COUNT],
    /// Counter of the most recently written frame.
    pub counter: u16,
    row_counters: [Option<u16>; EEG_CHANNEL_COUNT],
}

impl Default for SampleBlock {
    fn default() -> Self {
        Self {
            data: [[f64::NAN; EEG_SAMPLES_PER_READING]; EEG_CHANNEL_COUNT],
            arrivals: [f64::NAN; EEG_CHANNEL_COUNT],
            counter: 0,
            row_counters: [None; EEG_CHANNEL_COUNT],
        }
    }
}

impl SampleBlock {
    fn write(&mut self, electrode: Electrode, frame: &EegFrame, arrival_time: f64) {
        let row = electrode.row();
        self.data[row] = frame.samples;
        self.arrivals[row] = arrival_time;
        self.row_counters[row] = Some(frame.counter);
        self.counter = frame.counter;
    }

    /// Earliest recorded arrival, ignoring unset rows.
    pub fn earliest_arrival(&self) -> Option<f64> {
        self.arrivals
            .iter()
            .copied()
            .filter(|t| !t.is_nan())
            .reduce(f64::min)
    }

    /// Required electrodes that did not report a frame with this block's
    /// counter, either because nothing arrived or the row is left over from
    /// an earlier cycle.
    pub fn missing(&self) -> impl Iterator<Item = Electrode> + '_ {
        REQUIRED
            .into_iter()
            .filter(move |e| self.row_counters[e.row()] != Some(self.counter))
    }

    pub fn is_complete(&self) -> bool {
        self.missing().next().is_none()
    }
}

/// Collects electrode frames until the trigger electrode closes a block.
#[derive(Debug, Clone, Default)]
pub struct ChannelAssembler {
    block: SampleBlock,
    policy: FlushPolicy,
}

impl ChannelAssembler {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            block: SampleBlock::default(),
            policy,
        }
    }

    /// Store `frame` in the row for `electrode`. Returns the finished block
    /// when `electrode` is the trigger, after which collection starts over
    /// from an unset block.
    pub fn feed(
        &mut self,
        electrode: Electrode,
        frame: &EegFrame,
        arrival_time: f64,
    ) -> Option<SampleBlock> {
        self.block.write(electrode, frame, arrival_time);
        if electrode != TRIGGER_ELECTRODE {
            return None;
        }

        let block = std::mem::take(&mut self.block);
        if !block.is_complete() {
            let missing: Vec<_> = block.missing().map(Electrode::name).collect();
            trace!("block {} flushed without {missing:?}", block.counter);
            if self.policy == FlushPolicy::RequireAllChannels {
                return None;
            }
        }
        Some(block)
    }

    /// Discard the in-flight block.
    pub fn clear(&mut self) {
        self.block = SampleBlock::default();
    }
}
