use serde::Serialize;

use crate::error::DecodeError;
use crate::protocol::{EEG_CHANNEL_COUNT, EEG_CHANNEL_NAMES, EEG_SAMPLES_PER_READING};

/// One electrode on the classic Muse headband, in block-row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Electrode {
    /// Left rear.
    Tp9,
    /// Left front.
    Af7,
    /// Right front.
    Af8,
    /// Right rear. Its arrival completes a sample block.
    Tp10,
    /// Auxiliary input; only notified when the AUX characteristic is subscribed.
    Aux,
}

impl Electrode {
    pub const ALL: [Electrode; EEG_CHANNEL_COUNT] = [
        Electrode::Tp9,
        Electrode::Af7,
        Electrode::Af8,
        Electrode::Tp10,
        Electrode::Aux,
    ];

    /// Row of this electrode in a [`CompletedSample::data`] matrix.
    pub fn row(self) -> usize {
        self as usize
    }

    pub fn from_row(row: usize) -> Option<Electrode> {
        Self::ALL.get(row).copied()
    }

    pub fn name(self) -> &'static str {
        EEG_CHANNEL_NAMES[self.row()]
    }
}

/// Logical source of a BLE notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Eeg(Electrode),
    Telemetry,
    Control,
}

/// A notification as handed over by the transport.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub channel: Channel,
    pub payload: Vec<u8>,
    /// Host clock reading at delivery, in seconds.
    pub arrival_time: f64,
}

impl RawNotification {
    pub fn new(channel: Channel, payload: impl Into<Vec<u8>>, arrival_time: f64) -> Self {
        Self {
            channel,
            payload: payload.into(),
            arrival_time,
        }
    }
}

/// One electrode notification, decoded and calibrated.
#[derive(Debug, Clone, PartialEq)]
pub struct EegFrame {
    /// Hardware sample-block counter (wraps at 0xFFFF).
    pub counter: u16,
    /// Twelve consecutive samples in µV.
    pub samples: [f64; EEG_SAMPLES_PER_READING],
}

/// The meaningful part of one control-channel notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFragment {
    /// Declared length from the first payload byte (may exceed `text.len()`).
    pub length: u8,
    pub text: String,
}

/// Battery telemetry from the classic telemetry characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    /// Packet sequence tag (wraps at 0xFFFF).
    pub sequence_id: u16,
    /// State of charge in percent: raw reading ÷ 512.
    pub battery: f64,
}

/// A fully assembled and timestamped block of 12 samples across all rows.
///
/// Rows that never received data hold `f64::NAN`, which serialises to JSON
/// `null`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedSample {
    /// Hardware counter carried by the frame that completed the block.
    pub counter: u16,
    /// Host-clock timestamp of each of the 12 samples, in seconds.
    pub timestamps: [f64; EEG_SAMPLES_PER_READING],
    /// µV, indexed `[electrode row][sample]`.
    pub data: [[f64; EEG_SAMPLES_PER_READING]; EEG_CHANNEL_COUNT],
}

impl CompletedSample {
    pub fn channel(&self, electrode: Electrode) -> &[f64; EEG_SAMPLES_PER_READING] {
        &self.data[electrode.row()]
    }

    /// Timestamp of the newest sample in the block.
    pub fn last_timestamp(&self) -> f64 {
        self.timestamps[EEG_SAMPLES_PER_READING - 1]
    }

    /// Split the block into its 12 instants, oldest first, each carrying one
    /// value per electrode row.
    pub fn samples(&self) -> impl Iterator<Item = EegSample> + '_ {
        self.timestamps
            .iter()
            .enumerate()
            .map(|(i, &timestamp)| EegSample {
                timestamp,
                data: std::array::from_fn(|row| self.data[row][i]),
            })
    }
}

/// One instant of EEG across all electrodes.
///
/// Serialises as `{"timestamp": …, "data": [TP9, AF7, AF8, TP10, AUX]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EegSample {
    /// Host-clock timestamp in seconds.
    pub timestamp: f64,
    /// µV per electrode, in [`Electrode::row`] order.
    pub data: [f64; EEG_CHANNEL_COUNT],
}

/// A complete control/status reply from the headset.
#[derive(Debug, Clone)]
pub struct ControlResponse {
    /// The reassembled text, exactly as received.
    pub raw: String,
    /// Parsed JSON object; empty when `raw` is not a JSON object.
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Classification of a hardware counter against its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapOutcome {
    /// The counter advanced by exactly one.
    Normal,
    /// The counter rolled over (or was restarted); no index correction.
    Reset,
    /// Blocks went missing; the running sample index is advanced by this
    /// many extra samples.
    Lost(u64),
}

/// Non-fatal data-quality signals.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The hardware counter skipped.
    DataLoss {
        previous: u16,
        counter: u16,
        missing: u64,
    },
    /// A payload could not be decoded and was dropped.
    MalformedPacket { channel: Channel, error: DecodeError },
}

/// Everything a [`crate::session::Session`] can emit.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Sample(CompletedSample),
    Control(ControlResponse),
    Telemetry(Telemetry),
    Diagnostic(Diagnostic),
}
