//! Per-connection pipeline: decode, assemble, check continuity, timestamp.
//!
//! A [`Session`] owns all mutable state for one headset connection and is
//! driven one notification at a time, either directly through
//! [`Session::feed`] or as a worker task with [`Session::run`].
//!
//! ```
//! use muse_stream::prelude::*;
//!
//! let mut session = Session::new(SessionConfig::default());
//! let mut events: Vec<SessionEvent> = Vec::new();
//!
//! let mut payload = vec![7u8];
//! payload.extend_from_slice(b"{\"rc\":0}\0\0\0\0\0\0\0\0\0\0\0");
//! session.feed(&RawNotification::new(Channel::Control, payload, 0.0), &mut events);
//!
//! assert!(events.is_empty()); // '}' was beyond the declared length
//! ```

use log::{debug, warn};
use tokio::sync::mpsc;

use crate::assembler::{ChannelAssembler, FlushPolicy};
use crate::clock::{ClockModel, ClockReconciler};
use crate::control::ControlMessageAssembler;
use crate::error::DecodeError;
use crate::gap::GapDetector;
use crate::parse::{decode_control, decode_eeg, decode_telemetry};
use crate::protocol::EEG_FREQUENCY;
use crate::types::{
    Channel, CompletedSample, ControlResponse, Diagnostic, Electrode, GapOutcome,
    RawNotification, SessionEvent,
};

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Destination for session output.
///
/// Emitting never blocks; channel-backed sinks drop events they cannot
/// deliver.
pub trait Sink {
    fn emit(&mut self, event: SessionEvent);
}

impl Sink for Vec<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        self.push(event);
    }
}

impl Sink for mpsc::UnboundedSender<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        if self.send(event).is_err() {
            debug!("session event dropped: receiver closed");
        }
    }
}

impl Sink for mpsc::Sender<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("session event dropped: consumer is not keeping up")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("session event dropped: receiver closed")
            }
        }
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn emit(&mut self, event: SessionEvent) {
        (**self).emit(event);
    }
}

// ── SessionConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Nominal EEG rate; seeds the clock slope at `1 / sample_rate`.
    /// Default: `256.0`.
    pub sample_rate: f64,
    /// Starting covariance of the clock regression. Default: `1e-4`.
    pub initial_covariance: f64,
    /// Handling of blocks closed before every electrode reported.
    /// Default: [`FlushPolicy::Always`].
    pub flush_policy: FlushPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: EEG_FREQUENCY,
            initial_covariance: 1e-4,
            flush_policy: FlushPolicy::Always,
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

pub struct Session {
    assembler: ChannelAssembler,
    gaps: GapDetector,
    clock: ClockReconciler,
    control: ControlMessageAssembler,
    last_sample_time: Option<f64>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            assembler: ChannelAssembler::new(config.flush_policy),
            gaps: GapDetector::new(),
            clock: ClockReconciler::new(config.sample_rate, config.initial_covariance),
            control: ControlMessageAssembler::new(),
            last_sample_time: None,
        }
    }

    /// Process one notification, emitting whatever it completes.
    pub fn feed<S: Sink + ?Sized>(&mut self, notification: &RawNotification, sink: &mut S) {
        match notification.channel {
            Channel::Eeg(electrode) => self.on_eeg(electrode, notification, sink),
            Channel::Control => self.on_control(notification, sink),
            Channel::Telemetry => match decode_telemetry(&notification.payload) {
                Ok(telemetry) => sink.emit(SessionEvent::Telemetry(telemetry)),
                Err(e) => Self::malformed(notification.channel, e, sink),
            },
        }
    }

    /// Drain `notifications` until the transport closes the channel.
    ///
    /// Returns the session so the caller can inspect or [`reset`](Self::reset)
    /// it before reuse.
    pub async fn run<S: Sink>(
        mut self,
        mut notifications: mpsc::Receiver<RawNotification>,
        mut sink: S,
    ) -> Self {
        while let Some(notification) = notifications.recv().await {
            self.feed(&notification, &mut sink);
        }
        debug!("notification channel closed; session worker exiting");
        self
    }

    /// Drop any partial block and message and restart the clock model, as
    /// after a reconnect.
    pub fn reset(&mut self) {
        self.assembler.clear();
        self.gaps.reset();
        self.clock.reset();
        self.control.clear();
        self.last_sample_time = None;
    }

    pub fn clock(&self) -> &ClockModel {
        self.clock.model()
    }

    /// Host timestamp of the newest sample emitted so far.
    ///
    /// External supervisors can compare this with the host clock to decide
    /// when the stream has stalled.
    pub fn last_sample_time(&self) -> Option<f64> {
        self.last_sample_time
    }

    fn on_eeg<S: Sink + ?Sized>(
        &mut self,
        electrode: Electrode,
        notification: &RawNotification,
        sink: &mut S,
    ) {
        let frame = match decode_eeg(&notification.payload) {
            Ok(frame) => frame,
            Err(e) => return Self::malformed(notification.channel, e, sink),
        };
        self.clock.anchor(notification.arrival_time);

        let Some(block) = self
            .assembler
            .feed(electrode, &frame, notification.arrival_time)
        else {
            return;
        };

        let previous = self.gaps.last_counter();
        let gap = self.gaps.observe(block.counter);
        if let (GapOutcome::Lost(missing), Some(previous)) = (gap, previous) {
            warn!(
                "missing EEG blocks: counter {previous} -> {}, {missing} samples skipped",
                block.counter
            );
            sink.emit(SessionEvent::Diagnostic(Diagnostic::DataLoss {
                previous,
                counter: block.counter,
                missing,
            }));
        }

        let earliest = block
            .earliest_arrival()
            .unwrap_or(notification.arrival_time);
        let timestamps = self.clock.reconcile(earliest, gap);
        let sample = CompletedSample {
            counter: block.counter,
            timestamps,
            data: block.data,
        };
        self.last_sample_time = Some(sample.last_timestamp());
        sink.emit(SessionEvent::Sample(sample));
    }

    fn on_control<S: Sink + ?Sized>(&mut self, notification: &RawNotification, sink: &mut S) {
        let fragment = match decode_control(&notification.payload) {
            Ok(fragment) => fragment,
            Err(e) => return Self::malformed(notification.channel, e, sink),
        };
        debug!("control fragment: {:?}", fragment.text);

        let Some(raw) = self.control.feed(&fragment.text) else {
            return;
        };
        let fields = match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => {
                warn!("control reply is not a JSON object: {raw}");
                serde_json::Map::new()
            }
            Err(e) => {
                warn!("control reply JSON error: {e} | raw: {raw}");
                serde_json::Map::new()
            }
        };
        sink.emit(SessionEvent::Control(ControlResponse { raw, fields }));
    }

    fn malformed<S: Sink + ?Sized>(channel: Channel, error: DecodeError, sink: &mut S) {
        warn!("dropping {channel:?} notification: {error}");
        sink.emit(SessionEvent::Diagnostic(Diagnostic::MalformedPacket {
            channel,
            error,
        }));
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
