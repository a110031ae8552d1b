//! Mapping of the headset's sample index onto the host clock.
//!
//! BLE notifications arrive in bursts, so stamping samples with their arrival
//! time gives irregular spacing. Instead the hardware sample index is taken
//! as ground truth and regressed against arrival times with a one-parameter
//! recursive least-squares filter: the epoch is pinned at the first arrival
//! and only the slope (seconds per sample) is estimated.

use log::warn;

use crate::protocol::EEG_SAMPLES_PER_READING;
use crate::types::GapOutcome;

/// Regression state for one connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockModel {
    /// Host time of sample index 0, in seconds. `None` until anchored.
    pub epoch_offset: Option<f64>,
    /// Estimated seconds per sample.
    pub slope: f64,
    /// Scalar error covariance of the slope estimate.
    pub covariance: f64,
    /// Index of the next sample to be stamped.
    pub sample_index: u64,
}

impl ClockModel {
    pub fn new(sample_rate: f64, initial_covariance: f64) -> Self {
        Self {
            epoch_offset: None,
            slope: 1.0 / sample_rate,
            covariance: initial_covariance,
            sample_index: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClockReconciler {
    model: ClockModel,
    initial: ClockModel,
}

impl ClockReconciler {
    pub fn new(sample_rate: f64, initial_covariance: f64) -> Self {
        let model = ClockModel::new(sample_rate, initial_covariance);
        Self {
            model,
            initial: model,
        }
    }

    pub fn model(&self) -> &ClockModel {
        &self.model
    }

    pub fn slope(&self) -> f64 {
        self.model.slope
    }

    /// Pin the epoch to `host_time` unless it is already pinned.
    pub fn anchor(&mut self, host_time: f64) {
        self.model.epoch_offset.get_or_insert(host_time);
    }

    /// Assign host timestamps to the next 12 samples.
    ///
    /// `earliest_arrival` is the first host arrival among the block's
    /// notifications. A [`GapOutcome::Lost`] pushes the sample index forward
    /// before this block is numbered.
    pub fn reconcile(
        &mut self,
        earliest_arrival: f64,
        gap: GapOutcome,
    ) -> [f64; EEG_SAMPLES_PER_READING] {
        if let GapOutcome::Lost(missing) = gap {
            self.model.sample_index += missing;
        }
        let first = self.model.sample_index;
        self.model.sample_index += EEG_SAMPLES_PER_READING as u64;

        let epoch = *self.model.epoch_offset.get_or_insert(earliest_arrival);
        let t_source = (first + EEG_SAMPLES_PER_READING as u64 - 1) as f64;
        self.update(t_source, earliest_arrival - epoch);

        let slope = self.model.slope;
        std::array::from_fn(|i| slope * (first + i as u64) as f64 + epoch)
    }

    /// One RLS step with `t_source` in samples and `t_receiver` in seconds
    /// since the epoch.
    ///
    /// ```text
    /// P' = P − P²·t² / (1 − P·t²)
    /// R' = R + P'·t·(t_receiver − t·R)
    /// ```
    ///
    /// A step that would leave the estimate non-finite or non-positive is
    /// skipped.
    pub fn update(&mut self, t_source: f64, t_receiver: f64) {
        let p = self.model.covariance;
        let r = self.model.slope;
        let t2 = t_source * t_source;

        let p_next = p - (p * p * t2) / (1.0 - p * t2);
        let r_next = r + p_next * t_source * (t_receiver - t_source * r);

        if !(p_next.is_finite() && p_next > 0.0 && r_next.is_finite() && r_next > 0.0) {
            warn!(
                "clock regression diverged at t_source={t_source} (P={p_next}, R={r_next}); keeping previous estimate"
            );
            return;
        }
        self.model.covariance = p_next;
        self.model.slope = r_next;
    }

    /// Forget everything learned, including the epoch.
    pub fn reset(&mut self) {
        self.model = self.initial;
    }
}
