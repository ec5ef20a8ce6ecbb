//! Adaptive energy threshold.
//!
//! A static gate fails the moment ambient noise drifts (AC switching on,
//! traffic outside). The tracker floats with the environment instead:
//!
//! - `calibrate` does a bulk statistical init from a few seconds of ambient
//!   audio: per-frame energies, take a high percentile, add a 1.5× margin so
//!   ordinary noise variance does not false-trigger.
//! - `adapt` is a slow exponential drift toward the current noise floor,
//!   called only on frames believed to be non-speech (pre-trigger silence).
//!   The smoothing constant keeps a single loud spike from dragging the
//!   threshold; the negligible-energy floor keeps true silence from
//!   collapsing it.
//!
//! Every update is re-clamped to the configured bounds.

use parking_lot::Mutex;
use tracing::{debug, info};

use super::energy::frame_energy;

/// Lower clamp for the energy threshold.
pub const MIN_THRESHOLD: f64 = 300.0;
/// Upper clamp for the energy threshold.
pub const MAX_THRESHOLD: f64 = 3000.0;
/// Threshold used when `calibrate` was never called.
pub const DEFAULT_THRESHOLD: f64 = 500.0;
/// Margin applied above the measured noise level.
const NOISE_MARGIN: f64 = 1.5;
/// Frames below this energy are true silence; adapting on them would
/// collapse the threshold to the MIN clamp.
const ADAPT_ENERGY_FLOOR: f64 = 10.0;

/// Shared, clamped energy threshold for one VAD session chain.
///
/// The at-most-one-active-session invariant means there are never concurrent
/// writers in a correct caller; the interior mutex makes sharing the tracker
/// across components safe anyway.
#[derive(Debug)]
pub struct AdaptiveThreshold {
    value: Mutex<f64>,
    min: f64,
    max: f64,
}

impl Default for AdaptiveThreshold {
    fn default() -> Self {
        Self::new(MIN_THRESHOLD, MAX_THRESHOLD)
    }
}

impl AdaptiveThreshold {
    /// Create a tracker with custom clamp bounds, starting at the
    /// conservative default (clamped into the bounds).
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            value: Mutex::new(DEFAULT_THRESHOLD.clamp(min, max)),
            min,
            max,
        }
    }

    /// Current threshold snapshot.
    pub fn value(&self) -> f64 {
        *self.value.lock()
    }

    /// Bulk statistical init from ambient audio.
    ///
    /// Splits `ambient` into frames of `frame_size` samples, computes the
    /// `percentile` of per-frame energies and sets the threshold to
    /// `max(min_bound, percentile_energy * 1.5)`, clamped. Idempotent for
    /// identical input. A capture shorter than one frame leaves the
    /// threshold unchanged.
    pub fn calibrate(&self, ambient: &[i16], frame_size: usize, percentile: f64) {
        if frame_size == 0 || ambient.len() < frame_size {
            debug!(
                samples = ambient.len(),
                frame_size, "ambient capture too short to calibrate, keeping current threshold"
            );
            return;
        }

        let energies: Vec<f64> = ambient
            .chunks_exact(frame_size)
            .map(frame_energy)
            .collect();

        let noise_level = percentile_of(&energies, percentile);
        let new_value = (noise_level * NOISE_MARGIN).max(self.min).min(self.max);
        *self.value.lock() = new_value;

        info!(
            threshold = format_args!("{new_value:.0}"),
            noise_level = format_args!("{noise_level:.0}"),
            frames = energies.len(),
            "calibrated energy threshold from ambient noise"
        );
    }

    /// Slow drift toward the current noise floor.
    ///
    /// Call only on frames believed to be non-speech. `rate` is the
    /// smoothing constant in (0, 1]; 0.05 means 5 % of the gap per frame.
    pub fn adapt(&self, frame_energy: f64, rate: f64) {
        if frame_energy <= ADAPT_ENERGY_FLOOR {
            return;
        }
        let target = frame_energy * NOISE_MARGIN;
        let mut value = self.value.lock();
        *value = (*value * (1.0 - rate) + target * rate).clamp(self.min, self.max);
    }
}

/// Percentile with linear interpolation between closest ranks.
fn percentile_of(values: &[f64], percentile: f64) -> f64 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let p = percentile.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let weight = rank - lo as f64;
        sorted[lo] * (1.0 - weight) + sorted[hi] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FRAME: usize = 1600;

    fn ambient(amplitude: i16, frames: usize) -> Vec<i16> {
        vec![amplitude; FRAME * frames]
    }

    #[test]
    fn starts_at_conservative_default() {
        let tracker = AdaptiveThreshold::default();
        assert_relative_eq!(tracker.value(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn calibrate_sets_percentile_times_margin() {
        let tracker = AdaptiveThreshold::default();
        // Constant amplitude 1 → every frame energy = 1600.
        tracker.calibrate(&ambient(1, 10), FRAME, 95.0);
        assert_relative_eq!(tracker.value(), 1600.0 * 1.5);
    }

    #[test]
    fn calibrate_is_idempotent() {
        let tracker = AdaptiveThreshold::default();
        let samples = ambient(1, 10);
        tracker.calibrate(&samples, FRAME, 95.0);
        let first = tracker.value();
        tracker.calibrate(&samples, FRAME, 95.0);
        assert_relative_eq!(tracker.value(), first);
    }

    #[test]
    fn calibrate_clamps_to_min_for_true_silence() {
        let tracker = AdaptiveThreshold::default();
        tracker.calibrate(&ambient(0, 10), FRAME, 95.0);
        assert_relative_eq!(tracker.value(), MIN_THRESHOLD);
    }

    #[test]
    fn calibrate_clamps_to_max_for_loud_rooms() {
        let tracker = AdaptiveThreshold::default();
        tracker.calibrate(&ambient(10_000, 10), FRAME, 95.0);
        assert_relative_eq!(tracker.value(), MAX_THRESHOLD);
    }

    #[test]
    fn short_capture_keeps_current_threshold() {
        let tracker = AdaptiveThreshold::default();
        tracker.calibrate(&[5i16; 10], FRAME, 95.0);
        assert_relative_eq!(tracker.value(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn adapt_drifts_toward_noise_floor() {
        let tracker = AdaptiveThreshold::default();
        let before = tracker.value();
        // Noise energy of 1000 targets 1500: threshold should rise.
        tracker.adapt(1000.0, 0.05);
        let after = tracker.value();
        assert!(after > before);
        assert_relative_eq!(after, before * 0.95 + 1500.0 * 0.05);
    }

    #[test]
    fn adapt_never_leaves_clamp_bounds() {
        let tracker = AdaptiveThreshold::default();
        for _ in 0..10_000 {
            tracker.adapt(1e12, 0.5);
        }
        assert_relative_eq!(tracker.value(), MAX_THRESHOLD);

        for _ in 0..10_000 {
            tracker.adapt(ADAPT_ENERGY_FLOOR + 1.0, 0.5);
        }
        assert!(tracker.value() >= MIN_THRESHOLD);
    }

    #[test]
    fn adapt_skips_negligible_energy() {
        let tracker = AdaptiveThreshold::default();
        let before = tracker.value();
        tracker.adapt(0.0, 0.5);
        tracker.adapt(10.0, 0.5);
        assert_relative_eq!(tracker.value(), before);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = vec![0.0, 10.0, 20.0, 30.0, 40.0];
        assert_relative_eq!(percentile_of(&values, 0.0), 0.0);
        assert_relative_eq!(percentile_of(&values, 50.0), 20.0);
        assert_relative_eq!(percentile_of(&values, 100.0), 40.0);
        assert_relative_eq!(percentile_of(&values, 95.0), 38.0);
    }
}
