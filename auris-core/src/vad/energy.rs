//! Energy-based frame analysis.
//!
//! Energy here is the L1 norm: the sum of absolute sample magnitudes over
//! the frame. It is cheaper than RMS, monotonic in loudness, and relative
//! comparison against a threshold is all the gate needs. A frame is speech
//! iff its energy is strictly above the threshold; equality is non-speech.

use super::FrameVerdict;

/// Sum of absolute sample magnitudes over a frame.
///
/// Empty and all-zero frames yield 0.0. Accumulation is in f64 so a full
/// frame of i16::MIN cannot overflow or lose precision.
pub fn frame_energy(samples: &[i16]) -> f64 {
    samples.iter().map(|s| f64::from(*s).abs()).sum()
}

/// Classify a frame against the given energy threshold.
///
/// Pure function of frame + threshold; all mutable VAD state lives in
/// [`AdaptiveThreshold`](super::threshold::AdaptiveThreshold).
pub fn classify(samples: &[i16], threshold: f64) -> FrameVerdict {
    let energy = frame_energy(samples);
    FrameVerdict {
        is_speech: energy > threshold,
        energy,
    }
}
