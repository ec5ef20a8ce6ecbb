//! Voice Activity Detection: the per-frame energy analyzer plus the
//! adaptive threshold it gates against.
//!
//! [`energy::classify`] is a pure function; all mutable state (the drifting
//! noise-floor threshold) lives in [`threshold::AdaptiveThreshold`], so the
//! capture state machine stays a deterministic per-tick reducer.

pub mod energy;
pub mod threshold;

pub use threshold::AdaptiveThreshold;

/// Result of classifying one audio frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameVerdict {
    /// True when the frame's energy is strictly above the threshold.
    pub is_speech: bool,
    /// L1 energy of the frame (sum of absolute sample magnitudes).
    pub energy: f64,
}
