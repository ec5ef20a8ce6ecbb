//! Typed audio frame: one fixed-duration chunk of the capture stream.

/// A contiguous block of mono 16-bit PCM samples at a known sample rate.
///
/// Frames are immutable once captured; ownership moves from the input
/// stream into the capture state machine on read.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono signed 16-bit samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz (16000 in the reference configuration).
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this frame in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
