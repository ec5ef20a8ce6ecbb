//! Device-rate → capture-rate conversion.
//!
//! Microphones rarely expose 16 kHz natively (48 kHz is the common default),
//! while the energy gate and the WAV artifact are specified at a fixed
//! capture rate. `RateAdapter` bridges the two on the session thread using a
//! rubato `FastFixedIn` resampler. When the device already runs at the
//! target rate the adapter is a passthrough and no rubato session exists.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{ListenError, Result};

/// Input block size handed to rubato per process call.
/// 20 ms at 48 kHz; small enough to keep added latency well under one chunk.
const RESAMPLE_BLOCK: usize = 960;

/// Converts f32 mono audio from the device rate to the capture rate.
pub struct RateAdapter {
    /// `None` when device rate == capture rate.
    inner: Option<FastFixedIn<f32>>,
    /// Staging buffer for partial input blocks between calls.
    staging: Vec<f32>,
    /// Pre-allocated rubato output: `[1][output_frames_max]`.
    out_block: Vec<Vec<f32>>,
}

impl RateAdapter {
    /// # Errors
    /// `ListenError::AudioDevice` if rubato refuses the rate pair.
    pub fn new(device_rate: u32, capture_rate: u32) -> Result<Self> {
        if device_rate == capture_rate {
            return Ok(Self {
                inner: None,
                staging: Vec::new(),
                out_block: Vec::new(),
            });
        }

        let inner = FastFixedIn::<f32>::new(
            capture_rate as f64 / device_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            RESAMPLE_BLOCK,
            1,
        )
        .map_err(|e| ListenError::AudioDevice(format!("resampler init: {e}")))?;

        let out_block = vec![vec![0f32; inner.output_frames_max()]];
        tracing::info!(device_rate, capture_rate, "rate conversion enabled");

        Ok(Self {
            inner: Some(inner),
            staging: Vec::new(),
            out_block,
        })
    }

    /// Feed device-rate samples, appending capture-rate samples to `out`.
    ///
    /// Input accumulates in the staging buffer until a full block is
    /// available; a trailing partial block waits for the next call. In
    /// passthrough mode the input is copied straight through.
    pub fn push(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        let Some(ref mut resampler) = self.inner else {
            out.extend_from_slice(samples);
            return;
        };

        self.staging.extend_from_slice(samples);

        let mut consumed = 0;
        while self.staging.len() - consumed >= RESAMPLE_BLOCK {
            let block = &self.staging[consumed..consumed + RESAMPLE_BLOCK];
            match resampler.process_into_buffer(&[block], &mut self.out_block, None) {
                Ok((_used, produced)) => out.extend_from_slice(&self.out_block[0][..produced]),
                Err(e) => tracing::error!("resampler process error: {e}"),
            }
            consumed += RESAMPLE_BLOCK;
        }
        self.staging.drain(..consumed);
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_copies_input_verbatim() {
        let mut adapter = RateAdapter::new(16_000, 16_000).unwrap();
        assert!(adapter.is_passthrough());
        let samples: Vec<f32> = (0..320).map(|i| i as f32 * 1e-3).collect();
        let mut out = Vec::new();
        adapter.push(&samples, &mut out);
        assert_eq!(out, samples);
    }

    #[test]
    fn downsamples_48k_to_16k_at_one_third_length() {
        let mut adapter = RateAdapter::new(48_000, 16_000).unwrap();
        assert!(!adapter.is_passthrough());
        let mut out = Vec::new();
        adapter.push(&vec![0.0f32; RESAMPLE_BLOCK], &mut out);
        let expected = RESAMPLE_BLOCK / 3;
        assert!(
            out.len().abs_diff(expected) <= 10,
            "len={} expected≈{}",
            out.len(),
            expected
        );
    }

    #[test]
    fn partial_block_waits_for_more_input() {
        let mut adapter = RateAdapter::new(48_000, 16_000).unwrap();
        let mut out = Vec::new();
        adapter.push(&vec![0.0f32; RESAMPLE_BLOCK / 2], &mut out);
        assert!(out.is_empty());
        adapter.push(&vec![0.0f32; RESAMPLE_BLOCK / 2], &mut out);
        assert!(!out.is_empty(), "second half completes the block");
    }
}
