//! Captured utterance audio and its WAV serialization.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::buffering::frame::AudioFrame;
use crate::error::Result;

/// One captured utterance: pre-speech lead-in through trailing silence,
/// concatenated. Owned exclusively by the session driver once the state
/// machine has ended.
#[derive(Debug, Clone)]
pub struct UtteranceAudio {
    /// Mono 16-bit samples in temporal order.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl UtteranceAudio {
    /// Concatenate captured frames in order.
    pub fn from_frames(frames: Vec<AudioFrame>, sample_rate: u32) -> Self {
        let total: usize = frames.iter().map(|f| f.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for frame in frames {
            samples.extend(frame.samples);
        }
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    fn wav_spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Write a mono 16-bit PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let mut writer = WavWriter::create(path, self.wav_spec())?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Serialize to an in-memory WAV buffer for callers that take bytes
    /// rather than a path.
    pub fn wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, self.wav_spec())?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}
