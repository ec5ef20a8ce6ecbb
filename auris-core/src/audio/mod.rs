//! Audio input via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** allocate after warm-up, block on a lock, or perform I/O.
//! The callback therefore only mixes down to mono and writes into a
//! lock-free SPSC ring; chunking, rate conversion and i16 quantisation all
//! happen on the session thread in [`CpalSource::read_chunk`].
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). A [`CpalSource`] must be created, used and dropped on the same
//! OS thread; the wake loop does all three inside `spawn_blocking`.

pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crate::buffering::{Consumer, SampleConsumer};
use crate::error::Result;
use resample::RateAdapter;

#[cfg(feature = "audio-cpal")]
use crate::buffering::{create_sample_ring, Producer, SampleProducer};
#[cfg(feature = "audio-cpal")]
use crate::error::ListenError;
#[cfg(feature = "audio-cpal")]
use tracing::{info, warn};

/// Sleep between ring polls while waiting for a chunk to fill.
const POLL_SLEEP: Duration = Duration::from_millis(5);

/// One chunk of capture-rate samples plus the device overflow flag.
#[derive(Debug, Clone)]
pub struct ChunkRead {
    /// Exactly the requested number of mono i16 samples.
    pub samples: Vec<i16>,
    /// True when the ring overflowed since the previous read (frames were
    /// dropped at the device boundary).
    pub overflowed: bool,
}

/// Result of one blocking chunk read.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Chunk(ChunkRead),
    /// The cancel flag was raised while waiting for samples.
    Cancelled,
}

/// A blocking source of fixed-size capture-rate chunks.
///
/// The session driver is written against this trait; tests script it,
/// production uses [`CpalSource`].
pub trait AudioSource {
    /// Capture sample rate of the chunks this source yields (Hz).
    fn sample_rate(&self) -> u32;

    /// Block until one chunk of exactly `chunk_samples` samples is
    /// available, or the source's cancel flag is raised.
    ///
    /// # Errors
    /// Device/stream failures only; cancellation is an `Ok` outcome.
    fn read_chunk(&mut self, chunk_samples: usize) -> Result<ReadOutcome>;
}

/// Live microphone input: cpal stream → SPSC ring → rate adapter → i16 chunks.
///
/// **Not `Send`**; see the module-level threading note.
pub struct CpalSource {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    consumer: SampleConsumer,
    adapter: RateAdapter,
    /// Converted capture-rate samples awaiting chunk assembly.
    pending: Vec<f32>,
    /// Reusable drain scratch for ring pops.
    scratch: Vec<f32>,
    /// Set by the callback when `push_slice` could not take every sample.
    overflow: Arc<AtomicBool>,
    /// Raised by the caller to interrupt a blocking read.
    cancel: Arc<AtomicBool>,
    capture_rate: u32,
}

impl CpalSource {
    /// Open an input device and start capturing.
    ///
    /// `preferred_device` selects an input by exact name when present;
    /// otherwise the system default input is used, then the first available
    /// device. The device runs at its native rate and format; output chunks
    /// are always mono i16 at `capture_rate`.
    ///
    /// # Errors
    /// `ListenError::NoDefaultInputDevice` when no microphone exists,
    /// `ListenError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        capture_rate: u32,
        cancel: Arc<AtomicBool>,
        preferred_device: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = preferred_device
            .and_then(|name| {
                let found = host
                    .input_devices()
                    .ok()?
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false));
                if found.is_none() {
                    warn!("preferred input device '{name}' not found, falling back");
                }
                found
            })
            .or_else(|| host.default_input_device());

        let device = match device {
            Some(d) => d,
            None => host
                .input_devices()
                .map_err(|e| ListenError::AudioDevice(e.to_string()))?
                .next()
                .ok_or(ListenError::NoDefaultInputDevice)?,
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ListenError::AudioDevice(e.to_string()))?;
        let device_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        info!(device_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(device_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = create_sample_ring();
        let overflow = Arc::new(AtomicBool::new(false));

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(
                &device,
                &config,
                channels,
                producer,
                Arc::clone(&overflow),
                |s| s,
            ),
            cpal::SampleFormat::I16 => build_stream::<i16>(
                &device,
                &config,
                channels,
                producer,
                Arc::clone(&overflow),
                |s| f32::from(s) / 32768.0,
            ),
            cpal::SampleFormat::U8 => build_stream::<u8>(
                &device,
                &config,
                channels,
                producer,
                Arc::clone(&overflow),
                |s| (f32::from(s) - 128.0) / 128.0,
            ),
            fmt => {
                return Err(ListenError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| ListenError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            consumer,
            adapter: RateAdapter::new(device_rate, capture_rate)?,
            pending: Vec::new(),
            scratch: vec![0f32; 4096],
            overflow,
            cancel,
            capture_rate,
        })
    }
}

/// Build one input stream for a concrete sample type, mixing interleaved
/// channels down to mono f32 and pushing into the ring producer.
#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut producer: SampleProducer,
    overflow: Arc<AtomicBool>,
    convert: fn(T) -> f32,
) -> Result<Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    // Grows to one callback's frame count on first use, then stays put.
    let mut mix_buf: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                mix_buf.clear();
                for frame in data.chunks_exact(channels) {
                    let sum: f32 = frame.iter().map(|s| convert(*s)).sum();
                    mix_buf.push(sum / channels as f32);
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    overflow.store(true, Ordering::Relaxed);
                }
            },
            |err| tracing::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| ListenError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl CpalSource {
    pub fn open(
        _capture_rate: u32,
        _cancel: Arc<AtomicBool>,
        _preferred_device: Option<&str>,
    ) -> Result<Self> {
        Err(crate::error::ListenError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.capture_rate
    }

    fn read_chunk(&mut self, chunk_samples: usize) -> Result<ReadOutcome> {
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                return Ok(ReadOutcome::Cancelled);
            }

            // Drain whatever the callback produced since the last poll.
            loop {
                let popped = self.consumer.pop_slice(&mut self.scratch);
                if popped == 0 {
                    break;
                }
                self.adapter.push(&self.scratch[..popped], &mut self.pending);
            }

            if self.pending.len() >= chunk_samples {
                let samples = self
                    .pending
                    .drain(..chunk_samples)
                    .map(quantise_i16)
                    .collect();
                return Ok(ReadOutcome::Chunk(ChunkRead {
                    samples,
                    overflowed: self.overflow.swap(false, Ordering::Relaxed),
                }));
            }

            std::thread::sleep(POLL_SLEEP);
        }
    }
}

fn quantise_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}
