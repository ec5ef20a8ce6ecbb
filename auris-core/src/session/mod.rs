//! Recording session driver.
//!
//! Owns one pass over the audio input: open is the caller's job (the source
//! is injected), the driver reads one 100 ms chunk per tick, feeds the
//! capture state machine, and on `Ended` concatenates the utterance. The
//! source is released on every path because the caller scopes it; nothing
//! here holds a device handle past the return.
//!
//! Three entry points:
//! - [`record_utterance`]: the VAD-gated mode (the normal path),
//! - [`record_fixed`]: exact-duration fallback with no state machine,
//! - [`calibrate_ambient`]: bulk noise measurement feeding the threshold.

pub mod artifact;

use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::audio::{AudioSource, ReadOutcome};
use crate::buffering::frame::AudioFrame;
use crate::capture::{CaptureParams, Progress, UtteranceCapture};
use crate::error::{ListenError, Result};
use crate::events::{EventBus, SessionEndReason, SessionEventKind};
use crate::vad::AdaptiveThreshold;

pub use artifact::UtteranceAudio;

/// Timing surface of the capture core. `max_duration` is deliberately not
/// here; it is caller-specified per call.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Chunk (frame) duration in seconds; one state-machine tick each.
    pub chunk_duration: f64,
    /// Pre-speech lead-in retained before the trigger frame, in seconds.
    pub pre_speech_buffer: f64,
    /// Continuous non-speech that ends an utterance, in seconds.
    pub silence_duration: f64,
    /// Threshold smoothing constant for pre-trigger adaptation.
    pub adaptation_rate: f64,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_duration: 0.1,
            pre_speech_buffer: 0.5,
            silence_duration: 0.8,
            adaptation_rate: 0.05,
        }
    }
}

impl SessionParams {
    /// Samples per chunk.
    pub fn chunk_samples(&self) -> usize {
        (self.sample_rate as f64 * self.chunk_duration) as usize
    }

    /// Whole frames covering `secs` (rounded, so 0.8 s / 0.1 s is 8 even
    /// with binary-float division error).
    pub fn frames_for(&self, secs: f64) -> usize {
        (secs / self.chunk_duration).round() as usize
    }

    fn capture_params(&self, max_duration: f64) -> CaptureParams {
        CaptureParams {
            pre_speech_frames: self.frames_for(self.pre_speech_buffer),
            max_silence_frames: self.frames_for(self.silence_duration),
            budget_frames: self.frames_for(max_duration),
            adaptation_rate: self.adaptation_rate,
        }
    }
}

/// How a session finished. Silence-on-timeout and cancellation are ordinary
/// outcomes, never conflated with device errors.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// An utterance was captured.
    Captured(UtteranceAudio),
    /// The session budget elapsed without a single speech frame.
    NoSpeech,
    /// The caller aborted mid-session; partial audio is discarded.
    Cancelled,
}

/// Capture one utterance with VAD end-detection.
///
/// Runs at most `max_duration` seconds regardless of VAD state. Emits
/// `SessionStarted`, per-frame activity, `SpeechDetected` on onset, and a
/// terminal `SessionEnded` when no artifact results (the caller emits
/// `UtteranceCaptured` once it has serialized the audio).
///
/// # Errors
/// Read failures from the source are surfaced unchanged; nothing is
/// swallowed or retried here.
pub fn record_utterance(
    source: &mut dyn AudioSource,
    threshold: &Arc<AdaptiveThreshold>,
    params: &SessionParams,
    max_duration: f64,
    events: &EventBus,
) -> Result<SessionOutcome> {
    let chunk_samples = params.chunk_samples();
    let capture_params = params.capture_params(max_duration);
    let mut capture = UtteranceCapture::new(capture_params, Arc::clone(threshold));

    let span = info_span!("capture_session");
    let _guard = span.enter();

    events.emit_session(SessionEventKind::SessionStarted);
    info!(
        max_duration,
        budget_frames = capture_params.budget_frames,
        threshold = format_args!("{:.0}", threshold.value()),
        "listening for speech"
    );

    loop {
        let chunk = match source.read_chunk(chunk_samples)? {
            ReadOutcome::Chunk(chunk) => chunk,
            ReadOutcome::Cancelled => {
                debug!("session cancelled, discarding partial utterance");
                events.emit_session(SessionEventKind::SessionEnded {
                    reason: SessionEndReason::Cancelled,
                });
                return Ok(SessionOutcome::Cancelled);
            }
        };

        if chunk.overflowed {
            warn!("audio overflow detected, device frames were dropped");
        }

        let frame = AudioFrame::new(chunk.samples, source.sample_rate());
        let report = capture.push(frame);

        events.emit_activity(
            report.verdict.energy,
            threshold.value(),
            report.verdict.is_speech,
        );

        match report.progress {
            Progress::SpeechStarted => {
                info!(tick = capture.ticks(), "speech detected");
                events.emit_session(SessionEventKind::SpeechDetected);
            }
            Progress::Ended(reason) => {
                debug!(tick = capture.ticks(), ?reason, "capture ended");
                break;
            }
            Progress::Buffering | Progress::Speaking => {}
        }
    }

    match capture.finish() {
        Some(frames) => {
            let audio = UtteranceAudio::from_frames(frames, params.sample_rate);
            info!(
                duration_secs = format_args!("{:.1}", audio.duration_secs()),
                "recorded utterance"
            );
            Ok(SessionOutcome::Captured(audio))
        }
        None => {
            info!("no speech detected");
            events.emit_session(SessionEventKind::SessionEnded {
                reason: SessionEndReason::NoSpeech,
            });
            Ok(SessionOutcome::NoSpeech)
        }
    }
}

/// Record for exactly `duration` seconds with no early termination and no
/// state machine. The fallback path for deployments where VAD is
/// undesirable.
pub fn record_fixed(
    source: &mut dyn AudioSource,
    params: &SessionParams,
    duration: f64,
) -> Result<SessionOutcome> {
    let chunk_samples = params.chunk_samples();
    let total_frames = params.frames_for(duration);
    let mut frames = Vec::with_capacity(total_frames);

    info!(duration, "recording fixed duration");
    for _ in 0..total_frames {
        match source.read_chunk(chunk_samples)? {
            ReadOutcome::Chunk(chunk) => {
                if chunk.overflowed {
                    warn!("audio overflow detected, device frames were dropped");
                }
                frames.push(AudioFrame::new(chunk.samples, source.sample_rate()));
            }
            ReadOutcome::Cancelled => return Ok(SessionOutcome::Cancelled),
        }
    }

    Ok(SessionOutcome::Captured(UtteranceAudio::from_frames(
        frames,
        params.sample_rate,
    )))
}

/// Measure ambient noise for `duration` seconds and calibrate the threshold.
///
/// Returns `false` when cancelled before the measurement completed; the
/// tracker then keeps its previous (or built-in default) threshold. Device
/// failures surface as [`ListenError::Calibration`].
pub fn calibrate_ambient(
    source: &mut dyn AudioSource,
    threshold: &AdaptiveThreshold,
    params: &SessionParams,
    duration: f64,
) -> Result<bool> {
    let chunk_samples = params.chunk_samples();
    let total_frames = params.frames_for(duration);
    let mut ambient = Vec::with_capacity(total_frames * chunk_samples);

    info!(duration, "calibrating from ambient noise, stay quiet");
    for _ in 0..total_frames {
        match source
            .read_chunk(chunk_samples)
            .map_err(|e| ListenError::Calibration(e.to_string()))?
        {
            ReadOutcome::Chunk(chunk) => ambient.extend(chunk.samples),
            ReadOutcome::Cancelled => {
                debug!("calibration cancelled, keeping current threshold");
                return Ok(false);
            }
        }
    }

    threshold.calibrate(&ambient, chunk_samples, 95.0);
    Ok(true)
}
