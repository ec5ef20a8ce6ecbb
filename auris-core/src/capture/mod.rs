//! Utterance capture state machine.
//!
//! ## States
//!
//! ```text
//! Idle ──first frame──► Buffering ──speech frame──► Speaking ──silence run──► Ended
//!   │                      │                           │
//!   └──────────────────────┴────────frame budget───────┴──────────────────► Ended
//! ```
//!
//! Idle/Buffering fill a bounded pre-speech ring (oldest frame evicted) and
//! drift the threshold toward the ambient noise floor. The instant a frame
//! classifies as speech, the ring is drained (moved, in order) into the
//! utterance, followed by the triggering frame. Speaking appends every frame
//! and counts the silence run; a long enough run ends the utterance. The
//! frame budget is an absolute ceiling that forces `Ended` from any state,
//! so a session always terminates even under continuous loud noise.
//!
//! One isolated speech frame is enough to trigger; there is no debounce. A
//! false trigger yields near-empty audio that downstream transcription
//! treats as a no-op.
//!
//! The machine is a pure per-tick reducer over one input stream; it cannot
//! fail. Threshold adaptation runs only pre-trigger, never while Speaking,
//! so the gate does not chase the speaker's own voice.

use std::sync::Arc;

use tracing::debug;

use crate::buffering::{frame::AudioFrame, ring::PreSpeechRing};
use crate::vad::{energy, AdaptiveThreshold, FrameVerdict};

/// Where the state machine is in the life of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No frame seen yet.
    Idle,
    /// Filling the pre-speech ring, waiting for the first speech frame.
    Buffering,
    /// Accumulating the utterance, tracking the trailing silence run.
    Speaking,
    /// Terminal for this session.
    Ended,
}

/// Why the machine reached [`CaptureState::Ended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// `max_silence_frames` consecutive non-speech frames while Speaking.
    Silence,
    /// The overall session frame budget was exhausted.
    Budget,
}

/// Per-tick transition result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Still waiting for the first speech frame.
    Buffering,
    /// This frame triggered the Buffering → Speaking transition.
    SpeechStarted,
    /// Mid-utterance.
    Speaking,
    /// Terminal; further frames are ignored.
    Ended(EndReason),
}

/// What one pushed frame did to the machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub verdict: FrameVerdict,
    pub progress: Progress,
}

/// Tuning knobs for one capture session, all in frame counts.
#[derive(Debug, Clone, Copy)]
pub struct CaptureParams {
    /// Pre-speech ring capacity (`pre_speech_buffer / chunk_duration`).
    pub pre_speech_frames: usize,
    /// Consecutive non-speech frames that end an utterance
    /// (`silence_duration / chunk_duration`).
    pub max_silence_frames: usize,
    /// Hard session ceiling (`max_duration / chunk_duration`).
    pub budget_frames: usize,
    /// Threshold smoothing constant for pre-trigger adaptation.
    pub adaptation_rate: f64,
}

/// The capture state machine. Created fresh per recording session.
pub struct UtteranceCapture {
    params: CaptureParams,
    threshold: Arc<AdaptiveThreshold>,
    state: CaptureState,
    end_reason: Option<EndReason>,
    ring: PreSpeechRing,
    utterance: Vec<AudioFrame>,
    silence_run: usize,
    ticks: usize,
}

impl UtteranceCapture {
    pub fn new(params: CaptureParams, threshold: Arc<AdaptiveThreshold>) -> Self {
        let ring = PreSpeechRing::new(params.pre_speech_frames);
        Self {
            params,
            threshold,
            state: CaptureState::Idle,
            end_reason: None,
            ring,
            utterance: Vec::new(),
            silence_run: 0,
            ticks: 0,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// Feed one frame. Frames are consumed in strict arrival order; calling
    /// after `Ended` is a no-op reporting the terminal state.
    pub fn push(&mut self, frame: AudioFrame) -> TickReport {
        if self.state == CaptureState::Ended {
            let reason = self.end_reason.unwrap_or(EndReason::Budget);
            return TickReport {
                verdict: FrameVerdict {
                    is_speech: false,
                    energy: 0.0,
                },
                progress: Progress::Ended(reason),
            };
        }

        self.ticks += 1;
        let verdict = energy::classify(&frame.samples, self.threshold.value());

        let progress = match self.state {
            CaptureState::Idle | CaptureState::Buffering => {
                if verdict.is_speech {
                    // Speech onset: lead-in first, trigger frame right after.
                    self.utterance = self.ring.drain();
                    self.utterance.push(frame);
                    self.state = CaptureState::Speaking;
                    self.silence_run = 0;
                    debug!(
                        tick = self.ticks,
                        lead_in_frames = self.utterance.len() - 1,
                        energy = format_args!("{:.0}", verdict.energy),
                        "speech onset"
                    );
                    Progress::SpeechStarted
                } else {
                    self.threshold
                        .adapt(verdict.energy, self.params.adaptation_rate);
                    self.ring.push(frame);
                    self.state = CaptureState::Buffering;
                    Progress::Buffering
                }
            }
            CaptureState::Speaking => {
                self.utterance.push(frame);
                if verdict.is_speech {
                    self.silence_run = 0;
                    Progress::Speaking
                } else {
                    self.silence_run += 1;
                    if self.silence_run >= self.params.max_silence_frames {
                        self.end(EndReason::Silence)
                    } else {
                        Progress::Speaking
                    }
                }
            }
            CaptureState::Ended => unreachable!("handled above"),
        };

        // The budget is an absolute ceiling independent of VAD state. The
        // frame at the boundary is still processed, so a budget-truncated
        // utterance keeps its final frame.
        if self.state != CaptureState::Ended && self.ticks >= self.params.budget_frames {
            return TickReport {
                verdict,
                progress: self.end(EndReason::Budget),
            };
        }

        TickReport { verdict, progress }
    }

    fn end(&mut self, reason: EndReason) -> Progress {
        self.state = CaptureState::Ended;
        self.end_reason = Some(reason);
        debug!(
            tick = self.ticks,
            frames = self.utterance.len(),
            ?reason,
            "capture ended"
        );
        Progress::Ended(reason)
    }

    /// Consume the machine. `None` means no speech was ever detected:
    /// the absence of an utterance, distinct from an empty one.
    pub fn finish(self) -> Option<Vec<AudioFrame>> {
        if self.utterance.is_empty() {
            None
        } else {
            Some(self.utterance)
        }
    }
}
