//! # auris-core
//!
//! Wake-word-gated utterance capture engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → CpalSource (SPSC ring + rate adapter) → 100 ms i16 frames
//!                                   │
//!                       energy classify + adaptive threshold
//!                                   │
//!                      UtteranceCapture (pre-speech ring,
//!                       silence end-detection, frame budget)
//!                                   │
//!                    UtteranceAudio → WAV artifact (hound)
//!                                   │
//!                  broadcast: status / activity / session events
//! ```
//!
//! The audio callback is zero-alloc after warm-up; chunking, rate
//! conversion and all heap work happen on the session thread. The outer
//! [`Listener`] waits on an external wake signal and runs at most one
//! capture session at a time. Downstream concerns such as transcription and
//! intent handling subscribe to the event bus and consume the WAV artifact.
//!
//! [`Listener`]: listener::Listener

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod error;
pub mod events;
pub mod listener;
pub mod session;
pub mod vad;

// Convenience re-exports for downstream crates
pub use capture::{CaptureParams, CaptureState, EndReason, Progress, UtteranceCapture};
pub use error::ListenError;
pub use events::{
    ActivityEvent, EventBus, ListenerStatus, ListenerStatusEvent, SessionEndReason, SessionEvent,
    SessionEventKind,
};
pub use listener::{Listener, ListenerConfig, WakeSignal};
pub use session::{SessionOutcome, SessionParams, UtteranceAudio};
pub use vad::{AdaptiveThreshold, FrameVerdict};
