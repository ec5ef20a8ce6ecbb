//! End-to-end capture flow through the public API: scripted audio sources
//! driving calibration, VAD-gated sessions, and artifact serialization.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;

use auris_core::audio::{AudioSource, ChunkRead, ReadOutcome};
use auris_core::error::Result;
use auris_core::events::EventBus;
use auris_core::session::{self, SessionOutcome, SessionParams};
use auris_core::{AdaptiveThreshold, SessionEndReason, SessionEventKind};
use tokio::sync::broadcast::error::TryRecvError;

const CHUNK: usize = 1600; // 100 ms at 16 kHz

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

struct ScriptedSource {
    outcomes: VecDeque<ReadOutcome>,
}

impl ScriptedSource {
    /// Build from (amplitude, frame count) runs.
    fn from_runs(runs: &[(i16, usize)]) -> Self {
        let mut outcomes = VecDeque::new();
        for &(amplitude, count) in runs {
            for _ in 0..count {
                outcomes.push_back(ReadOutcome::Chunk(ChunkRead {
                    samples: vec![amplitude; CHUNK],
                    overflowed: false,
                }));
            }
        }
        Self { outcomes }
    }
}

impl AudioSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn read_chunk(&mut self, chunk_samples: usize) -> Result<ReadOutcome> {
        Ok(self.outcomes.pop_front().unwrap_or_else(|| {
            ReadOutcome::Chunk(ChunkRead {
                samples: vec![0; chunk_samples],
                overflowed: false,
            })
        }))
    }
}

fn drain_kinds(
    rx: &mut tokio::sync::broadcast::Receiver<auris_core::SessionEvent>,
) -> Vec<SessionEventKind> {
    let mut kinds = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => kinds.push(ev.kind),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return kinds,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

#[test]
fn calibrated_threshold_gates_the_following_session() {
    init_tracing();
    let threshold = Arc::new(AdaptiveThreshold::default());
    let params = SessionParams::default();
    let events = EventBus::new(64);

    // Noisy room: ambient amplitude 1 per sample → frame energy 1600,
    // calibrated threshold 2400.
    let mut ambient = ScriptedSource::from_runs(&[(1, 15)]);
    let calibrated = session::calibrate_ambient(&mut ambient, &threshold, &params, 1.5)
        .expect("calibration succeeds");
    assert!(calibrated);
    assert!((threshold.value() - 2400.0).abs() < 1e-9);

    // Amplitude 1 frames (energy 1600) are now under the gate; amplitude 5
    // frames (energy 8000) are speech.
    let mut source = ScriptedSource::from_runs(&[(1, 4), (5, 6), (1, 8)]);
    let outcome = session::record_utterance(&mut source, &threshold, &params, 5.0, &events)
        .expect("no device error");

    match outcome {
        SessionOutcome::Captured(audio) => {
            // 4 lead-in frames fit the 5-frame pre-speech ring entirely.
            assert_eq!(audio.samples.len(), (4 + 6 + 8) * CHUNK);
        }
        other => panic!("expected a captured utterance, got {other:?}"),
    }
}

#[test]
fn utterance_survives_wav_round_trip_with_exact_sample_order() {
    init_tracing();
    let threshold = Arc::new(AdaptiveThreshold::default());
    let params = SessionParams::default();
    let events = EventBus::new(64);

    let mut source = ScriptedSource::from_runs(&[(0, 2), (700, 5), (0, 8)]);
    let outcome = session::record_utterance(&mut source, &threshold, &params, 5.0, &events)
        .expect("no device error");
    let audio = match outcome {
        SessionOutcome::Captured(audio) => audio,
        other => panic!("expected a captured utterance, got {other:?}"),
    };

    let bytes = audio.wav_bytes().expect("serialize wav");
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).expect("readable wav");
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.spec().bits_per_sample, 16);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), audio.samples.len());
    assert_eq!(samples, audio.samples);
    // Temporal order: lead-in silence, then the speech run.
    assert_eq!(samples[0], 0);
    assert_eq!(samples[2 * CHUNK], 700);
}

#[test]
fn silent_session_emits_started_then_no_speech() {
    init_tracing();
    let threshold = Arc::new(AdaptiveThreshold::default());
    let params = SessionParams::default();
    let events = EventBus::new(256);
    let mut session_rx = events.subscribe_sessions();
    let mut activity_rx = events.subscribe_activity();

    let mut source = ScriptedSource::from_runs(&[(0, 50)]);
    let outcome = session::record_utterance(&mut source, &threshold, &params, 5.0, &events)
        .expect("silence is not an error");
    assert!(matches!(outcome, SessionOutcome::NoSpeech));

    assert_eq!(
        drain_kinds(&mut session_rx),
        vec![
            SessionEventKind::SessionStarted,
            SessionEventKind::SessionEnded {
                reason: SessionEndReason::NoSpeech,
            },
        ]
    );

    // One activity event per processed frame, none classified as speech.
    let mut frames = 0;
    while let Ok(ev) = activity_rx.try_recv() {
        assert!(!ev.is_speech);
        frames += 1;
    }
    assert_eq!(frames, 50);
}

#[test]
fn back_to_back_sessions_reuse_the_drifted_threshold() {
    init_tracing();
    let threshold = Arc::new(AdaptiveThreshold::default());
    let params = SessionParams::default();
    let events = EventBus::new(64);

    // First session: idle non-speech noise drifts the threshold upward.
    // Amplitude such that frame energy (499) stays under the 500 default.
    let mut quiet = vec![0i16; CHUNK];
    for s in quiet.iter_mut().take(499) {
        *s = 1;
    }
    let mut outcomes = VecDeque::new();
    for _ in 0..50 {
        outcomes.push_back(ReadOutcome::Chunk(ChunkRead {
            samples: quiet.clone(),
            overflowed: false,
        }));
    }
    let mut first = ScriptedSource { outcomes };
    let before = threshold.value();
    let outcome = session::record_utterance(&mut first, &threshold, &params, 5.0, &events)
        .expect("no device error");
    assert!(matches!(outcome, SessionOutcome::NoSpeech));
    let drifted = threshold.value();
    assert!(
        drifted > before,
        "50 audible non-speech frames should drift the gate upward"
    );

    // Second session sees the drifted threshold, not a fresh default.
    let mut second = ScriptedSource::from_runs(&[(1000, 3), (0, 8)]);
    let outcome = session::record_utterance(&mut second, &threshold, &params, 5.0, &events)
        .expect("no device error");
    assert!(matches!(outcome, SessionOutcome::Captured(_)));
    assert!(threshold.value() >= drifted * 0.99);
}
