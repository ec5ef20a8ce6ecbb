//! Typed events broadcast by the listener.
//!
//! The capture side emits structured events; any presentation layer
//! (console, HUD, GUI) subscribes and owns formatting. Three channels:
//!
//! | Event | Purpose |
//! |-------|---------|
//! | [`ListenerStatusEvent`] | lifecycle transitions of the wake loop |
//! | [`ActivityEvent`]       | per-frame energy + speech classification |
//! | [`SessionEvent`]        | start/end of individual capture sessions |

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Listener status events
// ---------------------------------------------------------------------------

/// Emitted when the wake loop changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatusEvent {
    pub status: ListenerStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the wake activation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerStatus {
    /// Listener created but `start()` not yet called.
    Idle,
    /// Measuring ambient noise to set the energy threshold.
    Calibrating,
    /// Blocking on the wake signal.
    WaitingForWake,
    /// A capture session is in flight.
    Recording,
    /// Wake loop stopped; the listener may be restarted.
    Stopped,
    /// Unrecoverable device error; restart required.
    Error,
}

// ---------------------------------------------------------------------------
// Activity events
// ---------------------------------------------------------------------------

/// Emitted for each processed frame during an active session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// L1 energy of the frame.
    pub energy: f64,
    /// Energy threshold the frame was gated against.
    pub threshold: f64,
    /// Classification of the frame.
    pub is_speech: bool,
}

// ---------------------------------------------------------------------------
// Session events
// ---------------------------------------------------------------------------

/// Emitted at session boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

/// What happened to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionEventKind {
    /// A wake activation started a capture session.
    SessionStarted,
    /// The first speech frame was seen (pre-speech ring drained).
    SpeechDetected,
    /// The session finished without a captured utterance.
    SessionEnded { reason: SessionEndReason },
    /// An utterance was captured and serialized.
    UtteranceCaptured {
        path: PathBuf,
        duration_secs: f64,
    },
}

/// Why a session ended without an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEndReason {
    /// The session budget elapsed while still waiting for speech.
    NoSpeech,
    /// The caller cancelled the session mid-flight.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Event bus
// ---------------------------------------------------------------------------

/// The listener's broadcast fan-out: one sender per event family, one shared
/// sequence counter. Receivers that fall behind lag rather than block the
/// capture path.
pub struct EventBus {
    status_tx: broadcast::Sender<ListenerStatusEvent>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    session_tx: broadcast::Sender<SessionEvent>,
    seq: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (status_tx, _) = broadcast::channel(capacity);
        let (activity_tx, _) = broadcast::channel(capacity);
        let (session_tx, _) = broadcast::channel(capacity);
        Self {
            status_tx,
            activity_tx,
            session_tx,
            seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<ListenerStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    pub fn subscribe_sessions(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }

    pub fn emit_status(&self, status: ListenerStatus, detail: Option<String>) {
        let _ = self.status_tx.send(ListenerStatusEvent { status, detail });
    }

    pub fn emit_activity(&self, energy: f64, threshold: f64, is_speech: bool) {
        let _ = self.activity_tx.send(ActivityEvent {
            seq: self.next_seq(),
            energy,
            threshold,
            is_speech,
        });
    }

    pub fn emit_session(&self, kind: SessionEventKind) {
        let _ = self.session_tx.send(SessionEvent {
            seq: self.next_seq(),
            kind,
        });
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_event_serializes_with_camel_case_tag() {
        let event = SessionEvent {
            seq: 4,
            kind: SessionEventKind::UtteranceCaptured {
                path: PathBuf::from("/tmp/utterance.wav"),
                duration_secs: 2.1,
            },
        };

        let json = serde_json::to_value(&event).expect("serialize session event");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["kind"], "utteranceCaptured");
        assert_eq!(json["path"], "/tmp/utterance.wav");
        let dur = json["durationSecs"]
            .as_f64()
            .expect("duration should serialize as number");
        assert!((dur - 2.1).abs() < 1e-9);
    }

    #[test]
    fn session_ended_round_trips() {
        let event = SessionEvent {
            seq: 9,
            kind: SessionEventKind::SessionEnded {
                reason: SessionEndReason::NoSpeech,
            },
        };

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["kind"], "sessionEnded");
        assert_eq!(json["reason"], "nospeech");

        let round_trip: SessionEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(round_trip.seq, 9);
        assert_eq!(
            round_trip.kind,
            SessionEventKind::SessionEnded {
                reason: SessionEndReason::NoSpeech,
            }
        );
    }

    #[test]
    fn event_bus_sequences_are_monotonic_across_families() {
        let bus = EventBus::new(8);
        let mut activity_rx = bus.subscribe_activity();
        let mut session_rx = bus.subscribe_sessions();

        bus.emit_activity(10.0, 500.0, false);
        bus.emit_session(SessionEventKind::SessionStarted);
        bus.emit_activity(20.0, 500.0, true);

        assert_eq!(activity_rx.try_recv().unwrap().seq, 0);
        assert_eq!(session_rx.try_recv().unwrap().seq, 1);
        assert_eq!(activity_rx.try_recv().unwrap().seq, 2);
    }

    #[test]
    fn listener_status_serializes_lowercase() {
        let event = ListenerStatusEvent {
            status: ListenerStatus::WaitingForWake,
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "waitingforwake");
    }

    #[test]
    fn activity_event_uses_camel_case_fields() {
        let event = ActivityEvent {
            seq: 12,
            energy: 845.0,
            threshold: 512.5,
            is_speech: true,
        };
        let json = serde_json::to_value(&event).expect("serialize activity event");
        assert_eq!(json["seq"], 12);
        assert_eq!(json["isSpeech"], true);
        let threshold = json["threshold"].as_f64().expect("threshold is a number");
        assert!((threshold - 512.5).abs() < 1e-9);
    }
}
