//! The wake activation loop and its lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! Listener::new()
//!     └─► start(wake)    → device probed, loop spawned, status = WaitingForWake
//!         ├─ wake fires  → status = Recording, one capture session runs
//!         │                artifact written, UtteranceCaptured broadcast
//!         └─► stop()     → cancel raised, blocking read/wait interrupted,
//!                          loop drains, status = Stopped
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so audio sources are opened,
//! used and dropped entirely inside the `spawn_blocking` closure. A sync
//! mpsc oneshot propagates the initial device probe result back to the
//! `start()` caller. The loop and its sessions are strictly sequential:
//! at most one capture session exists at any time, because a second would
//! contend for the same physical microphone.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::audio::{AudioSource, CpalSource};
use crate::error::{ListenError, Result};
use crate::events::{EventBus, ListenerStatus, SessionEventKind};
use crate::session::{self, SessionOutcome, SessionParams};
use crate::vad::AdaptiveThreshold;

/// Broadcast capacity per event family.
const EVENT_CAPACITY: usize = 256;

/// External wake-word spotter, opaque to this core.
///
/// Implementations must observe `cancel` and return promptly once it is
/// raised; the loop passes its own cancel flag so `stop()` can interrupt a
/// blocking wait.
pub trait WakeSignal: Send {
    /// Block until activation. `Ok(true)` means the wake word was heard;
    /// `Ok(false)` means the wait was cancelled.
    fn wait(&mut self, cancel: &AtomicBool) -> Result<bool>;
}

/// Configuration for [`Listener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Capture timing (sample rate, chunk/pre-speech/silence durations).
    pub session: SessionParams,
    /// Per-activation recording ceiling in seconds. Default: 10.
    pub max_recording_duration: f64,
    /// Ambient measurement length for startup calibration. Default: 1.5 s.
    pub calibration_duration: f64,
    /// Whether to calibrate from ambient noise before entering the loop.
    pub calibrate_on_start: bool,
    /// Input device selected by exact name; `None` uses the system default.
    pub preferred_input_device: Option<String>,
    /// Where captured utterances are serialized (overwritten per session).
    pub artifact_path: PathBuf,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            session: SessionParams::default(),
            max_recording_duration: 10.0,
            calibration_duration: 1.5,
            calibrate_on_start: true,
            preferred_input_device: None,
            artifact_path: std::env::temp_dir().join("auris_utterance.wav"),
        }
    }
}

/// The wake-word-gated capture loop handle.
///
/// `Listener` is `Send + Sync`; all fields use interior mutability. Wrap in
/// `Arc<Listener>` to share between the host app and event-forwarding tasks.
pub struct Listener {
    config: ListenerConfig,
    threshold: Arc<AdaptiveThreshold>,
    /// `true` while the loop is active.
    running: Arc<AtomicBool>,
    /// Raised by `stop()` to interrupt blocking waits and reads.
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<ListenerStatus>>,
    events: Arc<EventBus>,
}

/// Everything the loop needs, passed as one struct so the closure stays tidy.
struct LoopContext {
    config: ListenerConfig,
    threshold: Arc<AdaptiveThreshold>,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<ListenerStatus>>,
    events: Arc<EventBus>,
}

impl Listener {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            threshold: Arc::new(AdaptiveThreshold::default()),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(ListenerStatus::Idle)),
            events: Arc::new(EventBus::new(EVENT_CAPACITY)),
        }
    }

    /// The shared energy threshold (calibrated on start, drifting while idle).
    pub fn threshold(&self) -> &Arc<AdaptiveThreshold> {
        &self.threshold
    }

    /// Event fan-out for presentation layers.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Current status snapshot.
    pub fn status(&self) -> ListenerStatus {
        *self.status.lock()
    }

    /// Start the wake loop with the given wake-word spotter.
    ///
    /// Blocks until the audio device probe is confirmed (or fails), then
    /// returns; the loop continues in a background blocking thread.
    ///
    /// # Errors
    /// - `ListenError::AlreadyRunning` if already started.
    /// - Device errors from the probe open.
    pub fn start(&self, wake: Box<dyn WakeSignal>) -> Result<()> {
        let capture_rate = self.config.session.sample_rate;
        let cancel = Arc::clone(&self.cancel);
        let preferred = self.config.preferred_input_device.clone();
        self.start_with_source_factory(wake, move || {
            CpalSource::open(capture_rate, Arc::clone(&cancel), preferred.as_deref())
                .map(|s| Box::new(s) as Box<dyn AudioSource>)
        })
    }

    /// Start with a custom source factory. The factory is invoked on the
    /// loop thread for the probe/calibration open and once per session.
    pub fn start_with_source_factory<F>(&self, wake: Box<dyn WakeSignal>, open_source: F) -> Result<()>
    where
        F: FnMut() -> Result<Box<dyn AudioSource>> + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ListenError::AlreadyRunning);
        }
        self.cancel.store(false, Ordering::SeqCst);

        let ctx = LoopContext {
            config: self.config.clone(),
            threshold: Arc::clone(&self.threshold),
            running: Arc::clone(&self.running),
            cancel: Arc::clone(&self.cancel),
            status: Arc::clone(&self.status),
            events: Arc::clone(&self.events),
        };

        // Sync oneshot: the loop thread signals probe success/failure back.
        let (probe_tx, probe_rx) = std::sync::mpsc::channel::<Result<()>>();

        tokio::task::spawn_blocking(move || run_loop(ctx, wake, open_source, probe_tx));

        match probe_rx.recv() {
            Ok(Ok(())) => {
                info!("listener started");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(ListenError::Other(anyhow::anyhow!(
                    "wake loop died before confirming device open"
                )))
            }
        }
    }

    /// Stop the wake loop, interrupting any blocking wait or in-flight
    /// session. Expected during shutdown; the interrupted session reports
    /// `Cancelled`, not an error.
    ///
    /// # Errors
    /// `ListenError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ListenError::NotRunning);
        }
        self.cancel.store(true, Ordering::SeqCst);
        info!("listener stop requested");
        Ok(())
    }

    /// True while the loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn set_status(ctx: &LoopContext, status: ListenerStatus, detail: Option<String>) {
    *ctx.status.lock() = status;
    ctx.events.emit_status(status, detail);
}

/// The blocking wake loop. Runs until cancelled or a device error.
fn run_loop<F>(
    ctx: LoopContext,
    mut wake: Box<dyn WakeSignal>,
    mut open_source: F,
    probe_tx: std::sync::mpsc::Sender<Result<()>>,
) where
    F: FnMut() -> Result<Box<dyn AudioSource>>,
{
    // Probe the device once so start() fails fast when no input exists;
    // the same open doubles as the calibration source.
    let probe = open_source();
    let mut source = match probe {
        Ok(source) => {
            let _ = probe_tx.send(Ok(()));
            source
        }
        Err(e) => {
            let _ = probe_tx.send(Err(e));
            ctx.running.store(false, Ordering::SeqCst);
            return;
        }
    };

    if ctx.config.calibrate_on_start {
        set_status(&ctx, ListenerStatus::Calibrating, None);
        match session::calibrate_ambient(
            source.as_mut(),
            &ctx.threshold,
            &ctx.config.session,
            ctx.config.calibration_duration,
        ) {
            Ok(true) => {}
            Ok(false) => {
                // Cancelled mid-calibration; loop drains below.
            }
            Err(e) => {
                // Threshold keeps its conservative default.
                warn!("calibration failed ({e}), using default threshold");
                ctx.events.emit_status(
                    ListenerStatus::Calibrating,
                    Some(format!("calibration failed: {e}")),
                );
            }
        }
    }
    drop(source);

    while !ctx.cancel.load(Ordering::Relaxed) {
        set_status(&ctx, ListenerStatus::WaitingForWake, None);

        let activated = match wake.wait(&ctx.cancel) {
            Ok(activated) => activated,
            Err(e) => {
                error!("wake signal failed: {e}");
                set_status(&ctx, ListenerStatus::Error, Some(e.to_string()));
                break;
            }
        };
        if !activated {
            continue;
        }

        set_status(&ctx, ListenerStatus::Recording, None);
        if let Err(e) = run_session(&ctx, &mut open_source) {
            // Actionable for the host: the microphone went away mid-loop.
            error!("audio input unavailable: {e}");
            set_status(&ctx, ListenerStatus::Error, Some(e.to_string()));
            break;
        }
    }

    ctx.running.store(false, Ordering::SeqCst);
    if *ctx.status.lock() != ListenerStatus::Error {
        set_status(&ctx, ListenerStatus::Stopped, None);
    }
    info!("wake loop stopped");
}

/// One activation: open, capture, serialize, release.
fn run_session<F>(ctx: &LoopContext, open_source: &mut F) -> Result<()>
where
    F: FnMut() -> Result<Box<dyn AudioSource>>,
{
    let mut source = open_source()?;
    let outcome = session::record_utterance(
        source.as_mut(),
        &ctx.threshold,
        &ctx.config.session,
        ctx.config.max_recording_duration,
        &ctx.events,
    )?;
    drop(source);

    match outcome {
        SessionOutcome::Captured(audio) => {
            let path = ctx.config.artifact_path.clone();
            audio.write_wav(&path)?;
            ctx.events.emit_session(SessionEventKind::UtteranceCaptured {
                path,
                duration_secs: audio.duration_secs(),
            });
        }
        SessionOutcome::NoSpeech | SessionOutcome::Cancelled => {
            // Session events were already emitted by the driver.
        }
    }
    Ok(())
}
