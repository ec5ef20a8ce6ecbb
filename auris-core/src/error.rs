use thiserror::Error;

/// All errors produced by auris-core.
///
/// "No speech detected" and caller-initiated cancellation are *not* errors;
/// they are ordinary [`SessionOutcome`](crate::session::SessionOutcome)
/// variants. Only the I/O boundary (device open/read, artifact write) fails.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error("audio input unavailable: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("ambient calibration failed: {0}")]
    Calibration(String),

    #[error("listener is already running")]
    AlreadyRunning,

    #[error("listener is not running")]
    NotRunning,

    #[error("WAV serialization error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ListenError>;
