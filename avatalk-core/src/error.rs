use thiserror::Error;

/// All errors produced by avatalk-core.
///
/// Only `MediaAccess` and `PlaybackSetup` ever change the conversation state
/// (both force it offline). `RecognitionEngine` is swallowed where it occurs
/// and `Transport` is replaced by a fallback reply inside the dispatcher.
#[derive(Debug, Error)]
pub enum AvatalkError {
    /// Microphone denied or unavailable.
    #[error("media access error: {0}")]
    MediaAccess(String),

    /// No input device exists on this host.
    #[error("no default input device found")]
    NoDefaultInputDevice,

    /// Start/stop issued against a recognizer in the wrong state.
    #[error("recognition engine error: {0}")]
    RecognitionEngine(String),

    /// Speech synthesis backend refused an utterance.
    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    /// Chat or session HTTP call failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Media playback SDK or avatar view could not be set up.
    #[error("playback setup error: {0}")]
    PlaybackSetup(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for AvatalkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AvatalkError>;
