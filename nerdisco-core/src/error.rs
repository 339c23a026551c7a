use thiserror::Error;

/// All errors produced by nerdisco-core.
///
/// Only lifecycle and device problems surface here. Malformed audio never
/// does: the converter and analyzer report "nothing this frame" instead.
#[derive(Debug, Error)]
pub enum DiscoError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("unsupported device sample format: {0}")]
    UnsupportedFormat(String),

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DiscoError>;
