//! Engine error types

use thiserror::Error;

use crate::audio::AudioError;

/// Errors returned by cue and mixer operations
#[derive(Error, Debug)]
pub enum CueError {
    /// PCM data is not stereo 16-bit 44100 Hz, or is empty or malformed
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The instance is not in a state that allows the operation
    #[error("Cue '{cue}', instance {instance}: {reason}")]
    InvalidState {
        cue: String,
        instance: usize,
        reason: &'static str,
    },

    /// Instance id outside the pool
    #[error("Cue '{cue}' has no instance {instance} (polyphony {polyphony})")]
    NoSuchInstance {
        cue: String,
        instance: usize,
        polyphony: usize,
    },

    /// The output device could not be acquired
    #[error("Output device unavailable: {0}")]
    DeviceUnavailable(#[from] AudioError),

    #[error("Output is already open")]
    AlreadyOpen,

    #[error("Output is already closed")]
    AlreadyClosed,

    #[error("Mixer is already running")]
    AlreadyRunning,

    #[error("Mixer is already stopped")]
    AlreadyStopped,

    /// Argument outside its documented domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to read PCM data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cue and mixer operations
pub type CueResult<T> = Result<T, CueError>;

impl From<hound::Error> for CueError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => CueError::Io(e),
            other => CueError::UnsupportedFormat(other.to_string()),
        }
    }
}
