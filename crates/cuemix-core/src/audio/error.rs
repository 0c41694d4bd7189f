//! Output device error types

use thiserror::Error;

/// Errors that can occur while acquiring or writing to an output device
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio devices available
    #[error("No audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("Failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("Failed to start audio stream: {0}")]
    StreamPlayError(String),

    /// Stream error during playback
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// Device cannot play 44100 Hz stereo
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// Write after close
    #[error("Output line is closed")]
    LineClosed,

    /// Built without a device backend
    #[error("No audio backend available: {0}")]
    BackendUnavailable(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
