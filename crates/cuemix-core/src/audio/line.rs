//! Output device and line traits
//!
//! An [`OutputDevice`] is a shareable description of where audio goes. Opening
//! it yields an [`OutputLine`], which is owned by exactly one render thread and
//! never leaves it.

use std::sync::Arc;

use super::error::AudioResult;

pub trait OutputDevice: Send + Sync {
    /// Human-readable name for logs and events
    fn name(&self) -> String;

    /// Acquire a line that accepts 44100 Hz stereo 16-bit LE bytes
    ///
    /// `buffer_frames` is the size of the writes the caller will make.
    fn open_line(&self, buffer_frames: usize) -> AudioResult<Box<dyn OutputLine>>;
}

pub trait OutputLine {
    /// Write interleaved 16-bit LE stereo bytes
    ///
    /// Blocks until the device has room for all of them.
    fn write(&mut self, bytes: &[u8]) -> AudioResult<usize>;

    /// Block until written audio has been played
    fn drain(&mut self);

    /// Release the device
    fn close(&mut self);
}

/// Default output of the platform backend
#[cfg(feature = "cpal-backend")]
pub fn default_output_device() -> AudioResult<Arc<dyn OutputDevice>> {
    Ok(Arc::new(super::cpal_backend::CpalOutput::default_device()))
}

#[cfg(not(feature = "cpal-backend"))]
pub fn default_output_device() -> AudioResult<Arc<dyn OutputDevice>> {
    Err(super::error::AudioError::BackendUnavailable(
        "built without the cpal-backend feature".to_string(),
    ))
}
