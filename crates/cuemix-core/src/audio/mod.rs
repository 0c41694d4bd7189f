//! Output device boundary
//!
//! Render threads talk to audio hardware only through [`OutputDevice`] and
//! [`OutputLine`]:
//!
//! - **cpal** (`cpal-backend` feature, default): ALSA/PulseAudio on Linux,
//!   CoreAudio on macOS, WASAPI on Windows
//! - **memory**: captures bytes for offline rendering and tests
//!
//! Every line carries 44100 Hz stereo signed 16-bit little-endian PCM.

mod config;
mod error;
mod line;
mod memory;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
#[cfg(feature = "cpal-backend")]
mod device;

pub use config::{DeviceId, OutputConfig, MAX_BUFFER_FRAMES, MIN_BUFFER_FRAMES};
pub use error::{AudioError, AudioResult};
pub use line::{default_output_device, OutputDevice, OutputLine};
pub use memory::MemoryOutput;

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::{CpalLine, CpalOutput};
#[cfg(feature = "cpal-backend")]
pub use device::{find_device_by_id, get_cpal_default_device, get_output_devices, AudioDevice};

use std::sync::Arc;

/// Resolve an optional device id to an output device
///
/// `None` selects the platform default.
#[cfg(feature = "cpal-backend")]
pub fn output_device(id: Option<&DeviceId>) -> AudioResult<Arc<dyn OutputDevice>> {
    match id {
        Some(id) => Ok(Arc::new(CpalOutput::find(id.clone()))),
        None => default_output_device(),
    }
}

#[cfg(not(feature = "cpal-backend"))]
pub fn output_device(id: Option<&DeviceId>) -> AudioResult<Arc<dyn OutputDevice>> {
    match id {
        Some(id) => Err(AudioError::BackendUnavailable(format!(
            "cannot open {} without the cpal-backend feature",
            id
        ))),
        None => default_output_device(),
    }
}
