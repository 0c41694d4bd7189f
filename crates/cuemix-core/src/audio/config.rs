//! Output device selection

use serde::{Deserialize, Serialize};

use crate::render::ThreadPriority;
use crate::types::DEFAULT_BUFFER_FRAMES;

/// Largest render buffer accepted by an output line (frames)
pub const MAX_BUFFER_FRAMES: usize = 65536;

/// Smallest render buffer accepted by an output line (frames)
pub const MIN_BUFFER_FRAMES: usize = 64;

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, CoreAudio, ...)
/// so the same name on two hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "ALSA", "CoreAudio")
    /// If None, every available host is searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_label())
    }
}

/// Where and how a render thread writes its audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// None selects the platform default device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceId>,
    pub buffer_frames: usize,
    pub thread_priority: ThreadPriority,
}

impl OutputConfig {
    pub fn with_buffer_frames(buffer_frames: usize) -> Self {
        Self {
            buffer_frames,
            ..Self::default()
        }
    }

    /// Buffer size pulled into the accepted range
    pub fn clamped_buffer_frames(&self) -> usize {
        self.buffer_frames.clamp(MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            thread_priority: ThreadPriority::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_label() {
        assert_eq!(DeviceId::new("hw:0,0").display_label(), "hw:0,0");
        assert_eq!(
            DeviceId::with_host("hw:0,0", "ALSA").display_label(),
            "[ALSA] hw:0,0"
        );
    }

    #[test]
    fn test_host_omitted_from_yaml_when_none() {
        let yaml = serde_yaml::to_string(&DeviceId::new("Speakers")).unwrap();
        assert!(!yaml.contains("host"));
        let back: DeviceId = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, DeviceId::new("Speakers"));
    }

    #[test]
    fn test_output_config_partial_yaml() {
        let config: OutputConfig = serde_yaml::from_str("buffer_frames: 16").unwrap();
        assert_eq!(config.device, None);
        assert_eq!(config.thread_priority, ThreadPriority::MAX);
        assert_eq!(config.clamped_buffer_frames(), MIN_BUFFER_FRAMES);
    }

    #[test]
    fn test_output_config_rejects_bad_priority() {
        let result: Result<OutputConfig, _> = serde_yaml::from_str("thread_priority: 11");
        assert!(result.is_err());
    }
}
