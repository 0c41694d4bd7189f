//! Engine configuration
//!
//! Everything a host application usually wants to persist: which device the
//! cues and the mixer play on, buffer sizes, render thread priorities and the
//! default curve choices for new cues. Stored as YAML:
//!
//! ```yaml
//! output:
//!   device:
//!     name: "hw:0,0"
//!     host: ALSA
//!   buffer_frames: 1024
//!   thread_priority: 10
//! mixer:
//!   buffer_frames: 8192
//!   thread_priority: 10
//! volume_curve: ExpX4
//! pan_law: SineLaw
//! polyphony: 4
//! ```

mod io;
mod paths;

pub use io::{load_config, read_config, save_config};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::{self, OutputConfig};
use crate::cue::AudioCue;
use crate::curves::{PanLaw, VolumeCurve};
use crate::error::CueResult;
use crate::mixer::AudioMixer;
use crate::types::MIXER_DEFAULT_BUFFER_FRAMES;

/// Instances per cue when nothing else is configured
pub const DEFAULT_POLYPHONY: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output used by cues that open their own line
    pub output: OutputConfig,
    /// Output used by the mixer
    pub mixer: OutputConfig,
    pub volume_curve: VolumeCurve,
    pub pan_law: PanLaw,
    pub polyphony: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            mixer: OutputConfig::with_buffer_frames(MIXER_DEFAULT_BUFFER_FRAMES),
            volume_curve: VolumeCurve::default(),
            pan_law: PanLaw::default(),
            polyphony: DEFAULT_POLYPHONY,
        }
    }
}

impl EngineConfig {
    /// Load from the per-user location, falling back to defaults
    pub fn load_default() -> Self {
        load_config(&default_config_path())
    }

    pub fn load(path: &Path) -> Self {
        load_config(path)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_config(self, path)
    }

    /// Load a WAV cue with the configured polyphony and curves
    pub fn load_cue(&self, path: &Path) -> CueResult<AudioCue> {
        let cue = AudioCue::from_wav_path(path, self.polyphony.max(1))?;
        cue.set_volume_curve(self.volume_curve);
        cue.set_pan_law(self.pan_law);
        Ok(cue)
    }

    /// Open `cue` on its own line as configured under `output`
    pub fn open_cue(&self, cue: &AudioCue) -> CueResult<()> {
        let device = audio::output_device(self.output.device.as_ref())?;
        cue.open_with(
            Some(device),
            self.output.clamped_buffer_frames(),
            self.output.thread_priority,
        )
    }

    /// Build a mixer as configured under `mixer`
    pub fn build_mixer(&self) -> CueResult<AudioMixer> {
        let device = audio::output_device(self.mixer.device.as_ref())?;
        AudioMixer::with_device(
            Some(device),
            self.mixer.clamped_buffer_frames(),
            self.mixer.thread_priority,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceId;
    use crate::pcm::tests::{cd_spec, wav_bytes};
    use crate::ThreadPriority;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.output.buffer_frames, 1024);
        assert_eq!(config.mixer.buffer_frames, 8192);
        assert_eq!(config.output.thread_priority, ThreadPriority::MAX);
        assert_eq!(config.volume_curve, VolumeCurve::ExpX4);
        assert_eq!(config.pan_law, PanLaw::SineLaw);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "output:\n  device:\n    name: Speakers\npolyphony: 2\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.output.device, Some(DeviceId::new("Speakers")));
        assert_eq!(config.output.buffer_frames, 1024);
        assert_eq!(config.polyphony, 2);
        assert_eq!(config.mixer, EngineConfig::default().mixer);
    }

    #[test]
    fn test_load_cue_applies_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click.wav");
        std::fs::write(&path, wav_bytes(cd_spec(), &[1000, -1000, 0, 0])).unwrap();

        let config = EngineConfig {
            volume_curve: VolumeCurve::Linear,
            pan_law: PanLaw::FullLinear,
            polyphony: 3,
            ..EngineConfig::default()
        };
        let cue = config.load_cue(&path).unwrap();
        assert_eq!(cue.name(), "click.wav");
        assert_eq!(cue.polyphony(), 3);
        assert_eq!(cue.frame_length(), 2);
        assert_eq!(cue.volume_curve(), VolumeCurve::Linear);
        assert_eq!(cue.pan_law(), PanLaw::FullLinear);
    }
}
