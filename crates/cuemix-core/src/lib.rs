//! Cuemix Core - polyphonic cue playback and track mixing
//!
//! A cue ([`AudioCue`]) holds one pre-loaded PCM buffer and a fixed pool of
//! playback instances that can be started, stopped, looped and ramped
//! independently. Cues either drive their own output line or register as
//! tracks of an [`AudioMixer`], which sums every running track into one line.

pub mod audio;
pub mod config;
pub mod cue;
pub mod curves;
pub mod error;
pub mod events;
pub mod gc;
pub mod mixer;
pub mod pcm;
pub mod render;
pub mod types;

pub use cue::AudioCue;
pub use curves::{PanLaw, VolumeCurve};
pub use error::{CueError, CueResult};
pub use events::{
    ClosedEvent, CueId, CueListener, InstanceEvent, InstanceEventKind, ListenerEvent,
    OpenedEvent, QueuedListener,
};
pub use mixer::{AudioMixer, MixerTrack};
pub use config::EngineConfig;
pub use pcm::PcmBuffer;
pub use render::ThreadPriority;
pub use types::*;
