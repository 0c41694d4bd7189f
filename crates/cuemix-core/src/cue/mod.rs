//! Polyphonic cue player
//!
//! An [`AudioCue`] holds one PCM buffer and a fixed pool of playback
//! instances. Instances move through a small state machine:
//!
//! ```text
//!  Available ──obtain──► Active/Stopped ──start──► Active/Playing
//!      ▲                   │      ▲                   │
//!      └─────release───────┘      └──stop / end of cue┘
//! ```
//!
//! `play` bundles obtain + parameters + start and marks the instance to be
//! released automatically when it finishes. Parameter changes on a playing
//! instance are ramped (see [`ramp`]); on a stopped instance they take effect
//! at the next `start`.
//!
//! Rendering happens either on the cue's own thread (`open`), on a mixer's
//! thread (`open_on_mixer`), or on demand through [`AudioCue::render`].

mod cursor;
pub mod ramp;
mod render;

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use self::cursor::Cursor;
use crate::audio::{self, OutputDevice, MAX_BUFFER_FRAMES, MIN_BUFFER_FRAMES};
use crate::curves::{PanLaw, VolumeCurve};
use crate::error::{CueError, CueResult};
use crate::events::{
    ClosedEvent, CueId, CueListener, InstanceEvent, InstanceEventKind, Listeners, OpenedEvent,
};
use crate::mixer::{AudioMixer, MixerTrack, WeakMixer};
use crate::pcm::PcmBuffer;
use crate::render::{RenderSource, RenderThread, ThreadPriority};
use crate::types::{DEFAULT_BUFFER_FRAMES, SAMPLE_RATE};

pub const MIN_VOLUME: f64 = 0.0;
pub const MAX_VOLUME: f64 = 1.0;
pub const MIN_PAN: f64 = -1.0;
pub const MAX_PAN: f64 = 1.0;
pub const MIN_SPEED: f64 = 0.125;
pub const MAX_SPEED: f64 = 8.0;

/// Loop count meaning "until stopped"
pub const LOOP_FOREVER: i32 = -1;

/// Where a cue's audio goes
enum CueOutput {
    Closed,
    /// Own render thread and output line
    Standalone(RenderThread),
    /// Registered as a track of a mixer
    Track(WeakMixer),
}

pub(crate) struct CueShared {
    id: CueId,
    name: Arc<str>,
    pcm: PcmBuffer,
    cursors: Box<[Cursor]>,
    /// Ids of inactive instances; obtain pops the back, release pushes the front
    available: Mutex<VecDeque<usize>>,
    volume_curve: AtomicU8,
    pan_law: AtomicU8,
    listeners: Listeners,
    output: Mutex<CueOutput>,
    track_running: AtomicBool,
    /// Serializes renders so two threads never advance the same cursors
    render_lock: Mutex<()>,
}

impl CueShared {
    fn volume_curve(&self) -> VolumeCurve {
        VolumeCurve::ALL[self.volume_curve.load(Ordering::Relaxed) as usize]
    }

    fn pan_law(&self) -> PanLaw {
        PanLaw::ALL[self.pan_law.load(Ordering::Relaxed) as usize]
    }

    fn emit(&self, kind: InstanceEventKind, instance: usize, frame: f64) {
        self.listeners.instance(InstanceEvent {
            kind,
            time: Utc::now(),
            cue: self.id,
            cue_name: Arc::clone(&self.name),
            instance,
            frame,
        });
    }

    /// Return a finished instance to the pool
    fn recycle(&self, cursor: &Cursor) {
        if !cursor.deactivate() {
            return;
        }
        cursor.reset();
        self.available.lock().push_front(cursor.id);
        self.emit(InstanceEventKind::Release, cursor.id, cursor.position());
    }
}

impl RenderSource for CueShared {
    fn render_buffer(&self, out: &mut [f32]) {
        self.fill_buffer(out);
    }
}

impl MixerTrack for CueShared {
    fn is_track_running(&self) -> bool {
        self.track_running.load(Ordering::Acquire)
    }

    fn set_track_running(&self, running: bool) {
        self.track_running.store(running, Ordering::Release);
    }

    fn read_track(&self, out: &mut [f32]) -> anyhow::Result<()> {
        self.fill_buffer(out);
        Ok(())
    }
}

/// A pre-loaded sound with a fixed number of concurrent playback instances
///
/// Cheap to clone; clones control the same cue. Dropping the last handle of a
/// cue playing on its own thread stops that thread.
#[derive(Clone)]
pub struct AudioCue {
    shared: Arc<CueShared>,
}

impl std::fmt::Debug for AudioCue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCue")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("frames", &self.shared.pcm.frame_length())
            .field("polyphony", &self.shared.cursors.len())
            .finish()
    }
}

impl AudioCue {
    /// Build a cue over already loaded PCM
    pub fn new(pcm: PcmBuffer, name: impl Into<String>, polyphony: usize) -> CueResult<Self> {
        if polyphony == 0 {
            return Err(CueError::InvalidArgument(
                "polyphony must be at least 1".to_string(),
            ));
        }
        let cursors: Box<[Cursor]> = (0..polyphony).map(Cursor::new).collect();
        let name: String = name.into();
        log::debug!(
            "Created cue '{}' ({} frames, polyphony {})",
            name,
            pcm.frame_length(),
            polyphony
        );

        Ok(Self {
            shared: Arc::new(CueShared {
                id: CueId::next(),
                name: Arc::from(name),
                pcm,
                cursors,
                available: Mutex::new((0..polyphony).collect()),
                volume_curve: AtomicU8::new(curve_index(VolumeCurve::default())),
                pan_law: AtomicU8::new(law_index(PanLaw::default())),
                listeners: Listeners::new(),
                output: Mutex::new(CueOutput::Closed),
                track_running: AtomicBool::new(false),
                render_lock: Mutex::new(()),
            }),
        })
    }

    /// Build a cue from interleaved stereo float samples
    pub fn from_pcm(
        samples: Vec<f32>,
        name: impl Into<String>,
        polyphony: usize,
    ) -> CueResult<Self> {
        Self::new(PcmBuffer::from_interleaved(samples)?, name, polyphony)
    }

    /// Load a 44100 Hz stereo 16-bit WAV file; the cue is named after the file
    pub fn from_wav_path(path: &Path, polyphony: usize) -> CueResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(PcmBuffer::from_wav_path(path)?, name, polyphony)
    }

    pub fn from_wav_bytes(
        bytes: &[u8],
        name: impl Into<String>,
        polyphony: usize,
    ) -> CueResult<Self> {
        Self::new(PcmBuffer::from_wav_bytes(bytes)?, name, polyphony)
    }

    // ───────────────────────────── Properties ─────────────────────────────

    pub fn id(&self) -> CueId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn polyphony(&self) -> usize {
        self.shared.cursors.len()
    }

    pub fn frame_length(&self) -> usize {
        self.shared.pcm.frame_length()
    }

    pub fn microsecond_length(&self) -> u64 {
        self.shared.pcm.microsecond_length()
    }

    /// Copy of the cue's PCM as interleaved stereo floats
    pub fn pcm_copy(&self) -> Vec<f32> {
        self.shared.pcm.to_interleaved()
    }

    pub fn volume_curve(&self) -> VolumeCurve {
        self.shared.volume_curve()
    }

    /// Takes effect from the next rendered buffer
    pub fn set_volume_curve(&self, curve: VolumeCurve) {
        self.shared
            .volume_curve
            .store(curve_index(curve), Ordering::Relaxed);
    }

    pub fn pan_law(&self) -> PanLaw {
        self.shared.pan_law()
    }

    pub fn set_pan_law(&self, law: PanLaw) {
        self.shared.pan_law.store(law_index(law), Ordering::Relaxed);
    }

    pub fn add_listener(&self, listener: Arc<dyn CueListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn CueListener>) -> bool {
        self.shared.listeners.remove(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// This cue as a mixer track
    pub fn as_track(&self) -> Arc<dyn MixerTrack> {
        self.shared.clone()
    }

    // ───────────────────────────── Instance pool ─────────────────────────────

    fn cursor(&self, instance: usize) -> CueResult<&Cursor> {
        self.shared
            .cursors
            .get(instance)
            .ok_or_else(|| CueError::NoSuchInstance {
                cue: self.shared.name.to_string(),
                instance,
                polyphony: self.shared.cursors.len(),
            })
    }

    fn invalid_state(&self, instance: usize, reason: &'static str) -> CueError {
        CueError::InvalidState {
            cue: self.shared.name.to_string(),
            instance,
            reason,
        }
    }

    fn active_cursor(&self, instance: usize) -> CueResult<&Cursor> {
        let cursor = self.cursor(instance)?;
        if !cursor.is_active() {
            return Err(self.invalid_state(instance, "instance is inactive"));
        }
        Ok(cursor)
    }

    /// Active and not playing
    fn stopped_cursor(&self, instance: usize) -> CueResult<&Cursor> {
        let cursor = self.active_cursor(instance)?;
        if cursor.is_playing() {
            return Err(self.invalid_state(instance, "instance is playing"));
        }
        Ok(cursor)
    }

    /// Take an instance from the pool; `None` when all are in use
    pub fn obtain_instance(&self) -> Option<usize> {
        let Some(id) = self.shared.available.lock().pop_back() else {
            log::debug!("Cue '{}': all {} instances in use", self.name(), self.polyphony());
            return None;
        };
        let cursor = &self.shared.cursors[id];
        cursor.set_active(true);
        self.shared
            .emit(InstanceEventKind::Obtain, id, cursor.position());
        Some(id)
    }

    /// Reset an instance and return it to the pool
    pub fn release_instance(&self, instance: usize) -> CueResult<()> {
        let cursor = self.cursor(instance)?;
        if !cursor.deactivate() {
            return Err(self.invalid_state(instance, "instance is inactive"));
        }
        cursor.reset();
        self.shared.available.lock().push_front(instance);
        self.shared
            .emit(InstanceEventKind::Release, instance, cursor.position());
        Ok(())
    }

    /// Obtain, configure and start an instance that releases itself when done
    ///
    /// `loops` is the number of additional plays; [`LOOP_FOREVER`] repeats
    /// until stopped. Returns `None` when every instance is in use.
    pub fn play(&self, volume: f64, pan: f64, speed: f64, loops: i32) -> Option<usize> {
        let id = self.obtain_instance()?;
        let configured = self
            .set_volume(id, volume)
            .and_then(|_| self.set_pan(id, pan))
            .and_then(|_| self.set_speed(id, speed))
            .and_then(|_| self.set_looping(id, loops))
            .and_then(|_| self.set_recycle_when_done(id, true))
            .and_then(|_| self.start(id));

        match configured {
            Ok(()) => Some(id),
            Err(e) => {
                log::warn!("Cue '{}': could not play instance {}: {}", self.name(), id, e);
                let _ = self.release_instance(id);
                None
            }
        }
    }

    /// Play once at full volume, centered, normal speed
    pub fn play_once(&self) -> Option<usize> {
        self.play(MAX_VOLUME, 0.0, 1.0, 0)
    }

    /// Start playing from the current position
    ///
    /// Requested volume, pan and speed apply immediately, without a ramp.
    pub fn start(&self, instance: usize) -> CueResult<()> {
        let cursor = self.stopped_cursor(instance)?;
        cursor.start_playing();
        self.shared
            .emit(InstanceEventKind::Start, instance, cursor.position());
        Ok(())
    }

    /// Halt playback; the instance stays active at its current position
    pub fn stop(&self, instance: usize) -> CueResult<()> {
        let cursor = self.active_cursor(instance)?;
        cursor.set_playing(false);
        self.shared
            .emit(InstanceEventKind::Stop, instance, cursor.position());
        Ok(())
    }

    pub fn is_active(&self, instance: usize) -> CueResult<bool> {
        Ok(self.cursor(instance)?.is_active())
    }

    pub fn is_playing(&self, instance: usize) -> CueResult<bool> {
        Ok(self.cursor(instance)?.is_playing())
    }

    // ───────────────────────────── Position ─────────────────────────────

    fn last_frame(&self) -> f64 {
        (self.frame_length() - 1) as f64
    }

    /// Current position in frames; may lie between frames
    pub fn frame_position(&self, instance: usize) -> CueResult<f64> {
        Ok(self.active_cursor(instance)?.position())
    }

    /// Move a stopped instance, clamped to the cue
    pub fn set_frame_position(&self, instance: usize, frame: f64) -> CueResult<()> {
        let cursor = self.stopped_cursor(instance)?;
        let frame = not_nan(frame, "frame position")?;
        cursor.reposition(frame.clamp(0.0, self.last_frame()));
        Ok(())
    }

    pub fn set_microsecond_position(&self, instance: usize, microseconds: u64) -> CueResult<()> {
        let cursor = self.stopped_cursor(instance)?;
        let frame = SAMPLE_RATE as f64 * microseconds as f64 / 1_000_000.0;
        cursor.reposition(frame.clamp(0.0, self.last_frame()));
        Ok(())
    }

    /// Position as a fraction of the cue length, 0.0 to 1.0
    pub fn set_fractional_position(&self, instance: usize, fraction: f64) -> CueResult<()> {
        let cursor = self.stopped_cursor(instance)?;
        let fraction = not_nan(fraction, "fractional position")?.clamp(0.0, 1.0);
        let frame = self.frame_length() as f64 * fraction;
        cursor.reposition(frame.clamp(0.0, self.last_frame()));
        Ok(())
    }

    // ───────────────────────────── Parameters ─────────────────────────────

    /// Current (possibly ramping) value while playing, requested value otherwise
    pub fn volume(&self, instance: usize) -> CueResult<f64> {
        let cursor = self.active_cursor(instance)?;
        Ok(if cursor.is_playing() {
            cursor.volume.current()
        } else {
            cursor.volume.requested()
        })
    }

    /// Clamped to [0, 1]
    pub fn set_volume(&self, instance: usize, volume: f64) -> CueResult<()> {
        let cursor = self.active_cursor(instance)?;
        let volume = not_nan(volume, "volume")?;
        cursor.volume.request(volume.clamp(MIN_VOLUME, MAX_VOLUME));
        Ok(())
    }

    pub fn pan(&self, instance: usize) -> CueResult<f64> {
        let cursor = self.active_cursor(instance)?;
        Ok(if cursor.is_playing() {
            cursor.pan.current()
        } else {
            cursor.pan.requested()
        })
    }

    /// Clamped to [-1, 1]; -1 is hard left
    pub fn set_pan(&self, instance: usize, pan: f64) -> CueResult<()> {
        let cursor = self.active_cursor(instance)?;
        let pan = not_nan(pan, "pan")?;
        cursor.pan.request(pan.clamp(MIN_PAN, MAX_PAN));
        Ok(())
    }

    pub fn speed(&self, instance: usize) -> CueResult<f64> {
        let cursor = self.active_cursor(instance)?;
        Ok(if cursor.is_playing() {
            cursor.speed.current()
        } else {
            cursor.speed.requested()
        })
    }

    /// Playback rate factor, clamped to [0.125, 8]
    pub fn set_speed(&self, instance: usize, speed: f64) -> CueResult<()> {
        let cursor = self.active_cursor(instance)?;
        let speed = not_nan(speed, "speed")?;
        cursor.speed.request(speed.clamp(MIN_SPEED, MAX_SPEED));
        Ok(())
    }

    /// Remaining additional plays, or [`LOOP_FOREVER`]
    pub fn looping(&self, instance: usize) -> CueResult<i32> {
        Ok(self.active_cursor(instance)?.loops())
    }

    pub fn set_looping(&self, instance: usize, loops: i32) -> CueResult<()> {
        self.active_cursor(instance)?.set_loops(loops);
        Ok(())
    }

    pub fn recycle_when_done(&self, instance: usize) -> CueResult<bool> {
        Ok(self.active_cursor(instance)?.recycle_when_done())
    }

    pub fn set_recycle_when_done(&self, instance: usize, recycle: bool) -> CueResult<()> {
        self.active_cursor(instance)?.set_recycle_when_done(recycle);
        Ok(())
    }

    // ───────────────────────────── Output ─────────────────────────────

    /// Render the next buffer of interleaved stereo into `out`
    ///
    /// Works whether or not the cue is open; an open cue's own thread or
    /// mixer advances the same instances.
    pub fn render(&self, out: &mut [f32]) {
        self.shared.fill_buffer(out);
    }

    pub fn is_open(&self) -> bool {
        !matches!(*self.shared.output.lock(), CueOutput::Closed)
    }

    /// Start a render thread on the default device
    pub fn open(&self) -> CueResult<()> {
        self.open_with(None, DEFAULT_BUFFER_FRAMES, ThreadPriority::MAX)
    }

    /// Start a render thread on `device` (None = platform default)
    pub fn open_with(
        &self,
        device: Option<Arc<dyn OutputDevice>>,
        buffer_frames: usize,
        priority: ThreadPriority,
    ) -> CueResult<()> {
        if !(MIN_BUFFER_FRAMES..=MAX_BUFFER_FRAMES).contains(&buffer_frames) {
            return Err(CueError::InvalidArgument(format!(
                "buffer must be {}..={} frames, got {}",
                MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES, buffer_frames
            )));
        }

        let mut output = self.shared.output.lock();
        if !matches!(*output, CueOutput::Closed) {
            return Err(CueError::AlreadyOpen);
        }

        let device = match device {
            Some(device) => device,
            None => audio::default_output_device()?,
        };
        let source: Arc<dyn RenderSource> = self.shared.clone();
        let thread = RenderThread::spawn(
            &format!("cuemix-cue-{}", self.shared.id.as_u64()),
            Arc::downgrade(&source),
            device,
            buffer_frames,
            priority,
        )?;
        let opened = OpenedEvent {
            time: Utc::now(),
            cue: self.shared.id,
            cue_name: Arc::clone(&self.shared.name),
            thread_priority: thread.priority(),
            buffer_frames: thread.buffer_frames(),
        };
        *output = CueOutput::Standalone(thread);
        drop(output);

        log::info!("Cue '{}' opened on its own output", self.name());
        self.shared.listeners.opened(opened);
        Ok(())
    }

    /// Register with `mixer` instead of opening an output line
    pub fn open_on_mixer(&self, mixer: &AudioMixer) -> CueResult<()> {
        let mut output = self.shared.output.lock();
        if !matches!(*output, CueOutput::Closed) {
            return Err(CueError::AlreadyOpen);
        }

        self.shared.set_track_running(true);
        mixer.add_track(self.as_track());
        mixer.update_tracks();
        *output = CueOutput::Track(mixer.downgrade());
        drop(output);

        log::info!("Cue '{}' opened as a mixer track", self.name());
        self.shared.listeners.opened(OpenedEvent {
            time: Utc::now(),
            cue: self.shared.id,
            cue_name: Arc::clone(&self.shared.name),
            thread_priority: mixer.thread_priority(),
            buffer_frames: mixer.buffer_frames(),
        });
        Ok(())
    }

    /// Stop delivering audio, whichever way the cue was opened
    ///
    /// Instances keep their state; an unflushed buffer is discarded.
    pub fn close(&self) -> CueResult<()> {
        let previous = std::mem::replace(&mut *self.shared.output.lock(), CueOutput::Closed);
        match previous {
            CueOutput::Closed => return Err(CueError::AlreadyClosed),
            CueOutput::Standalone(thread) => thread.stop(),
            CueOutput::Track(mixer) => {
                self.shared.set_track_running(false);
                if let Some(mixer) = mixer.upgrade() {
                    mixer.remove_track(&self.as_track());
                    mixer.update_tracks();
                }
            }
        }

        log::info!("Cue '{}' closed", self.name());
        self.shared.listeners.closed(ClosedEvent {
            time: Utc::now(),
            cue: self.shared.id,
            cue_name: Arc::clone(&self.shared.name),
        });
        Ok(())
    }
}

fn curve_index(curve: VolumeCurve) -> u8 {
    VolumeCurve::ALL
        .iter()
        .position(|c| *c == curve)
        .unwrap_or(0) as u8
}

fn law_index(law: PanLaw) -> u8 {
    PanLaw::ALL.iter().position(|l| *l == law).unwrap_or(0) as u8
}

fn not_nan(value: f64, what: &str) -> CueResult<f64> {
    if value.is_nan() {
        Err(CueError::InvalidArgument(format!("{} is NaN", what)))
    } else {
        Ok(value)
    }
}
