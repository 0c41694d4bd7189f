//! Multi-track mixer
//!
//! Tracks are staged with [`AudioMixer::add_track`] / [`AudioMixer::remove_track`]
//! and become audible only after [`AudioMixer::update_tracks`] publishes a new
//! snapshot. The render thread reads whichever snapshot is current at the
//! start of a tick, so staging never blocks or tears a render.
//!
//! Per tick every running track renders one buffer; the buffers are summed
//! and the sum is hard-clipped to [-1, 1]. A track that errors or panics is
//! logged and contributes silence for that tick.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use basedrop::{Shared, SharedCell};
use parking_lot::Mutex;

use crate::audio::{self, OutputDevice, MAX_BUFFER_FRAMES, MIN_BUFFER_FRAMES};
use crate::error::{CueError, CueResult};
use crate::gc::gc_handle;
use crate::render::{RenderSource, RenderThread, ThreadPriority};
use crate::types::{hard_clip, CHANNELS, MIXER_DEFAULT_BUFFER_FRAMES};

/// A source of audio that can be registered with an [`AudioMixer`]
pub trait MixerTrack: Send + Sync {
    /// Whether the mixer should pull from this track
    fn is_track_running(&self) -> bool;

    fn set_track_running(&self, running: bool);

    /// Overwrite `out` with the next interleaved stereo buffer
    fn read_track(&self, out: &mut [f32]) -> anyhow::Result<()>;
}

type TrackList = Vec<Arc<dyn MixerTrack>>;

fn same_track(a: &Arc<dyn MixerTrack>, b: &Arc<dyn MixerTrack>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

struct MixerShared {
    /// Tracks as edited by add/remove, not yet visible to the renderer
    staged: Mutex<TrackList>,
    /// Tracks the renderer reads
    published: SharedCell<TrackList>,
    /// Per-track render buffer, only touched while mixing
    scratch: Mutex<Vec<f32>>,
    device: Option<Arc<dyn OutputDevice>>,
    buffer_frames: usize,
    priority: ThreadPriority,
    thread: Mutex<Option<RenderThread>>,
}

impl MixerShared {
    fn mix(&self, out: &mut [f32]) {
        out.fill(0.0);
        let tracks: Shared<TrackList> = self.published.get();
        let mut scratch = self.scratch.lock();
        if scratch.len() != out.len() {
            scratch.resize(out.len(), 0.0);
        }

        for track in tracks.iter() {
            if !track.is_track_running() {
                continue;
            }
            scratch.fill(0.0);
            let result = panic::catch_unwind(AssertUnwindSafe(|| track.read_track(&mut scratch)));
            match result {
                Ok(Ok(())) => {
                    for (o, s) in out.iter_mut().zip(scratch.iter()) {
                        *o += *s;
                    }
                }
                Ok(Err(e)) => log::error!("Mixer track failed, skipping this buffer: {:#}", e),
                Err(_) => log::error!("Mixer track panicked, skipping this buffer"),
            }
        }

        hard_clip(out);
    }
}

impl RenderSource for MixerShared {
    fn render_buffer(&self, out: &mut [f32]) {
        self.mix(out);
    }
}

/// Sums registered tracks into one output line
///
/// Cheap to clone; clones share the same mixer.
#[derive(Clone)]
pub struct AudioMixer {
    shared: Arc<MixerShared>,
}

impl std::fmt::Debug for AudioMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("tracks", &self.tracks_count())
            .field("buffer_frames", &self.shared.buffer_frames)
            .field("priority", &self.shared.priority)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMixer {
    /// Default output device, 8192-frame buffer, maximum priority
    pub fn new() -> Self {
        Self::build(None, MIXER_DEFAULT_BUFFER_FRAMES, ThreadPriority::MAX)
    }

    /// Mixer with an explicit device (None = platform default), buffer size and priority
    pub fn with_device(
        device: Option<Arc<dyn OutputDevice>>,
        buffer_frames: usize,
        priority: ThreadPriority,
    ) -> CueResult<Self> {
        if !(MIN_BUFFER_FRAMES..=MAX_BUFFER_FRAMES).contains(&buffer_frames) {
            return Err(CueError::InvalidArgument(format!(
                "mixer buffer must be {}..={} frames, got {}",
                MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES, buffer_frames
            )));
        }
        Ok(Self::build(device, buffer_frames, priority))
    }

    fn build(
        device: Option<Arc<dyn OutputDevice>>,
        buffer_frames: usize,
        priority: ThreadPriority,
    ) -> Self {
        let handle = gc_handle();
        Self {
            shared: Arc::new(MixerShared {
                staged: Mutex::new(Vec::new()),
                published: SharedCell::new(Shared::new(&handle, Vec::new())),
                scratch: Mutex::new(vec![0.0; buffer_frames * CHANNELS]),
                device,
                buffer_frames,
                priority,
                thread: Mutex::new(None),
            }),
        }
    }

    /// Stage a track; audible after [`update_tracks`](Self::update_tracks)
    pub fn add_track(&self, track: Arc<dyn MixerTrack>) {
        self.shared.staged.lock().push(track);
    }

    /// Unstage a track by identity; takes effect after [`update_tracks`](Self::update_tracks)
    pub fn remove_track(&self, track: &Arc<dyn MixerTrack>) -> bool {
        let mut staged = self.shared.staged.lock();
        let before = staged.len();
        staged.retain(|t| !same_track(t, track));
        before != staged.len()
    }

    /// Publish the staged track list to the renderer
    pub fn update_tracks(&self) {
        let snapshot = self.shared.staged.lock().clone();
        let count = snapshot.len();
        self.shared
            .published
            .set(Shared::new(&gc_handle(), snapshot));
        log::debug!("Mixer published {} track(s)", count);
    }

    /// Publish tracks, acquire the output line and start rendering
    pub fn start(&self) -> CueResult<()> {
        let mut thread = self.shared.thread.lock();
        if thread.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(CueError::AlreadyRunning);
        }
        self.update_tracks();

        let device = match &self.shared.device {
            Some(device) => Arc::clone(device),
            None => audio::default_output_device()?,
        };
        let shared: Arc<dyn RenderSource> = self.shared.clone();
        let source: Weak<dyn RenderSource> = Arc::downgrade(&shared);
        *thread = Some(RenderThread::spawn(
            "cuemix-mixer",
            source,
            device,
            self.shared.buffer_frames,
            self.shared.priority,
        )?);
        log::info!("Mixer started");
        Ok(())
    }

    /// Signal the render thread to drain, close its line and exit
    pub fn stop(&self) -> CueResult<()> {
        match self.shared.thread.lock().take() {
            Some(thread) => {
                thread.stop();
                log::info!("Mixer stopped");
                Ok(())
            }
            None => Err(CueError::AlreadyStopped),
        }
    }

    /// Stop and wait until the output line has been drained and closed
    pub fn close(&self) -> CueResult<()> {
        let thread = self.shared.thread.lock().take();
        match thread {
            Some(thread) => {
                thread.stop_and_join();
                log::info!("Mixer closed");
                Ok(())
            }
            None => Err(CueError::AlreadyStopped),
        }
    }

    /// Whether the render thread is alive; false once it exits on a line error
    pub fn is_running(&self) -> bool {
        self.shared
            .thread
            .lock()
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Number of tracks in the published snapshot
    pub fn tracks_count(&self) -> usize {
        self.shared.published.get().len()
    }

    pub fn buffer_frames(&self) -> usize {
        self.shared.buffer_frames
    }

    pub fn thread_priority(&self) -> ThreadPriority {
        self.shared.priority
    }

    /// Mix one buffer without an output line
    pub fn render(&self, out: &mut [f32]) {
        self.shared.mix(out);
    }

    pub(crate) fn downgrade(&self) -> WeakMixer {
        WeakMixer(Arc::downgrade(&self.shared))
    }
}

/// Non-owning reference to a mixer
#[derive(Clone)]
pub(crate) struct WeakMixer(Weak<MixerShared>);

impl WeakMixer {
    pub fn upgrade(&self) -> Option<AudioMixer> {
        self.0.upgrade().map(|shared| AudioMixer { shared })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemoryOutput;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct ConstTrack {
        value: f32,
        running: AtomicBool,
        reads: AtomicUsize,
    }

    impl ConstTrack {
        fn new(value: f32) -> Arc<Self> {
            Arc::new(Self {
                value,
                running: AtomicBool::new(true),
                reads: AtomicUsize::new(0),
            })
        }
    }

    impl MixerTrack for ConstTrack {
        fn is_track_running(&self) -> bool {
            self.running.load(Ordering::Relaxed)
        }

        fn set_track_running(&self, running: bool) {
            self.running.store(running, Ordering::Relaxed);
        }

        fn read_track(&self, out: &mut [f32]) -> anyhow::Result<()> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            out.fill(self.value);
            Ok(())
        }
    }

    struct FailingTrack;

    impl MixerTrack for FailingTrack {
        fn is_track_running(&self) -> bool {
            true
        }

        fn set_track_running(&self, _running: bool) {}

        fn read_track(&self, _out: &mut [f32]) -> anyhow::Result<()> {
            anyhow::bail!("decoder gave up")
        }
    }

    struct PanickingTrack;

    impl MixerTrack for PanickingTrack {
        fn is_track_running(&self) -> bool {
            true
        }

        fn set_track_running(&self, _running: bool) {}

        fn read_track(&self, _out: &mut [f32]) -> anyhow::Result<()> {
            panic!("track bug")
        }
    }

    fn offline_mixer() -> AudioMixer {
        AudioMixer::with_device(
            Some(Arc::new(MemoryOutput::unpaced("mem"))),
            64,
            ThreadPriority::NORM,
        )
        .unwrap()
    }

    #[test]
    fn test_sum_is_clipped() {
        let mixer = offline_mixer();
        mixer.add_track(ConstTrack::new(0.6));
        mixer.add_track(ConstTrack::new(0.6));
        mixer.update_tracks();

        let mut out = vec![0.0; 128];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 1.0), "sum should clip to 1.0");
    }

    #[test]
    fn test_staged_tracks_are_silent_until_update() {
        let mixer = offline_mixer();
        let track = ConstTrack::new(0.25);
        mixer.add_track(track.clone());

        let mut out = vec![1.0; 128];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(mixer.tracks_count(), 0);

        mixer.update_tracks();
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.25));
        assert_eq!(mixer.tracks_count(), 1);

        let as_dyn: Arc<dyn MixerTrack> = track;
        assert!(mixer.remove_track(&as_dyn));
        assert!(!mixer.remove_track(&as_dyn));
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.25), "removal is staged");
        mixer.update_tracks();
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stopped_track_not_read() {
        let mixer = offline_mixer();
        let track = ConstTrack::new(0.5);
        track.set_track_running(false);
        mixer.add_track(track.clone());
        mixer.update_tracks();

        let mut out = vec![0.0; 128];
        mixer.render(&mut out);
        assert_eq!(track.reads.load(Ordering::Relaxed), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_failing_tracks_are_isolated() {
        let mixer = offline_mixer();
        mixer.add_track(Arc::new(FailingTrack));
        mixer.add_track(ConstTrack::new(0.3));
        mixer.add_track(Arc::new(PanickingTrack));
        mixer.update_tracks();

        let mut out = vec![0.0; 128];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let device = MemoryOutput::new("mem");
        let mixer = AudioMixer::with_device(
            Some(Arc::new(device.clone())),
            64,
            ThreadPriority::NORM,
        )
        .unwrap();
        mixer.add_track(ConstTrack::new(0.5));

        mixer.start().unwrap();
        assert!(mixer.is_running());
        assert_eq!(mixer.tracks_count(), 1, "start publishes staged tracks");
        assert!(matches!(mixer.start(), Err(CueError::AlreadyRunning)));

        let deadline = Instant::now() + Duration::from_secs(5);
        while device.captured_len() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(device.captured_len() > 0);

        mixer.stop().unwrap();
        assert!(!mixer.is_running());
        assert!(matches!(mixer.stop(), Err(CueError::AlreadyStopped)));
        assert!(matches!(mixer.close(), Err(CueError::AlreadyStopped)));

        let deadline = Instant::now() + Duration::from_secs(5);
        while device.lines_closed() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(device.lines_closed(), 1);
    }

    #[test]
    fn test_close_waits_for_line() {
        let device = MemoryOutput::new("mem");
        let mixer = AudioMixer::with_device(
            Some(Arc::new(device.clone())),
            64,
            ThreadPriority::NORM,
        )
        .unwrap();
        mixer.add_track(ConstTrack::new(0.5));
        mixer.start().unwrap();

        mixer.close().unwrap();
        assert_eq!(device.lines_opened(), 1);
        assert_eq!(device.lines_closed(), 1, "close returns after the line is closed");
        assert!(!mixer.is_running());
        assert!(matches!(mixer.close(), Err(CueError::AlreadyStopped)));
    }

    #[test]
    fn test_start_fails_when_device_unavailable() {
        let device = MemoryOutput::new("gone");
        device.set_unavailable(true);
        let mixer =
            AudioMixer::with_device(Some(Arc::new(device)), 64, ThreadPriority::NORM).unwrap();
        assert!(matches!(mixer.start(), Err(CueError::DeviceUnavailable(_))));
        assert!(!mixer.is_running());
    }

    #[test]
    fn test_buffer_size_validated() {
        assert!(AudioMixer::with_device(None, 0, ThreadPriority::MAX).is_err());
        let mixer = AudioMixer::new();
        assert_eq!(mixer.buffer_frames(), 8192);
        assert_eq!(mixer.thread_priority(), ThreadPriority::MAX);
    }
}
