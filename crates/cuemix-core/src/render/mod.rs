//! Render host
//!
//! One loop serves both a cue that owns its output and a mixer:
//! fill a float buffer, encode it to 16-bit LE bytes, block in the line's
//! write, repeat until told to stop. The output line is opened on the render
//! thread itself and never leaves it; the open result is sent back so device
//! failures surface synchronously to whoever asked for the thread.

mod priority;

pub use priority::{apply_thread_priority, PriorityResult, ThreadPriority};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::audio::{AudioError, OutputDevice, OutputLine};
use crate::error::{CueError, CueResult};
use crate::pcm::encode_le16;
use crate::types::{BYTES_PER_FRAME, CHANNELS};

/// Something that produces interleaved stereo float buffers
pub trait RenderSource: Send + Sync + 'static {
    /// Overwrite `out` with the next buffer
    fn render_buffer(&self, out: &mut [f32]);
}

/// Handle to a running render thread
///
/// Stopping is eventual: the thread notices at the top of its next iteration,
/// then drains and closes its line. Dropping the handle stops the thread too.
#[derive(Debug)]
pub struct RenderThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    buffer_frames: usize,
    priority: ThreadPriority,
}

impl RenderThread {
    /// Spawn a thread that renders `source` into a line opened on `device`
    ///
    /// The thread holds only a weak reference to the source and exits once
    /// the source is gone.
    pub fn spawn(
        name: &str,
        source: Weak<dyn RenderSource>,
        device: Arc<dyn OutputDevice>,
        buffer_frames: usize,
        priority: ThreadPriority,
    ) -> CueResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, AudioError>>();

        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                apply_thread_priority(priority);

                let mut line = match device.open_line(buffer_frames) {
                    Ok(line) => {
                        let _ = ready_tx.send(Ok(device.name()));
                        line
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                drop(ready_tx);

                run_render_loop(&source, line.as_mut(), buffer_frames, &thread_stop);
            })?;

        match ready_rx.recv() {
            Ok(Ok(device_name)) => {
                log::info!(
                    "Render thread '{}' started on {} ({} frames, priority {})",
                    name,
                    device_name,
                    buffer_frames,
                    priority
                );
                Ok(Self {
                    stop,
                    handle: Some(handle),
                    buffer_frames,
                    priority,
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(CueError::DeviceUnavailable(e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(CueError::DeviceUnavailable(AudioError::StreamError(
                    "render thread exited before opening its line".to_string(),
                )))
            }
        }
    }

    /// Ask the thread to finish; does not wait
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop and wait for the line to be drained and closed
    ///
    /// Called from the render thread itself (a listener reacting to an
    /// event), this only signals.
    pub fn stop_and_join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Render thread panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    pub fn priority(&self) -> ThreadPriority {
        self.priority
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_render_loop(
    source: &Weak<dyn RenderSource>,
    line: &mut dyn OutputLine,
    buffer_frames: usize,
    stop: &AtomicBool,
) {
    let mut samples = vec![0.0f32; buffer_frames * CHANNELS];
    let mut bytes = vec![0u8; buffer_frames * BYTES_PER_FRAME];

    while !stop.load(Ordering::Acquire) {
        let Some(source) = source.upgrade() else {
            log::debug!("Render source dropped, leaving render loop");
            break;
        };
        source.render_buffer(&mut samples);
        drop(source);

        if let Err(e) = encode_le16(&samples, &mut bytes) {
            log::error!("Encoding render buffer failed: {}", e);
            break;
        }
        if let Err(e) = line.write(&bytes) {
            log::error!("Output line write failed: {}", e);
            break;
        }
    }

    line.drain();
    line.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemoryOutput;
    use std::time::{Duration, Instant};

    struct Constant(f32);

    impl RenderSource for Constant {
        fn render_buffer(&self, out: &mut [f32]) {
            out.fill(self.0);
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_thread_writes_encoded_buffers() {
        let device = MemoryOutput::new("mem");
        let source: Arc<dyn RenderSource> = Arc::new(Constant(0.5));
        let thread = RenderThread::spawn(
            "test-render",
            Arc::downgrade(&source),
            Arc::new(device.clone()),
            64,
            ThreadPriority::NORM,
        )
        .unwrap();

        assert!(wait_for(|| device.captured_len() >= 64 * BYTES_PER_FRAME));
        thread.stop_and_join();
        assert_eq!(device.lines_closed(), 1);

        let bytes = device.captured();
        assert_eq!(bytes.len() % (64 * BYTES_PER_FRAME), 0);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 16383);
    }

    #[test]
    fn test_unavailable_device_reported_synchronously() {
        let device = MemoryOutput::new("gone");
        device.set_unavailable(true);
        let source: Arc<dyn RenderSource> = Arc::new(Constant(0.0));
        let result = RenderThread::spawn(
            "test-render",
            Arc::downgrade(&source),
            Arc::new(device),
            64,
            ThreadPriority::NORM,
        );
        assert!(matches!(result, Err(CueError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_thread_exits_when_source_dropped() {
        let device = MemoryOutput::new("mem");
        let source: Arc<dyn RenderSource> = Arc::new(Constant(0.0));
        let thread = RenderThread::spawn(
            "test-render",
            Arc::downgrade(&source),
            Arc::new(device.clone()),
            64,
            ThreadPriority::NORM,
        )
        .unwrap();

        drop(source);
        assert!(wait_for(|| thread.is_finished()));
        assert_eq!(device.lines_closed(), 1);
    }
}
