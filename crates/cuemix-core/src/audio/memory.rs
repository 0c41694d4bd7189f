//! In-memory output device
//!
//! Captures everything written to its lines. Useful for offline rendering and
//! for exercising render threads without audio hardware. Writes are paced at
//! the real-time rate unless the device is created with [`MemoryOutput::unpaced`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::error::{AudioError, AudioResult};
use super::line::{OutputDevice, OutputLine};
use crate::types::{BYTES_PER_FRAME, SAMPLE_RATE};

#[derive(Debug)]
struct MemoryShared {
    name: String,
    paced: bool,
    captured: Mutex<Vec<u8>>,
    unavailable: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Output device that records written bytes
#[derive(Debug, Clone)]
pub struct MemoryOutput {
    shared: Arc<MemoryShared>,
}

impl MemoryOutput {
    /// Writes take as long as the audio they carry
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_pacing(name.into(), true)
    }

    /// Writes return immediately
    pub fn unpaced(name: impl Into<String>) -> Self {
        Self::with_pacing(name.into(), false)
    }

    fn with_pacing(name: String, paced: bool) -> Self {
        Self {
            shared: Arc::new(MemoryShared {
                name,
                paced,
                captured: Mutex::new(Vec::new()),
                unavailable: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    /// Make subsequent `open_line` calls fail as if the device were gone
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Copy of every byte written so far
    pub fn captured(&self) -> Vec<u8> {
        self.shared.captured.lock().clone()
    }

    pub fn captured_len(&self) -> usize {
        self.shared.captured.lock().len()
    }

    pub fn lines_opened(&self) -> usize {
        self.shared.opened.load(Ordering::Acquire)
    }

    pub fn lines_closed(&self) -> usize {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl OutputDevice for MemoryOutput {
    fn name(&self) -> String {
        self.shared.name.clone()
    }

    fn open_line(&self, buffer_frames: usize) -> AudioResult<Box<dyn OutputLine>> {
        if self.shared.unavailable.load(Ordering::Relaxed) {
            return Err(AudioError::DeviceNotFound(self.shared.name.clone()));
        }
        self.shared.opened.fetch_add(1, Ordering::AcqRel);
        log::debug!(
            "Opened memory line '{}' ({} frames)",
            self.shared.name,
            buffer_frames
        );
        Ok(Box::new(MemoryLine {
            shared: Arc::clone(&self.shared),
            open: true,
        }))
    }
}

struct MemoryLine {
    shared: Arc<MemoryShared>,
    open: bool,
}

impl OutputLine for MemoryLine {
    fn write(&mut self, bytes: &[u8]) -> AudioResult<usize> {
        if !self.open {
            return Err(AudioError::LineClosed);
        }
        self.shared.captured.lock().extend_from_slice(bytes);
        if self.shared.paced {
            let frames = bytes.len() / BYTES_PER_FRAME;
            thread::sleep(Duration::from_secs_f64(frames as f64 / SAMPLE_RATE as f64));
        }
        Ok(bytes.len())
    }

    fn drain(&mut self) {}

    fn close(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.shared.closed.fetch_add(1, Ordering::AcqRel);
            log::debug!("Closed memory line '{}'", self.shared.name);
        }
    }
}

impl Drop for MemoryLine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_close() {
        let device = MemoryOutput::unpaced("mem");
        let mut line = device.open_line(16).unwrap();
        line.write(&[1, 2, 3, 4]).unwrap();
        line.write(&[5, 6, 7, 8]).unwrap();
        assert_eq!(device.captured(), vec![1, 2, 3, 4, 5, 6, 7, 8]);

        line.close();
        line.close();
        assert_eq!(device.lines_opened(), 1);
        assert_eq!(device.lines_closed(), 1);
        assert!(matches!(line.write(&[0; 4]), Err(AudioError::LineClosed)));
    }

    #[test]
    fn test_unavailable_device() {
        let device = MemoryOutput::unpaced("gone");
        device.set_unavailable(true);
        assert!(device.open_line(16).is_err());
        device.set_unavailable(false);
        assert!(device.open_line(16).is_ok());
    }

    #[test]
    fn test_drop_closes_line() {
        let device = MemoryOutput::unpaced("mem");
        drop(device.open_line(16).unwrap());
        assert_eq!(device.lines_closed(), 1);
    }
}
