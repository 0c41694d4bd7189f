//! CPAL output backend
//!
//! The render thread writes 16-bit LE bytes into a [`CpalLine`]; the bytes are
//! decoded into an `rtrb` ring that the device callback pops one frame at a
//! time. A full ring makes `write` wait, which paces the render thread at
//! the device's real-time rate.
//!
//! ```text
//! ┌──────────────────┐  write() blocks  ┌──────────────┐  pop()  ┌────────────────┐
//! │  Render Thread   │─────────────────►│  i16 ring    │────────►│ CPAL callback  │
//! │  (owns CpalLine) │   while full     │ (SPSC, rtrb) │         │ F32 / I16 / U16│
//! └──────────────────┘                  └──────────────┘         └────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, Sample, SampleFormat, SizedSample, Stream, StreamConfig};

use super::config::DeviceId;
use super::device::{covers_cue_format, find_device_by_id, get_cpal_default_device};
use super::error::{AudioError, AudioResult};
use super::line::{OutputDevice, OutputLine};
use crate::types::{CHANNELS, SAMPLE_RATE};

/// Ring capacity in render buffers
const RING_BUFFERS: usize = 2;

/// A cpal output device, resolved when a line is opened
#[derive(Debug, Clone)]
pub struct CpalOutput {
    id: Option<DeviceId>,
}

impl CpalOutput {
    /// The default output of the default host
    pub fn default_device() -> Self {
        Self { id: None }
    }

    /// A specific device
    pub fn find(id: DeviceId) -> Self {
        Self { id: Some(id) }
    }
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> String {
        match &self.id {
            Some(id) => id.display_label(),
            None => "default output".to_string(),
        }
    }

    fn open_line(&self, buffer_frames: usize) -> AudioResult<Box<dyn OutputLine>> {
        let device = match &self.id {
            Some(id) => find_device_by_id(id)?,
            None => get_cpal_default_device()?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = get_output_config(&device)?;
        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: CpalBufferSize::Default,
        };

        let capacity = buffer_frames * CHANNELS * RING_BUFFERS;
        let (producer, consumer) = rtrb::RingBuffer::<i16>::new(capacity);
        let failed = Arc::new(AtomicBool::new(false));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output_stream::<f32>(
                &device,
                &stream_config,
                consumer,
                |s| s as f32 / 32767.0,
                Arc::clone(&failed),
            )?,
            SampleFormat::I16 => build_output_stream::<i16>(
                &device,
                &stream_config,
                consumer,
                |s| s,
                Arc::clone(&failed),
            )?,
            SampleFormat::U16 => build_output_stream::<u16>(
                &device,
                &stream_config,
                consumer,
                |s| (s as i32 + 32768) as u16,
                Arc::clone(&failed),
            )?,
            other => {
                return Err(AudioError::UnsupportedFormat(format!(
                    "device sample format {:?}",
                    other
                )))
            }
        };
        stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

        let latency_ms = buffer_frames as f32 / SAMPLE_RATE as f32 * 1000.0;
        log::info!(
            "Opened output line on {}: {} channels, {}Hz, {:?}, {} frames (~{:.1}ms)",
            device_name,
            stream_config.channels,
            SAMPLE_RATE,
            supported.sample_format(),
            buffer_frames,
            latency_ms
        );

        let wait = Duration::from_secs_f64(buffer_frames as f64 / SAMPLE_RATE as f64 / 8.0)
            .max(Duration::from_millis(1));

        Ok(Box::new(CpalLine {
            stream: Some(stream),
            producer,
            failed,
            wait,
            device_name,
        }))
    }
}

/// Pick a 44100 Hz config with at least two channels, preferring f32
fn get_output_config(device: &cpal::Device) -> AudioResult<cpal::SupportedStreamConfig> {
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .filter(covers_cue_format)
        .collect();

    let preference = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];
    let best = preference
        .iter()
        .find_map(|format| ranges.iter().find(|r| r.sample_format() == *format))
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!(
                "no {}Hz stereo f32/i16/u16 output configuration",
                SAMPLE_RATE
            ))
        })?;

    Ok(best.clone().with_sample_rate(cpal::SampleRate(SAMPLE_RATE)))
}

/// Build a stream whose callback pops interleaved i16 frames from the ring
fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: rtrb::Consumer<i16>,
    convert: fn(i16) -> T,
    failed: Arc<AtomicBool>,
) -> AudioResult<Stream>
where
    T: SizedSample + Send + 'static,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    if consumer.slots() >= CHANNELS {
                        let left = consumer.pop().unwrap_or(0);
                        let right = consumer.pop().unwrap_or(0);
                        frame[0] = convert(left);
                        if channels > 1 {
                            frame[1] = convert(right);
                        }
                        for ch in frame.iter_mut().skip(CHANNELS) {
                            *ch = T::EQUILIBRIUM;
                        }
                    } else {
                        // Underrun
                        for ch in frame.iter_mut() {
                            *ch = T::EQUILIBRIUM;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Output stream error: {}", err);
                failed.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Line backed by a playing cpal stream
pub struct CpalLine {
    stream: Option<Stream>,
    producer: rtrb::Producer<i16>,
    failed: Arc<AtomicBool>,
    wait: Duration,
    device_name: String,
}

impl CpalLine {
    fn check_stream(&self) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::LineClosed);
        }
        if self.failed.load(Ordering::Relaxed) {
            return Err(AudioError::StreamError(format!(
                "stream on {} stopped",
                self.device_name
            )));
        }
        Ok(())
    }
}

impl OutputLine for CpalLine {
    fn write(&mut self, bytes: &[u8]) -> AudioResult<usize> {
        let mut samples = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]));
        let mut left = bytes.len() / 2;

        while left > 0 {
            self.check_stream()?;
            let free = self.producer.slots();
            if free == 0 {
                thread::sleep(self.wait);
                continue;
            }
            match self.producer.write_chunk_uninit(free.min(left)) {
                Ok(chunk) => left -= chunk.fill_from_iter(&mut samples),
                Err(_) => thread::sleep(self.wait),
            }
        }
        Ok(bytes.len())
    }

    fn drain(&mut self) {
        let capacity = self.producer.buffer().capacity();
        while self.check_stream().is_ok() && self.producer.slots() < capacity {
            thread::sleep(self.wait);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("Pausing stream on {} failed: {}", self.device_name, e);
            }
            drop(stream);
            log::info!("Closed output line on {}", self.device_name);
        }
    }
}

impl Drop for CpalLine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_default_line() {
        // Only meaningful with audio hardware; tolerate its absence
        match CpalOutput::default_device().open_line(1024) {
            Ok(mut line) => {
                let silence = vec![0u8; 1024 * 4];
                assert_eq!(line.write(&silence).unwrap(), silence.len());
                line.close();
                assert!(matches!(line.write(&silence), Err(AudioError::LineClosed)));
            }
            Err(e) => println!("No usable output device: {}", e),
        }
    }

    #[test]
    fn test_device_name() {
        assert_eq!(CpalOutput::default_device().name(), "default output");
        let named = CpalOutput::find(DeviceId::with_host("hw:1", "ALSA"));
        assert_eq!(named.name(), "[ALSA] hw:1");
    }
}
