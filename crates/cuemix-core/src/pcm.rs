//! PCM store
//!
//! Immutable stereo float PCM shared by every playback instance of a cue,
//! plus loading from 16-bit WAV and encoding back to 16-bit line bytes.
//!
//! Only one format is accepted: 44100 Hz, 2 channels, signed 16-bit
//! little-endian integer PCM. Anything else is rejected up front.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CueError, CueResult};
use crate::types::{Sample, StereoSample, BYTES_PER_SAMPLE, CHANNELS, SAMPLE_RATE};

/// Longest cue that can be loaded, in frames
pub const MAX_FRAMES: usize = (i32::MAX >> 1) as usize;

/// Scale between normalized float and 16-bit integer samples
const I16_SCALE: f32 = 32767.0;

/// Read-only stereo PCM, cheap to clone
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    frames: Arc<[StereoSample]>,
}

impl PcmBuffer {
    /// Build from interleaved stereo samples (`[l0, r0, l1, r1, ...]`)
    ///
    /// Fails on an odd sample count or an empty buffer.
    pub fn from_interleaved(samples: Vec<Sample>) -> CueResult<Self> {
        if samples.len() % CHANNELS != 0 {
            return Err(CueError::UnsupportedFormat(format!(
                "interleaved stereo PCM needs an even sample count, got {}",
                samples.len()
            )));
        }
        if samples.is_empty() {
            return Err(CueError::UnsupportedFormat("PCM contains no frames".into()));
        }
        let frames: &[StereoSample] = bytemuck::cast_slice(&samples);
        Ok(Self {
            frames: Arc::from(frames),
        })
    }

    /// Decode a WAV stream
    pub fn from_wav_reader<R: Read>(reader: R) -> CueResult<Self> {
        let mut wav = hound::WavReader::new(reader)?;
        let spec = wav.spec();

        if spec.channels as usize != CHANNELS
            || spec.bits_per_sample != 16
            || spec.sample_rate != SAMPLE_RATE
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(CueError::UnsupportedFormat(format!(
                "expected {} Hz stereo 16-bit PCM, got {} Hz, {} channel(s), {}-bit {:?}",
                SAMPLE_RATE,
                spec.sample_rate,
                spec.channels,
                spec.bits_per_sample,
                spec.sample_format
            )));
        }

        let mut frame_count = wav.duration() as usize;
        if frame_count > MAX_FRAMES {
            log::warn!(
                "WAV has {} frames, truncating to {} frames",
                frame_count,
                MAX_FRAMES
            );
            frame_count = MAX_FRAMES;
        }

        let mut samples = Vec::with_capacity(frame_count * CHANNELS);
        for sample in wav.samples::<i16>().take(frame_count * CHANNELS) {
            samples.push(sample? as Sample / I16_SCALE);
        }
        // A short final frame means a truncated data chunk
        samples.truncate(samples.len() - samples.len() % CHANNELS);

        log::debug!("Decoded {} frames of WAV PCM", samples.len() / CHANNELS);
        Self::from_interleaved(samples)
    }

    /// Decode a WAV file held in memory
    pub fn from_wav_bytes(bytes: &[u8]) -> CueResult<Self> {
        Self::from_wav_reader(std::io::Cursor::new(bytes))
    }

    /// Decode a WAV file from disk
    pub fn from_wav_path(path: &Path) -> CueResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_wav_reader(std::io::BufReader::new(file))
    }

    #[inline]
    pub fn frame_length(&self) -> usize {
        self.frames.len()
    }

    /// Duration in microseconds
    pub fn microsecond_length(&self) -> u64 {
        self.frames.len() as u64 * 1_000_000 / SAMPLE_RATE as u64
    }

    #[inline]
    pub fn frames(&self) -> &[StereoSample] {
        &self.frames
    }

    #[inline]
    pub fn frame(&self, index: usize) -> StereoSample {
        self.frames[index]
    }

    /// Copy of the PCM as interleaved samples
    pub fn to_interleaved(&self) -> Vec<Sample> {
        crate::types::as_interleaved(&self.frames).to_vec()
    }
}

/// Convert normalized float samples to signed 16-bit little-endian bytes
///
/// `dst` must hold exactly two bytes per source sample. Values are scaled by
/// 32767 and truncated toward zero; out-of-range input saturates.
pub fn encode_le16(src: &[Sample], dst: &mut [u8]) -> CueResult<()> {
    if dst.len() != src.len() * BYTES_PER_SAMPLE {
        return Err(CueError::InvalidArgument(format!(
            "byte buffer holds {} bytes, {} samples need {}",
            dst.len(),
            src.len(),
            src.len() * BYTES_PER_SAMPLE
        )));
    }
    for (sample, out) in src.iter().zip(dst.chunks_exact_mut(BYTES_PER_SAMPLE)) {
        let value = (sample * I16_SCALE) as i16;
        out.copy_from_slice(&value.to_le_bytes());
    }
    Ok(())
}
