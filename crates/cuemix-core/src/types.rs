//! Common types for Cuemix
//!
//! The fixed audio format, the stereo frame type shared by the PCM store and
//! the render path, and the default sizes used across the engine.

/// Sample rate of every cue and output line ("CD quality")
pub const SAMPLE_RATE: u32 = 44100;

/// Interleaved channels per frame
pub const CHANNELS: usize = 2;

/// Bytes per 16-bit sample on the output line
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes per stereo frame on the output line
pub const BYTES_PER_FRAME: usize = CHANNELS * BYTES_PER_SAMPLE;

/// Render buffer of a cue that drives its own output line (frames)
pub const DEFAULT_BUFFER_FRAMES: usize = 1024;

/// Render buffer of a mixer (frames)
pub const MIXER_DEFAULT_BUFFER_FRAMES: usize = 8192;

/// Frames over which a volume change is spread
pub const VOLUME_STEPS: u32 = 1024;

/// Frames over which a pan change is spread
pub const PAN_STEPS: u32 = 1024;

/// Frames over which a speed change is spread
pub const SPEED_STEPS: u32 = 4096;

/// Audio sample type (32-bit float while rendering, 16-bit on the line)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// `#[repr(C)]` keeps the layout `[left, right]` so a `&[StereoSample]` can be
/// viewed as interleaved `&[f32]` through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Linear blend between `self` (weight `1 - t`) and `other` (weight `t`)
    #[inline]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let a = 1.0 - t;
        Self {
            left: (self.left as f64 * a + other.left as f64 * t) as Sample,
            right: (self.right as f64 * a + other.right as f64 * t) as Sample,
        }
    }
}

/// View a stereo frame slice as interleaved samples
#[inline]
pub fn as_interleaved(frames: &[StereoSample]) -> &[Sample] {
    bytemuck::cast_slice(frames)
}

/// Hard-clip every sample into [-1, 1]
#[inline]
pub fn hard_clip(buffer: &mut [Sample]) {
    for s in buffer.iter_mut() {
        *s = s.clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_view() {
        let frames = [StereoSample::new(0.1, 0.2), StereoSample::new(0.3, 0.4)];
        assert_eq!(as_interleaved(&frames), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_lerp_midpoint() {
        let a = StereoSample::new(0.2, -0.4);
        let b = StereoSample::new(0.4, 0.0);
        let mid = a.lerp(&b, 0.5);
        assert!((mid.left - 0.3).abs() < 1e-6);
        assert!((mid.right + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_hard_clip() {
        let mut buf = [1.2, -1.5, 0.5, -0.25];
        hard_clip(&mut buf);
        assert_eq!(buf, [1.0, -1.0, 0.5, -0.25]);
    }
}
