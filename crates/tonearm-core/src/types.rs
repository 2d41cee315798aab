//! Frame and buffer types shared by every stage of the engine

use std::ops::{Add, AddAssign, Deref, DerefMut, Mul, MulAssign};

/// Context rate used when no device rate is known
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Frames rendered per graph step
///
/// Commands, parameter targets and the context clock all move in whole quanta.
pub const RENDER_QUANTUM: usize = 128;

pub type Sample = f32;

/// One stereo frame
///
/// `#[repr(C)]` keeps the layout `[left, right]` so a frame slice can be cast
/// to interleaved `f32` with bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub const fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn silence() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Same value on both channels
    #[inline]
    pub const fn mono(value: Sample) -> Self {
        Self::new(value, value)
    }

    /// Larger absolute value of the two channels
    #[inline]
    pub fn peak(&self) -> Sample {
        f32::max(self.left.abs(), self.right.abs())
    }
}

impl Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, gain: Sample) -> Self {
        Self::new(self.left * gain, self.right * gain)
    }
}

impl MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, gain: Sample) {
        *self = *self * gain;
    }
}

/// Owned run of stereo frames: decoded tracks and offline renders
///
/// Derefs to `[StereoSample]`, so slicing, indexing and iteration come from
/// the slice API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer(Vec<StereoSample>);

impl StereoBuffer {
    pub fn silence(frames: usize) -> Self {
        Self(vec![StereoSample::silence(); frames])
    }

    pub fn from_vec(frames: Vec<StereoSample>) -> Self {
        Self(frames)
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.0
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.0
    }

    /// `[L, R, L, R, ...]` view without copying
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.0)
    }

    /// Highest absolute sample value over all frames
    pub fn peak(&self) -> Sample {
        self.0.iter().fold(0.0, |acc, frame| acc.max(frame.peak()))
    }
}

impl Deref for StereoBuffer {
    type Target = [StereoSample];

    #[inline]
    fn deref(&self) -> &[StereoSample] {
        &self.0
    }
}

impl DerefMut for StereoBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [StereoSample] {
        &mut self.0
    }
}

impl From<Vec<StereoSample>> for StereoBuffer {
    fn from(frames: Vec<StereoSample>) -> Self {
        Self(frames)
    }
}

/// Whole frames covering `seconds`; negative input maps to zero
#[inline]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    (seconds.max(0.0) * f64::from(sample_rate)).round() as u64
}

#[inline]
pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    frames as f64 / f64::from(sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_arithmetic() {
        let mut frame = StereoSample::new(1.0, -2.0) + StereoSample::mono(0.5);
        assert_eq!(frame, StereoSample::new(1.5, -1.5));
        frame *= 2.0;
        assert_eq!(frame, StereoSample::new(3.0, -3.0));
        assert_eq!(frame.peak(), 3.0);
    }

    #[test]
    fn test_buffer_views() {
        let mut buffer = StereoBuffer::from_vec(vec![
            StereoSample::new(1.0, 2.0),
            StereoSample::new(3.0, -4.0),
        ]);
        assert_eq!(buffer.as_interleaved(), &[1.0, 2.0, 3.0, -4.0]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.peak(), 4.0);

        buffer[0] = StereoSample::silence();
        assert_eq!(buffer.as_slice()[0], StereoSample::silence());
        assert_eq!(StereoBuffer::default().peak(), 0.0);
    }

    #[test]
    fn test_frame_conversions() {
        assert_eq!(seconds_to_frames(1.5, 48000), 72000);
        assert_eq!(seconds_to_frames(-1.0, 48000), 0);
        assert!((frames_to_seconds(24000, 48000) - 0.5).abs() < f64::EPSILON);
    }
}
