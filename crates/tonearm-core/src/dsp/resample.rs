//! Streaming stereo sample-rate conversion using rubato
//!
//! Decoders hand over packets of arbitrary length; the resampler buffers them
//! into the fixed input chunks rubato wants, trims the filter delay from the
//! front and the padding from the tail, so the output lines up sample for
//! sample with the source timeline.

use rubato::{FftFixedIn, ResampleError, Resampler, ResamplerConstructionError};
use thiserror::Error;

use crate::types::StereoSample;

/// Input frames per rubato call
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per chunk (balanced quality/speed)
const SUB_CHUNKS: usize = 2;

/// Upper bound on flush iterations when draining the filter tail
const MAX_FLUSH_PASSES: usize = 8;

#[derive(Error, Debug)]
pub enum ResamplerError {
    #[error("Failed to create resampler: {0}")]
    Construction(#[from] ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Process(#[from] ResampleError),
}

pub struct StereoResampler {
    /// `None` when source and target rates match
    inner: Option<FftFixedIn<f32>>,
    source_rate: u32,
    target_rate: u32,
    pending: [Vec<f32>; 2],
    delay_remaining: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StereoResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, ResamplerError> {
        let inner = if source_rate == target_rate {
            None
        } else {
            Some(FftFixedIn::<f32>::new(
                source_rate as usize,
                target_rate as usize,
                CHUNK_SIZE,
                SUB_CHUNKS,
                2,
            )?)
        };
        let delay_remaining = inner.as_ref().map(|r| r.output_delay()).unwrap_or(0);

        Ok(Self {
            inner,
            source_rate,
            target_rate,
            pending: [Vec::with_capacity(CHUNK_SIZE * 2), Vec::with_capacity(CHUNK_SIZE * 2)],
            delay_remaining,
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Feed source frames, appending whatever output is ready to `out`
    pub fn push(
        &mut self,
        frames: &[StereoSample],
        out: &mut Vec<StereoSample>,
    ) -> Result<(), ResamplerError> {
        self.frames_in += frames.len() as u64;

        let Some(resampler) = self.inner.as_mut() else {
            out.extend_from_slice(frames);
            self.frames_out += frames.len() as u64;
            return Ok(());
        };

        for frame in frames {
            self.pending[0].push(frame.left);
            self.pending[1].push(frame.right);
        }

        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk = [&self.pending[0][..needed], &self.pending[1][..needed]];
            let wave = resampler.process(&chunk[..], None)?;
            Self::emit(&wave, &mut self.delay_remaining, &mut self.frames_out, None, out);
            self.pending[0].drain(..needed);
            self.pending[1].drain(..needed);
        }
        Ok(())
    }

    /// Drain buffered input and the filter tail at end of stream
    pub fn finish(&mut self, out: &mut Vec<StereoSample>) -> Result<(), ResamplerError> {
        let expected = self.expected_output_frames();
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(());
        };

        if !self.pending[0].is_empty() {
            let chunk = [&self.pending[0][..], &self.pending[1][..]];
            let wave = resampler.process_partial(Some(&chunk[..]), None)?;
            Self::emit(&wave, &mut self.delay_remaining, &mut self.frames_out, Some(expected), out);
            self.pending[0].clear();
            self.pending[1].clear();
        }

        let mut passes = 0;
        while self.frames_out < expected && passes < MAX_FLUSH_PASSES {
            let wave = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
            Self::emit(&wave, &mut self.delay_remaining, &mut self.frames_out, Some(expected), out);
            passes += 1;
        }
        Ok(())
    }

    /// Forget all history, e.g. after a seek
    pub fn reset(&mut self) {
        self.pending[0].clear();
        self.pending[1].clear();
        self.frames_in = 0;
        self.frames_out = 0;
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
            self.delay_remaining = resampler.output_delay();
        }
    }

    fn expected_output_frames(&self) -> u64 {
        (self.frames_in as f64 * self.target_rate as f64 / self.source_rate as f64).ceil() as u64
    }

    fn emit(
        wave: &[Vec<f32>],
        delay_remaining: &mut usize,
        frames_out: &mut u64,
        limit: Option<u64>,
        out: &mut Vec<StereoSample>,
    ) {
        let (left, right) = match wave {
            [left, right, ..] => (left, right),
            _ => return,
        };

        let skip = (*delay_remaining).min(left.len());
        *delay_remaining -= skip;

        for (&l, &r) in left[skip..].iter().zip(&right[skip..]) {
            if limit.is_some_and(|limit| *frames_out >= limit) {
                break;
            }
            out.push(StereoSample::new(l, r));
            *frames_out += 1;
        }
    }
}

/// Resample a whole stereo signal in one go
pub fn resample_all(
    frames: &[StereoSample],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<StereoSample>, ResamplerError> {
    let mut resampler = StereoResampler::new(source_rate, target_rate)?;
    let expected = (frames.len() as f64 * target_rate as f64 / source_rate as f64).ceil() as usize;
    let mut out = Vec::with_capacity(expected + CHUNK_SIZE);
    resampler.push(frames, &mut out)?;
    resampler.finish(&mut out)?;
    Ok(out)
}
