//! Uniformly partitioned FFT convolution
//!
//! The impulse response is cut into partitions of `PARTITION_SIZE` frames and
//! transformed once into a [`ConvolverKernel`]. Each render block is then
//! convolved with overlap-save against a frequency-domain delay line, so the
//! cost per block is one forward FFT, one inverse FFT and a complex
//! multiply-accumulate over the partitions, with no added latency.
//!
//! ```text
//!  input block ──► [prev | cur] ──FFT──► X_k ──► delay line X_k, X_k-1, ...
//!                                                   │
//!                              Σ_p H_p · X_k-p ◄────┘
//!                                     │
//!                                   IFFT ──► last half = output block
//! ```

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::types::{StereoSample, RENDER_QUANTUM};

/// Frames per partition (one render quantum)
pub const PARTITION_SIZE: usize = RENDER_QUANTUM;

/// FFT length for overlap-save with 50% overlap
const FFT_SIZE: usize = PARTITION_SIZE * 2;

/// Number of complex bins produced by a real FFT of `FFT_SIZE`
const SPECTRUM_LEN: usize = FFT_SIZE / 2 + 1;

/// Output level calibration applied by normalization (-58 dB)
const GAIN_CALIBRATION: f32 = 0.00125;

/// Sample rate the calibration is referenced to
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;

/// RMS floor so a near-silent response cannot blow up the scale
const MIN_POWER: f32 = 0.000125;

/// Scale factor that brings an impulse response to the calibrated loudness
///
/// Matches the default `normalize` behavior of browser convolvers so reverb
/// tails of different lengths and intensities land at comparable levels.
pub fn normalization_scale(channels: &[&[f32]], sample_rate: u32) -> f32 {
    let total: usize = channels.iter().map(|c| c.len()).sum();
    if total == 0 {
        return 1.0;
    }

    let power: f64 = channels
        .iter()
        .flat_map(|c| c.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    let mut rms = (power / total as f64).sqrt() as f32;
    if !rms.is_finite() || rms < MIN_POWER {
        rms = MIN_POWER;
    }

    let mut scale = GAIN_CALIBRATION / rms;
    scale *= GAIN_CALIBRATION_SAMPLE_RATE / sample_rate as f32;
    scale
}

/// Frequency-domain partitions of one impulse response channel
#[derive(Debug, Clone)]
struct ChannelKernel {
    partitions: Vec<Vec<Complex<f32>>>,
}

/// Pre-transformed stereo impulse response, ready for real-time convolution
///
/// Building a kernel runs one FFT per partition, so it is done on the control
/// thread and shared with the render path afterwards.
#[derive(Debug, Clone)]
pub struct ConvolverKernel {
    channels: [ChannelKernel; 2],
    length: usize,
}

impl ConvolverKernel {
    /// Transform a stereo impulse response
    ///
    /// `scale` is applied to every tap (pass the normalization scale, or 1.0).
    pub fn new(left: &[f32], right: &[f32], scale: f32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let mut scratch = fft.make_scratch_vec();
        let mut frame = vec![0.0f32; FFT_SIZE];

        // Inverse transforms are unnormalized, fold 1/N into the kernel
        let gain = scale / FFT_SIZE as f32;

        let mut transform = |taps: &[f32]| -> ChannelKernel {
            let partitions = taps
                .chunks(PARTITION_SIZE)
                .map(|chunk| {
                    frame.fill(0.0);
                    for (dst, &src) in frame.iter_mut().zip(chunk) {
                        *dst = src * gain;
                    }
                    let mut spectrum = fft.make_output_vec();
                    // Lengths come from the plan itself, so this cannot fail
                    if fft
                        .process_with_scratch(&mut frame, &mut spectrum, &mut scratch)
                        .is_err()
                    {
                        spectrum.fill(Complex::new(0.0, 0.0));
                    }
                    spectrum
                })
                .collect();
            ChannelKernel { partitions }
        };

        let left_kernel = transform(left);
        let right_kernel = transform(right);

        Self {
            channels: [left_kernel, right_kernel],
            length: left.len().max(right.len()),
        }
    }

    /// Impulse response length in frames
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of partitions in the longest channel
    pub fn partition_count(&self) -> usize {
        self.channels
            .iter()
            .map(|c| c.partitions.len())
            .max()
            .unwrap_or(0)
    }
}

/// Per-channel overlap-save state
struct ChannelState {
    /// Previous and current input block
    input: Vec<f32>,
    /// Ring of past input spectra, newest at `position`
    delay_line: Vec<Vec<Complex<f32>>>,
}

impl ChannelState {
    fn new(partitions: usize) -> Self {
        Self {
            input: vec![0.0; FFT_SIZE],
            delay_line: vec![vec![Complex::new(0.0, 0.0); SPECTRUM_LEN]; partitions.max(1)],
        }
    }

    fn reset(&mut self) {
        self.input.fill(0.0);
        for spectrum in &mut self.delay_line {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
    }
}

/// Real-time stereo convolver
///
/// All buffers are allocated in [`Convolver::new`]; [`Convolver::process`]
/// never allocates.
pub struct Convolver {
    kernel: Arc<ConvolverKernel>,
    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,
    channels: [ChannelState; 2],
    position: usize,
    // Scratch
    time: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,
}

impl Convolver {
    pub fn new(kernel: Arc<ConvolverKernel>) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let ifft = planner.plan_fft_inverse(FFT_SIZE);
        let partitions = kernel.partition_count();

        Self {
            fft_scratch: fft.make_scratch_vec(),
            ifft_scratch: ifft.make_scratch_vec(),
            time: vec![0.0; FFT_SIZE],
            spectrum: vec![Complex::new(0.0, 0.0); SPECTRUM_LEN],
            accumulator: vec![Complex::new(0.0, 0.0); SPECTRUM_LEN],
            channels: [ChannelState::new(partitions), ChannelState::new(partitions)],
            position: 0,
            kernel,
            fft,
            ifft,
        }
    }

    pub fn kernel(&self) -> &Arc<ConvolverKernel> {
        &self.kernel
    }

    /// Clear all convolution history
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.position = 0;
    }

    /// Convolve one block in place
    ///
    /// `block` must hold exactly `PARTITION_SIZE` frames; other lengths are
    /// left untouched.
    pub fn process(&mut self, block: &mut [StereoSample]) {
        debug_assert_eq!(block.len(), PARTITION_SIZE, "convolver block size");
        if block.len() != PARTITION_SIZE {
            return;
        }

        for ch in 0..2 {
            self.process_channel(ch, block);
        }

        let slots = self.channels[0].delay_line.len();
        self.position = (self.position + 1) % slots;
    }

    fn process_channel(&mut self, ch: usize, block: &mut [StereoSample]) {
        let state = &mut self.channels[ch];
        let slots = state.delay_line.len();

        // Slide the input window: [previous block | this block]
        state.input.copy_within(PARTITION_SIZE.., 0);
        for (dst, frame) in state.input[PARTITION_SIZE..].iter_mut().zip(block.iter()) {
            *dst = if ch == 0 { frame.left } else { frame.right };
        }

        self.time.copy_from_slice(&state.input);
        if self
            .fft
            .process_with_scratch(&mut self.time, &mut self.spectrum, &mut self.fft_scratch)
            .is_err()
        {
            return;
        }
        state.delay_line[self.position].copy_from_slice(&self.spectrum);

        // Multiply-accumulate every partition against its delayed input
        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (p, partition) in self.kernel.channels[ch].partitions.iter().enumerate() {
            let slot = (self.position + slots - p) % slots;
            let delayed = &state.delay_line[slot];
            for ((acc, x), h) in self.accumulator.iter_mut().zip(delayed).zip(partition) {
                *acc += x * h;
            }
        }

        // Real signals have purely real DC and Nyquist bins
        self.accumulator[0].im = 0.0;
        self.accumulator[SPECTRUM_LEN - 1].im = 0.0;

        if self
            .ifft
            .process_with_scratch(&mut self.accumulator, &mut self.time, &mut self.ifft_scratch)
            .is_err()
        {
            return;
        }

        // Only the second half is free of circular wrap-around
        for (frame, &value) in block.iter_mut().zip(&self.time[PARTITION_SIZE..]) {
            if ch == 0 {
                frame.left = value;
            } else {
                frame.right = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(signal: &[f32], taps: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; signal.len()];
        for (n, y) in out.iter_mut().enumerate() {
            for (k, &h) in taps.iter().enumerate() {
                if k <= n {
                    *y += h * signal[n - k];
                }
            }
        }
        out
    }

    fn run(convolver: &mut Convolver, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut out_l = Vec::new();
        let mut out_r = Vec::new();
        for (l, r) in left.chunks(PARTITION_SIZE).zip(right.chunks(PARTITION_SIZE)) {
            let mut block: Vec<StereoSample> =
                l.iter().zip(r).map(|(&a, &b)| StereoSample::new(a, b)).collect();
            convolver.process(&mut block);
            out_l.extend(block.iter().map(|s| s.left));
            out_r.extend(block.iter().map(|s| s.right));
        }
        (out_l, out_r)
    }

    #[test]
    fn test_impulse_reproduces_response() {
        let taps_l: Vec<f32> = (0..300).map(|i| 0.5 * (-(i as f32) / 60.0).exp()).collect();
        let taps_r: Vec<f32> = (0..300).map(|i| if i % 7 == 0 { 0.25 } else { 0.0 }).collect();
        let kernel = Arc::new(ConvolverKernel::new(&taps_l, &taps_r, 1.0));
        assert_eq!(kernel.partition_count(), 3);

        let mut convolver = Convolver::new(kernel);
        let mut impulse = vec![0.0f32; PARTITION_SIZE * 4];
        impulse[0] = 1.0;
        let (out_l, out_r) = run(&mut convolver, &impulse, &impulse);

        for i in 0..300 {
            assert!((out_l[i] - taps_l[i]).abs() < 1e-4, "left tap {}", i);
            assert!((out_r[i] - taps_r[i]).abs() < 1e-4, "right tap {}", i);
        }
        assert!(out_l[300..].iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn test_matches_direct_convolution() {
        let taps: Vec<f32> = (0..200).map(|i| ((i * 37 % 11) as f32 - 5.0) / 20.0).collect();
        let signal: Vec<f32> = (0..PARTITION_SIZE * 5)
            .map(|i| (i as f32 * 0.05).sin() * 0.8)
            .collect();

        let mut convolver = Convolver::new(Arc::new(ConvolverKernel::new(&taps, &taps, 1.0)));
        let (out, _) = run(&mut convolver, &signal, &signal);
        let expected = direct_convolution(&signal, &taps);

        for (i, (a, b)) in out.iter().zip(&expected).enumerate() {
            assert!((a - b).abs() < 1e-3, "sample {}: {} vs {}", i, a, b);
        }
    }

    #[test]
    fn test_reset_clears_tail() {
        let taps = vec![1.0f32; PARTITION_SIZE * 2];
        let mut convolver = Convolver::new(Arc::new(ConvolverKernel::new(&taps, &taps, 1.0)));

        let loud = vec![1.0f32; PARTITION_SIZE];
        run(&mut convolver, &loud, &loud);
        convolver.reset();

        let silence = vec![0.0f32; PARTITION_SIZE];
        let (out, _) = run(&mut convolver, &silence, &silence);
        assert!(out.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_normalization_scale() {
        let sr = 44100;
        // RMS of a constant 0.1 signal is 0.1
        let taps = vec![0.1f32; 1000];
        let scale = normalization_scale(&[&taps, &taps], sr);
        assert!((scale - GAIN_CALIBRATION / 0.1).abs() < 1e-6);

        // Silent responses fall back to the power floor
        let silent = vec![0.0f32; 100];
        let scale = normalization_scale(&[&silent], sr);
        assert!((scale - GAIN_CALIBRATION / MIN_POWER).abs() < 1e-3);

        // Higher rates pull the scale down proportionally
        let scale_88k = normalization_scale(&[&taps], 88200);
        assert!((scale_88k - GAIN_CALIBRATION / 0.1 / 2.0).abs() < 1e-6);
    }
}
