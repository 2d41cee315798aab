//! Stereo biquad sections for the equalizer
//!
//! Coefficients follow the RBJ audio EQ cookbook. Shelves use slope 1, the
//! same curve `lowshelf`/`highshelf` filters conventionally produce.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use crate::types::StereoSample;

/// Section coefficients with `a0` divided out
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

/// Shared cookbook terms for one design: `(A, cos w0, sin w0)`
fn design_terms(freq: f32, gain_db: f32, sample_rate: f32) -> (f32, f32, f32) {
    // Designs at or above Nyquist are unstable
    let freq = freq.clamp(1.0, sample_rate * 0.4995);
    let w0 = 2.0 * PI * freq / sample_rate;
    let (sin, cos) = w0.sin_cos();
    (10.0_f32.powf(gain_db / 40.0), cos, sin)
}

impl BiquadCoeffs {
    fn normalized(b: [f32; 3], a: [f32; 3]) -> Self {
        let inv = 1.0 / a[0];
        Self {
            b0: b[0] * inv,
            b1: b[1] * inv,
            b2: b[2] * inv,
            a1: a[1] * inv,
            a2: a[2] * inv,
        }
    }

    pub fn passthrough() -> Self {
        Self::normalized([1.0, 0.0, 0.0], [1.0, 0.0, 0.0])
    }

    pub fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        Self::shelf(freq, gain_db, sample_rate, 1.0)
    }

    pub fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        Self::shelf(freq, gain_db, sample_rate, -1.0)
    }

    /// Low (`side = 1`) or high (`side = -1`) shelf
    ///
    /// The two cookbook shelves differ only in the sign of the `A - 1` terms.
    fn shelf(freq: f32, gain_db: f32, sample_rate: f32, side: f32) -> Self {
        let (a, cos, sin) = design_terms(freq, gain_db, sample_rate);
        let root = 2.0 * a.sqrt() * sin * FRAC_1_SQRT_2;
        let sum = a + 1.0;
        let diff = side * (a - 1.0);

        Self::normalized(
            [
                a * (sum - diff * cos + root),
                2.0 * a * (diff - sum * cos),
                a * (sum - diff * cos - root),
            ],
            [
                sum + diff * cos + root,
                -2.0 * (diff + sum * cos),
                sum + diff * cos - root,
            ],
        )
    }

    pub fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let (a, cos, sin) = design_terms(freq, gain_db, sample_rate);
        let alpha = sin / (2.0 * q);
        Self::normalized(
            [1.0 + alpha * a, -2.0 * cos, 1.0 - alpha * a],
            [1.0 + alpha / a, -2.0 * cos, 1.0 - alpha / a],
        )
    }

    /// Gain in dB at `freq`, from `H(e^jw)`
    pub fn magnitude_db(&self, freq: f32, sample_rate: f32) -> f32 {
        let w = 2.0 * PI * freq / sample_rate;
        // |c0 + c1 e^-jw + c2 e^-2jw|
        let magnitude = |c0: f32, c1: f32, c2: f32| {
            let re = c0 + c1 * w.cos() + c2 * (2.0 * w).cos();
            let im = c1 * w.sin() + c2 * (2.0 * w).sin();
            re.hypot(im)
        };
        let num = magnitude(self.b0, self.b1, self.b2);
        let den = magnitude(1.0, self.a1, self.a2);
        20.0 * (num / den).log10()
    }
}

/// Delay line of one stereo section, transposed direct form II
#[derive(Debug, Clone, Default)]
pub struct BiquadState {
    /// `[z1, z2]` per channel
    left: [f32; 2],
    right: [f32; 2],
}

#[inline]
fn step(z: &mut [f32; 2], x: f32, c: &BiquadCoeffs) -> f32 {
    let y = c.b0 * x + z[0];
    z[0] = c.b1 * x - c.a1 * y + z[1];
    z[1] = c.b2 * x - c.a2 * y;
    // Decaying tails end up denormal and slow every later frame
    for v in z.iter_mut() {
        if v.abs() < 1.0e-20 {
            *v = 0.0;
        }
    }
    y
}

impl BiquadState {
    #[inline]
    pub fn process(&mut self, input: StereoSample, coeffs: &BiquadCoeffs) -> StereoSample {
        StereoSample::new(
            step(&mut self.left, input.left, coeffs),
            step(&mut self.right, input.right, coeffs),
        )
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_zero_gain_is_transparent() {
        for coeffs in [
            BiquadCoeffs::low_shelf(31.25, 0.0, SR),
            BiquadCoeffs::peaking(1000.0, 0.0, 1.0, SR),
            BiquadCoeffs::high_shelf(16000.0, 0.0, SR),
        ] {
            for freq in [20.0, 440.0, 5000.0, 18000.0] {
                assert!(coeffs.magnitude_db(freq, SR).abs() < 0.01);
            }
        }
    }

    #[test]
    fn test_peaking_gain_at_center() {
        let coeffs = BiquadCoeffs::peaking(1000.0, 9.0, 1.0, SR);
        assert!((coeffs.magnitude_db(1000.0, SR) - 9.0).abs() < 0.05);
        assert!(coeffs.magnitude_db(20.0, SR).abs() < 0.5);
    }

    #[test]
    fn test_shelves_reach_full_gain() {
        let low = BiquadCoeffs::low_shelf(250.0, -12.0, SR);
        assert!((low.magnitude_db(10.0, SR) + 12.0).abs() < 0.2);
        assert!(low.magnitude_db(10000.0, SR).abs() < 0.2);

        let high = BiquadCoeffs::high_shelf(2000.0, 6.0, SR);
        assert!((high.magnitude_db(20000.0, SR) - 6.0).abs() < 0.3);
        assert!(high.magnitude_db(30.0, SR).abs() < 0.1);
    }

    #[test]
    fn test_passthrough_state() {
        let mut state = BiquadState::default();
        let coeffs = BiquadCoeffs::passthrough();
        for _ in 0..3 {
            let out = state.process(StereoSample::new(0.25, -0.5), &coeffs);
            assert_eq!(out, StereoSample::new(0.25, -0.5));
        }
    }

    #[test]
    fn test_impulse_decays_near_nyquist() {
        let coeffs = BiquadCoeffs::high_shelf(16000.0, 12.0, 22050.0);
        let mut state = BiquadState::default();
        let mut out = StereoSample::silence();
        for i in 0..16384 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            out = state.process(StereoSample::mono(x), &coeffs);
        }
        assert!(out.peak().is_finite());
        assert!(out.peak() < 1.0e-3);
    }
}
