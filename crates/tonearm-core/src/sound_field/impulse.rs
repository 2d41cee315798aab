//! Procedural room impulse responses
//!
//! Each channel gets a handful of early reflections in the first 50 ms, a
//! noise tail starting at 100 ms, and both follow the same exponential decay.
//! The second channel is jittered per sample by ±10% so the reverb does not
//! collapse to mono.

use rand::Rng;

use super::preset::ImpulseShape;

/// Early reflections are placed within this window (s)
const EARLY_WINDOW_SECS: f32 = 0.05;

/// Late reverberation starts after this point (s)
const LATE_ONSET_SECS: f32 = 0.1;

/// Reflection count range (inclusive)
const MIN_REFLECTIONS: usize = 4;
const MAX_REFLECTIONS: usize = 11;

/// Level of early reflections relative to intensity
const EARLY_LEVEL: f32 = 0.3;

/// Level of the late tail relative to intensity
const LATE_LEVEL: f32 = 0.1;

/// Stereo jitter applied to the second channel
const DECORRELATION: f32 = 0.1;

/// A synthesized stereo impulse response
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl ImpulseResponse {
    pub fn synthesize<R: Rng>(shape: &ImpulseShape, sample_rate: u32, rng: &mut R) -> Self {
        let length = (sample_rate as f32 * shape.duration_secs).floor().max(0.0) as usize;
        let left = synthesize_channel(shape, sample_rate, length, rng);
        let mut right = synthesize_channel(shape, sample_rate, length, rng);
        for sample in &mut right {
            *sample *= 1.0 - DECORRELATION + rng.gen::<f32>() * 2.0 * DECORRELATION;
        }
        Self {
            left,
            right,
            sample_rate,
        }
    }

    /// Length in frames
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }
}

fn synthesize_channel<R: Rng>(
    shape: &ImpulseShape,
    sample_rate: u32,
    length: usize,
    rng: &mut R,
) -> Vec<f32> {
    let sr = sample_rate as f32;
    let envelope = |i: usize| (-shape.decay_rate * i as f32 / sr).exp();
    let mut data = vec![0.0f32; length];

    let early_window = ((sr * EARLY_WINDOW_SECS) as usize).min(length);
    if early_window > 0 {
        let reflections = rng.gen_range(MIN_REFLECTIONS..=MAX_REFLECTIONS);
        for _ in 0..reflections {
            let at = rng.gen_range(0..early_window);
            data[at] += rng.gen_range(-1.0f32..1.0) * envelope(at) * shape.intensity * EARLY_LEVEL;
        }
    }

    let late_onset = (sr * LATE_ONSET_SECS).floor() as usize + 1;
    for (i, sample) in data.iter_mut().enumerate().skip(late_onset) {
        *sample += rng.gen_range(-1.0f32..1.0) * envelope(i) * shape.intensity * LATE_LEVEL;
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SR: u32 = 48000;

    fn shape() -> ImpulseShape {
        ImpulseShape {
            duration_secs: 2.5,
            decay_rate: 2.0,
            intensity: 0.4,
        }
    }

    fn energy(data: &[f32]) -> f64 {
        data.iter().map(|&s| (s as f64).powi(2)).sum()
    }

    #[test]
    fn test_length_and_silent_gap() {
        let mut rng = StdRng::seed_from_u64(7);
        let ir = ImpulseResponse::synthesize(&shape(), SR, &mut rng);
        assert_eq!(ir.len(), 120000);
        assert_eq!(ir.right.len(), ir.left.len());
        assert!((ir.duration_secs() - 2.5).abs() < 1e-6);

        // Nothing between the early window and the late onset
        let gap = &ir.left[(SR as usize / 20)..=(SR as usize / 10)];
        assert!(gap.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reflection_count_and_level() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ir = ImpulseResponse::synthesize(&shape(), SR, &mut rng);
            let early = &ir.left[..(SR as usize / 20)];
            let taps = early.iter().filter(|&&s| s != 0.0).count();
            // Two reflections landing on one of 2400 slots is too rare to matter here
            assert!(
                (MIN_REFLECTIONS..=MAX_REFLECTIONS).contains(&taps),
                "seed {}: {} taps",
                seed,
                taps
            );
            let limit = shape().intensity * EARLY_LEVEL * MAX_REFLECTIONS as f32;
            assert!(early.iter().all(|s| s.abs() <= limit));
        }
    }

    #[test]
    fn test_tail_decays() {
        let mut rng = StdRng::seed_from_u64(42);
        let ir = ImpulseResponse::synthesize(&shape(), SR, &mut rng);
        let second = SR as usize;
        let first_half = energy(&ir.left[second / 5..second]);
        let last_half = energy(&ir.left[second + second / 5..2 * second]);
        // exp(-2·t) power drops by e^-4 per second
        assert!(last_half < first_half * 0.1);
    }

    #[test]
    fn test_channels_are_decorrelated_but_similar() {
        let mut rng = StdRng::seed_from_u64(3);
        let ir = ImpulseResponse::synthesize(&shape(), SR, &mut rng);
        assert_ne!(ir.left, ir.right);
        let ratio = energy(&ir.right) / energy(&ir.left);
        assert!(ratio > 0.5 && ratio < 2.0, "energy ratio {}", ratio);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = ImpulseResponse::synthesize(&shape(), SR, &mut StdRng::seed_from_u64(9));
        let b = ImpulseResponse::synthesize(&shape(), SR, &mut StdRng::seed_from_u64(9));
        assert_eq!(a.left, b.left);
        assert_eq!(a.right, b.right);
    }
}
