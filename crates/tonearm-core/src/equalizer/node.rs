//! Render-side equalizer: ten biquad sections in series

use crate::dsp::{BiquadCoeffs, BiquadState};
use crate::types::StereoSample;

use super::{clamp_gain, BandKind, BAND_FREQUENCIES, NUM_BANDS, PEAKING_Q};

/// Gains closer to zero than this run as a plain passthrough
const FLAT_THRESHOLD_DB: f32 = 0.01;

#[derive(Debug, Clone)]
struct BandFilter {
    kind: BandKind,
    frequency: f32,
    gain_db: f32,
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BandFilter {
    fn new(index: usize, sample_rate: f32) -> Self {
        let mut filter = Self {
            kind: BandKind::for_index(index),
            frequency: BAND_FREQUENCIES[index],
            gain_db: 0.0,
            coeffs: BiquadCoeffs::passthrough(),
            state: BiquadState::default(),
        };
        filter.set_gain(0.0, sample_rate);
        filter
    }

    fn set_gain(&mut self, gain_db: f32, sample_rate: f32) {
        // A bypassed section keeps stale history, start it clean
        if self.coeffs == BiquadCoeffs::passthrough() {
            self.state.reset();
        }
        self.gain_db = clamp_gain(gain_db);
        self.coeffs = if self.gain_db.abs() < FLAT_THRESHOLD_DB {
            BiquadCoeffs::passthrough()
        } else {
            match self.kind {
                BandKind::LowShelf => BiquadCoeffs::low_shelf(self.frequency, self.gain_db, sample_rate),
                BandKind::Peaking => {
                    BiquadCoeffs::peaking(self.frequency, self.gain_db, PEAKING_Q, sample_rate)
                }
                BandKind::HighShelf => BiquadCoeffs::high_shelf(self.frequency, self.gain_db, sample_rate),
            }
        };
    }
}

/// Equalizer filter chain owned by the renderer
///
/// Gain changes take effect at the next processed sample, without smoothing.
#[derive(Debug, Clone)]
pub struct EqualizerNode {
    sample_rate: f32,
    bands: [BandFilter; NUM_BANDS],
}

impl EqualizerNode {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        Self {
            sample_rate,
            bands: std::array::from_fn(|i| BandFilter::new(i, sample_rate)),
        }
    }

    /// Build a node with gains already applied
    pub fn with_gains(sample_rate: u32, gains: &[f32; NUM_BANDS]) -> Self {
        let mut node = Self::new(sample_rate);
        node.set_all_gains(gains);
        node
    }

    /// Update one band; out-of-range indices are ignored
    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) {
        let sample_rate = self.sample_rate;
        if let Some(band) = self.bands.get_mut(index) {
            band.set_gain(gain_db, sample_rate);
        }
    }

    pub fn set_all_gains(&mut self, gains: &[f32; NUM_BANDS]) {
        for (index, &gain) in gains.iter().enumerate() {
            self.set_band_gain(index, gain);
        }
    }

    pub fn gain(&self, index: usize) -> Option<f32> {
        self.bands.get(index).map(|b| b.gain_db)
    }

    /// Clear filter memory
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.state.reset();
        }
    }

    /// Filter a block in place, band 0 first
    pub fn process(&mut self, samples: &mut [StereoSample]) {
        for band in &mut self.bands {
            if band.coeffs == BiquadCoeffs::passthrough() {
                continue;
            }
            for sample in samples.iter_mut() {
                *sample = band.state.process(*sample, &band.coeffs);
            }
        }
    }
}
