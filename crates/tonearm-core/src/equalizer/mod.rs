//! Ten-band graphic equalizer
//!
//! The control side ([`Equalizer`]) keeps the band records that collaborators
//! read and edit. The render side ([`EqualizerNode`]) owns the filter chain and
//! receives gain changes through the graph command queue.
//!
//! Band layout: octave-spaced centers from 31.25 Hz to 16 kHz. The lowest band
//! is a low shelf, the highest a high shelf, the eight in between are peaking
//! filters with Q = 1.

mod node;

pub use node::EqualizerNode;

/// Number of equalizer bands
pub const NUM_BANDS: usize = 10;

/// Fixed band center frequencies (Hz)
pub const BAND_FREQUENCIES: [f32; NUM_BANDS] = [
    31.25, 62.5, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Lowest allowed band gain (dB)
pub const MIN_GAIN_DB: f32 = -12.0;

/// Highest allowed band gain (dB)
pub const MAX_GAIN_DB: f32 = 12.0;

/// Q of the peaking bands
pub const PEAKING_Q: f32 = 1.0;

/// Filter shape of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandKind {
    LowShelf,
    Peaking,
    HighShelf,
}

impl BandKind {
    /// Shape used at a given band position
    pub fn for_index(index: usize) -> Self {
        match index {
            0 => BandKind::LowShelf,
            i if i == NUM_BANDS - 1 => BandKind::HighShelf,
            _ => BandKind::Peaking,
        }
    }
}

/// One equalizer band as seen by collaborators
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// Center (or corner) frequency in Hz, fixed for the band's lifetime
    pub frequency: f32,
    /// Current gain in dB, within [-12, +12]
    pub gain_db: f32,
    pub kind: BandKind,
}

/// Clamp a requested gain into the supported range
///
/// Non-finite requests are treated as flat.
pub fn clamp_gain(gain_db: f32) -> f32 {
    if gain_db.is_finite() {
        gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
    } else {
        0.0
    }
}

/// Control-side band records
#[derive(Debug, Clone)]
pub struct Equalizer {
    bands: [Band; NUM_BANDS],
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Equalizer {
    pub fn new() -> Self {
        let bands = std::array::from_fn(|i| Band {
            frequency: BAND_FREQUENCIES[i],
            gain_db: 0.0,
            kind: BandKind::for_index(i),
        });
        Self { bands }
    }

    /// Set one band's gain
    ///
    /// Returns the stored (clamped) gain, or `None` if `index` is not a band.
    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) -> Option<f32> {
        let band = self.bands.get_mut(index)?;
        band.gain_db = clamp_gain(gain_db);
        Some(band.gain_db)
    }

    /// Flatten every band
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.gain_db = 0.0;
        }
    }

    pub fn band(&self, index: usize) -> Option<&Band> {
        self.bands.get(index)
    }

    pub fn bands(&self) -> &[Band; NUM_BANDS] {
        &self.bands
    }

    /// Current gains, in band order
    pub fn gains(&self) -> [f32; NUM_BANDS] {
        std::array::from_fn(|i| self.bands[i].gain_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_layout() {
        let eq = Equalizer::new();
        assert_eq!(eq.bands().len(), NUM_BANDS);
        assert_eq!(eq.bands()[0].kind, BandKind::LowShelf);
        assert_eq!(eq.bands()[9].kind, BandKind::HighShelf);
        assert!(eq.bands()[1..9].iter().all(|b| b.kind == BandKind::Peaking));

        // Octave spacing
        for pair in eq.bands().windows(2) {
            assert!((pair[1].frequency / pair[0].frequency - 2.0).abs() < f32::EPSILON);
        }
        assert_eq!(eq.bands()[0].frequency, 31.25);
        assert_eq!(eq.bands()[9].frequency, 16000.0);
    }

    #[test]
    fn test_set_band_gain_roundtrip() {
        let mut eq = Equalizer::new();
        for index in 0..NUM_BANDS {
            for gain in [-12.0, -7.5, 0.0, 3.25, 12.0] {
                assert_eq!(eq.set_band_gain(index, gain), Some(gain));
                assert_eq!(eq.band(index).unwrap().gain_db, gain);
            }
        }
    }

    #[test]
    fn test_gain_is_clamped() {
        let mut eq = Equalizer::new();
        assert_eq!(eq.set_band_gain(3, 40.0), Some(MAX_GAIN_DB));
        assert_eq!(eq.set_band_gain(3, -40.0), Some(MIN_GAIN_DB));
        assert_eq!(eq.set_band_gain(3, f32::NAN), Some(0.0));
    }

    #[test]
    fn test_out_of_range_band_is_rejected() {
        let mut eq = Equalizer::new();
        assert_eq!(eq.set_band_gain(NUM_BANDS, 6.0), None);
        assert!(eq.gains().iter().all(|&g| g == 0.0));
    }

    #[test]
    fn test_reset_flattens_all_bands() {
        let mut eq = Equalizer::new();
        for index in 0..NUM_BANDS {
            eq.set_band_gain(index, index as f32 - 5.0);
        }
        eq.reset();
        assert_eq!(eq.gains(), [0.0; NUM_BANDS]);
    }
}
