//! Player configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;

/// Everything a [`Player`](crate::player::Player) can be configured with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub audio: AudioConfig,
    pub timing: TimingConfig,
    pub sound_field: SoundFieldConfig,
    pub stream: StreamConfig,
    /// Master gain applied when the player is created
    pub initial_volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            timing: TimingConfig::default(),
            sound_field: SoundFieldConfig::default(),
            stream: StreamConfig::default(),
            initial_volume: 1.0,
        }
    }
}

impl PlayerConfig {
    /// Config rendering offline at `sample_rate`, for headless hosts and tests
    pub fn offline(sample_rate: u32) -> Self {
        Self {
            audio: AudioConfig::offline(sample_rate),
            ..Default::default()
        }
    }
}

/// Playback timing constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay before playback resumes after a seek (ms)
    pub seek_resume_delay_ms: u64,
    /// Time constant of the sound field dry/wet crossfade (ms)
    pub crossfade_time_constant_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            seek_resume_delay_ms: 250,
            crossfade_time_constant_ms: 50,
        }
    }
}

impl TimingConfig {
    pub fn seek_resume_delay(&self) -> Duration {
        Duration::from_millis(self.seek_resume_delay_ms)
    }

    pub fn crossfade_time_constant_secs(&self) -> f32 {
        self.crossfade_time_constant_ms as f32 / 1000.0
    }
}

/// Impulse response synthesis options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundFieldConfig {
    /// Fixed RNG seed for reproducible responses (None = random)
    pub impulse_seed: Option<u64>,
    /// Scale responses to a calibrated level before convolving
    pub normalize_impulse: bool,
}

impl Default for SoundFieldConfig {
    fn default() -> Self {
        Self {
            impulse_seed: None,
            normalize_impulse: true,
        }
    }
}

/// Network stream options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Decoded chunks buffered ahead of playback
    pub buffer_chunks: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            buffer_chunks: 48,
        }
    }
}
