//! Render clock shared between the renderer and control threads

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::frames_to_seconds;

/// Frames rendered since the context was created
///
/// Only the renderer advances it, so it moves in whole render quanta.
#[derive(Debug)]
pub struct RenderClock {
    sample_rate: u32,
    frames: AtomicU64,
}

impl RenderClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Context time in seconds
    pub fn now(&self) -> f64 {
        frames_to_seconds(self.frames(), self.sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
