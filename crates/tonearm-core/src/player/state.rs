//! Playback state and timing

use std::fmt;

/// Where the player is in its lifecycle
///
/// `Ready`, `Paused` and `Stopped` all mean "silent, position retained";
/// they only record how that point was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Unloaded,
    Loading,
    Ready,
    Playing,
    Paused,
    Stopped,
    /// The last load failed; nothing is loaded
    Failed,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Unloaded => "unloaded",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Failed => "failed",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Offset bookkeeping for the current track (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timing {
    /// Context time at which the current playing segment began
    pub start_time: f64,
    /// Retained position
    pub offset: f64,
    /// Track length; 0 while unknown
    pub duration: f64,
}

impl Timing {
    pub fn new(duration: f64) -> Self {
        Self {
            start_time: 0.0,
            offset: 0.0,
            duration,
        }
    }

    /// Position of a playing segment at context time `now`, capped at the duration
    pub fn playing_position(&self, now: f64) -> f64 {
        (self.offset + (now - self.start_time).max(0.0)).min(self.duration)
    }

    /// Clamp a requested position into the track
    ///
    /// Non-finite requests go to the start. With an unknown duration only
    /// the lower bound applies.
    pub fn clamp(&self, seconds: f64) -> f64 {
        if !seconds.is_finite() {
            return 0.0;
        }
        let seconds = seconds.max(0.0);
        if self.duration > 0.0 {
            seconds.min(self.duration)
        } else {
            seconds
        }
    }

    /// Rewind to the start, keeping the duration
    pub fn rewind(&mut self) {
        self.start_time = 0.0;
        self.offset = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playing_position_is_capped() {
        let timing = Timing {
            start_time: 2.0,
            offset: 8.0,
            duration: 10.0,
        };
        assert_eq!(timing.playing_position(3.5), 9.5);
        assert_eq!(timing.playing_position(20.0), 10.0);
        // A clock read before the segment start never moves backwards
        assert_eq!(timing.playing_position(1.0), 8.0);
    }

    #[test]
    fn test_clamp() {
        let timing = Timing::new(100.0);
        assert_eq!(timing.clamp(-5.0), 0.0);
        assert_eq!(timing.clamp(150.0), 100.0);
        assert_eq!(timing.clamp(42.5), 42.5);
        assert_eq!(timing.clamp(f64::NAN), 0.0);

        let unknown = Timing::new(0.0);
        assert_eq!(unknown.clamp(30.0), 30.0);
        assert_eq!(unknown.clamp(-1.0), 0.0);
    }

    #[test]
    fn test_rewind_keeps_duration() {
        let mut timing = Timing {
            start_time: 1.0,
            offset: 4.0,
            duration: 10.0,
        };
        timing.rewind();
        assert_eq!(timing, Timing::new(10.0));
    }
}
