//! Playback engine
//!
//! [`Player`] is the whole surface collaborators use: load a file or a URL,
//! drive the transport, adjust the equalizer, the sound field and the
//! volume, and poll [`Player::current_time`] for display.
//!
//! # Threading
//!
//! A `Player` is a cheap cloneable handle around one lock. Control calls
//! take the lock briefly and never wait on I/O; decoding and stream
//! resolution run on their own threads while the `load` future waits
//! without the lock. Audio runs on the render path, reached only through
//! the lock-free command queue.
//!
//! # Loads
//!
//! A load tears down the current source and enters `Loading`. Starting
//! another load before it resolves cancels the first, which then resolves
//! to [`PlayerError::Superseded`].
//!
//! # Seeking
//!
//! A seek always leaves the player silent at the new position. If it was
//! playing, playback resumes after the configured delay unless another
//! seek, a pause or a stop comes first.

mod engine;
mod error;
mod scheduler;
mod state;

pub use error::{PlayerError, PlayerResult};
pub use scheduler::ScheduledTask;
pub use state::{PlaybackState, Timing};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::oneshot;

use self::engine::PlayerCore;
use crate::config::PlayerConfig;
use crate::decode::{decode_audio, DecodeError};
use crate::equalizer::{Band, NUM_BANDS};
use crate::source::StreamError;
use crate::types::StereoBuffer;

fn lock(inner: &Mutex<PlayerCore>) -> MutexGuard<'_, PlayerCore> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct Player {
    inner: Arc<Mutex<PlayerCore>>,
}

impl Player {
    /// Create a player; the audio context opens on the first load
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlayerCore::new(config))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlayerCore> {
        lock(&self.inner)
    }

    /// Decode `bytes` and make them the current source
    ///
    /// Resolves to the duration in seconds.
    pub async fn load(&self, bytes: Vec<u8>) -> PlayerResult<f64> {
        let ticket = self.lock().begin_load()?;
        log::info!("Decoding {} bytes", bytes.len());

        let (tx, rx) = oneshot::channel();
        let cancel = ticket.cancel.clone();
        let sample_rate = ticket.sample_rate;
        let spawned = thread::Builder::new()
            .name("tonearm-decode".to_string())
            .spawn(move || {
                let _ = tx.send(decode_audio(bytes, sample_rate, &cancel));
            });
        let result = match spawned {
            Ok(_) => rx.await.unwrap_or(Err(DecodeError::Cancelled)),
            Err(e) => Err(DecodeError::Spawn(e.to_string())),
        };

        self.lock().finish_buffer_load(ticket.generation, result)
    }

    /// Open `url` as a stream and make it the current source
    ///
    /// Resolves to the duration once the stream's metadata is known
    /// (0 when the stream does not declare a length).
    pub async fn load_url(&self, url: &str) -> PlayerResult<f64> {
        let (generation, metadata) = {
            let mut core = self.lock();
            let ticket = core.begin_load()?;
            let metadata = core.open_stream(url, ticket.sample_rate)?;
            (ticket.generation, metadata)
        };

        let result = metadata.await.unwrap_or(Err(StreamError::Released));
        self.lock().finish_stream_load(generation, result)
    }

    /// Start playback at the retained offset
    ///
    /// Returns false if nothing is loaded, playback is already running, or
    /// the source refused to start (logged).
    pub fn play(&self) -> bool {
        self.lock().play()
    }

    /// Pause, retaining the position
    ///
    /// Returns false if nothing was playing. A pending post-seek resume is
    /// cancelled either way.
    pub fn pause(&self) -> bool {
        self.lock().pause()
    }

    /// Stop and rewind to the start
    pub fn stop(&self) {
        self.lock().stop();
    }

    /// Move to `seconds`, clamped to the track; returns the new position
    pub fn seek_to(&self, seconds: f64) -> f64 {
        let mut core = self.lock();
        let (target, resume) = core.seek(seconds);
        if resume {
            let weak = Arc::downgrade(&self.inner);
            let delay = core.config().timing.seek_resume_delay();
            let scheduled = ScheduledTask::spawn("tonearm-resume", delay, move |id| {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).fire_resume(id);
                }
            });
            match scheduled {
                Ok(task) => core.set_resume(task),
                Err(e) => {
                    log::warn!("Failed to schedule resume, resuming now: {}", e);
                    core.play();
                }
            }
        }
        target
    }

    /// Set the master gain (linear, ≥ 0)
    pub fn set_volume(&self, volume: f32) -> PlayerResult<()> {
        self.lock().set_volume(volume)
    }

    /// Set one equalizer band; returns the stored gain after clamping to ±12 dB
    pub fn set_band_gain(&self, index: usize, gain_db: f32) -> PlayerResult<f32> {
        self.lock().set_band_gain(index, gain_db)
    }

    /// Flatten all equalizer bands
    pub fn reset_equalizer(&self) {
        self.lock().reset_equalizer();
    }

    /// Select a sound field preset by name; false (and no change) if unknown
    pub fn apply_preset(&self, name: &str) -> bool {
        self.lock().apply_preset(name)
    }

    pub fn state(&self) -> PlaybackState {
        let mut core = self.lock();
        core.sync();
        core.state()
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().is_loaded()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().is_streaming()
    }

    /// Track length in seconds (0 when nothing is loaded)
    pub fn duration(&self) -> f64 {
        self.lock().duration()
    }

    /// Playback position in seconds, meant to be polled
    pub fn current_time(&self) -> f64 {
        let mut core = self.lock();
        core.sync();
        core.position()
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume()
    }

    pub fn bands(&self) -> [Band; NUM_BANDS] {
        self.lock().bands()
    }

    pub fn preset_names(&self) -> Vec<&'static str> {
        crate::sound_field::preset_names()
    }

    pub fn active_preset(&self) -> &'static str {
        self.lock().active_preset()
    }

    /// Context sample rate, once the context exists
    pub fn sample_rate(&self) -> Option<u32> {
        self.lock().sample_rate()
    }

    /// Render `frames` frames of output (offline output only)
    pub fn render(&self, frames: usize) -> PlayerResult<StereoBuffer> {
        self.lock().render(frames)
    }

    /// Release all sources and close the audio context
    ///
    /// Safe to call more than once. A later load opens a fresh context.
    pub fn destroy(&self) {
        self.lock().destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::sound_field::OFF_PRESET;
    use crate::test_support::{serve, wav_bytes, Route};
    use std::time::Duration;

    const SR: u32 = 8000;

    fn config() -> PlayerConfig {
        let mut config = PlayerConfig::offline(SR);
        config.timing.seek_resume_delay_ms = 50;
        config.sound_field.impulse_seed = Some(7);
        config
    }

    fn tone(seconds: f32) -> Vec<u8> {
        wav_bytes(SR, 1, seconds, 440.0)
    }

    async fn loaded(seconds: f32) -> Player {
        let player = Player::new(config());
        player.load(tone(seconds)).await.unwrap();
        player
    }

    /// Advance the engine clock by rendering
    fn advance(player: &Player, seconds: f64) {
        player.render((seconds * SR as f64).round() as usize).unwrap();
    }

    /// Poll `condition` for up to two seconds
    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn assert_near(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {} ± {}, got {}",
            expected,
            tolerance,
            actual
        );
    }

    #[tokio::test]
    async fn test_load_reports_duration_and_ready() {
        let player = Player::new(config());
        assert_eq!(player.state(), PlaybackState::Unloaded);
        assert!(!player.is_loaded());

        let duration = player.load(tone(2.0)).await.unwrap();
        assert_near(duration, 2.0, 1e-9);
        assert_eq!(player.duration(), duration);
        assert_eq!(player.state(), PlaybackState::Ready);
        assert!(player.is_loaded());
        assert!(!player.is_playing());
        assert!(!player.is_streaming());
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(player.sample_rate(), Some(SR));
    }

    #[tokio::test]
    async fn test_decode_failure_leaves_player_failed() {
        let player = loaded(2.0).await;
        let err = player.load(b"definitely not audio".to_vec()).await.unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));
        assert_eq!(player.state(), PlaybackState::Failed);
        assert!(!player.is_loaded());
        assert_eq!(player.duration(), 0.0);
        assert_eq!(player.current_time(), 0.0);
        assert!(!player.play());

        // Still usable afterwards
        player.load(tone(1.0)).await.unwrap();
        assert_eq!(player.state(), PlaybackState::Ready);
    }

    #[tokio::test]
    async fn test_pause_and_resume_keep_position() {
        let player = loaded(10.0).await;
        assert!(player.play());
        assert!(!player.play());
        advance(&player, 3.0);
        assert!(player.pause());
        assert_eq!(player.state(), PlaybackState::Paused);
        assert_near(player.current_time(), 3.0, 0.02);

        // Time does not move while paused
        advance(&player, 1.0);
        assert_near(player.current_time(), 3.0, 0.02);
        assert!(!player.pause());

        assert!(player.play());
        advance(&player, 2.0);
        assert_near(player.current_time(), 5.0, 0.04);
    }

    #[tokio::test]
    async fn test_position_is_monotonic_and_capped() {
        let player = loaded(1.0).await;
        player.play();
        let mut last = 0.0;
        for _ in 0..40 {
            player.render(100).unwrap();
            let now = player.current_time();
            assert!(now >= last, "{} went back to {}", last, now);
            assert!(now <= player.duration());
            last = now;
        }
    }

    #[tokio::test]
    async fn test_natural_end_stops_and_rewinds() {
        let player = loaded(1.0).await;
        player.play();
        advance(&player, 1.2);
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 0.0);
        assert!(player.is_loaded());

        // Plays again from the start
        assert!(player.play());
        advance(&player, 0.5);
        assert_near(player.current_time(), 0.5, 0.02);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let player = loaded(4.0).await;
        player.play();
        advance(&player, 1.0);
        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.current_time(), 0.0);
        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.current_time(), 0.0);

        // No audio after stop
        let out = player.render(1024).unwrap();
        assert_eq!(out.peak(), 0.0);
    }

    #[tokio::test]
    async fn test_seek_clamps_to_track() {
        let player = loaded(10.0).await;
        assert_eq!(player.seek_to(-5.0), 0.0);
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(player.seek_to(150.0), 10.0);
        assert_eq!(player.current_time(), 10.0);
        assert_eq!(player.seek_to(4.25), 4.25);
        assert_eq!(player.current_time(), 4.25);
    }

    #[tokio::test]
    async fn test_seek_while_paused_does_not_resume() {
        let player = loaded(10.0).await;
        player.seek_to(4.0);
        thread::sleep(Duration::from_millis(150));
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 4.0);
    }

    #[tokio::test]
    async fn test_seek_while_playing_resumes_after_delay() {
        let player = loaded(10.0).await;
        player.play();
        advance(&player, 1.0);

        player.seek_to(7.0);
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 7.0);

        assert!(wait_for(|| player.is_playing()));
        assert_near(player.current_time(), 7.0, 1e-9);
        advance(&player, 1.0);
        assert_near(player.current_time(), 8.0, 0.02);
    }

    #[tokio::test]
    async fn test_pause_cancels_pending_resume() {
        let player = loaded(10.0).await;
        player.play();
        player.seek_to(5.0);
        // Seeking already left the playing state
        assert!(!player.pause());
        thread::sleep(Duration::from_millis(150));
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 5.0);
    }

    #[tokio::test]
    async fn test_second_seek_replaces_pending_resume() {
        let mut config = config();
        config.timing.seek_resume_delay_ms = 150;
        let player = Player::new(config);
        player.load(tone(10.0)).await.unwrap();
        player.play();

        player.seek_to(3.0);
        thread::sleep(Duration::from_millis(75));
        player.seek_to(6.0);
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 6.0);

        assert!(wait_for(|| player.is_playing()));
        assert_near(player.current_time(), 6.0, 1e-9);
    }

    #[tokio::test]
    async fn test_volume() {
        let player = loaded(1.0).await;
        assert_eq!(player.volume(), 1.0);
        assert!(matches!(
            player.set_volume(-1.0),
            Err(PlayerError::InvalidParameter(_))
        ));
        assert!(player.set_volume(f32::NAN).is_err());

        player.set_volume(0.0).unwrap();
        player.play();
        let out = player.render(2048).unwrap();
        assert_eq!(out.peak(), 0.0);

        player.set_volume(1.0).unwrap();
        let out = player.render(2048).unwrap();
        assert!(out.peak() > 0.5);
    }

    #[test]
    fn test_equalizer_bands() {
        let player = Player::new(config());
        for index in 0..NUM_BANDS {
            let gain = index as f32 * 2.4 - 12.0;
            assert_eq!(player.set_band_gain(index, gain).unwrap(), gain);
            assert_eq!(player.bands()[index].gain_db, gain);
        }
        assert_eq!(player.set_band_gain(3, 30.0).unwrap(), 12.0);
        assert!(matches!(
            player.set_band_gain(NUM_BANDS, 1.0),
            Err(PlayerError::BandOutOfRange(10))
        ));

        player.reset_equalizer();
        assert!(player.bands().iter().all(|b| b.gain_db == 0.0));
        assert_eq!(player.bands()[0].frequency, 31.25);
        assert_eq!(player.bands()[9].frequency, 16000.0);
    }

    #[test]
    fn test_presets() {
        let player = Player::new(config());
        assert_eq!(player.preset_names().len(), 9);
        assert_eq!(player.active_preset(), OFF_PRESET);
        assert!(player.apply_preset("Preset 3"));
        assert_eq!(player.active_preset(), "Preset 3");
        assert!(!player.apply_preset("Stadium"));
        assert_eq!(player.active_preset(), "Preset 3");
    }

    #[tokio::test]
    async fn test_preset_adds_reverb_tail() {
        async fn tail_peak(preset: &str) -> f32 {
            let player = Player::new(config());
            player.apply_preset(preset);
            player.load(tone(0.5)).await.unwrap();
            player.play();
            advance(&player, 0.6);
            assert_eq!(player.state(), PlaybackState::Stopped);
            player.render(1024).unwrap().peak()
        }

        assert_eq!(tail_peak(OFF_PRESET).await, 0.0);
        assert!(tail_peak("Preset 7").await > 0.0);
    }

    #[test]
    fn test_render_needs_offline_output() {
        let player = Player::new(PlayerConfig::default());
        assert!(matches!(
            player.render(128),
            Err(PlayerError::Audio(AudioError::NotOffline))
        ));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_recoverable() {
        let player = loaded(2.0).await;
        player.play();
        player.destroy();
        assert_eq!(player.state(), PlaybackState::Unloaded);
        assert!(!player.is_loaded());
        assert_eq!(player.sample_rate(), None);
        player.destroy();

        player.load(tone(1.0)).await.unwrap();
        assert!(player.play());
    }

    #[tokio::test]
    async fn test_bad_url_rejects_with_stream_error() {
        let player = Player::new(config());
        let err = player.load_url("not a url").await.unwrap_err();
        assert!(matches!(err, PlayerError::StreamLoad(StreamError::InvalidUrl(_))));
        assert_eq!(player.state(), PlaybackState::Unloaded);
        assert!(!player.is_loaded());
        assert!(!player.is_streaming());

        let base = serve(vec![]);
        let err = player
            .load_url(&format!("{}/missing.wav", base))
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::StreamLoad(StreamError::Status(404))));
        assert_eq!(player.state(), PlaybackState::Unloaded);
        assert!(!player.is_loaded());
        assert!(!player.is_streaming());
        assert_eq!(player.duration(), 0.0);
    }

    #[tokio::test]
    async fn test_stream_playback() {
        let base = serve(vec![("/tone.wav", Route::Body(tone(2.0)))]);
        let player = Player::new(config());
        let duration = player.load_url(&format!("{}/tone.wav", base)).await.unwrap();
        assert_near(duration, 2.0, 1e-6);
        assert!(player.is_streaming());
        assert_eq!(player.state(), PlaybackState::Ready);

        assert!(player.play());
        assert!(wait_for(|| {
            player.render(128).unwrap();
            player.current_time() >= 0.25
        }));

        assert!(player.pause());
        let paused_at = player.current_time();
        player.render(1024).unwrap();
        assert_eq!(player.current_time(), paused_at);

        player.seek_to(1.5);
        assert_eq!(player.current_time(), 1.5);

        player.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert_eq!(player.current_time(), 0.0);
    }

    #[tokio::test]
    async fn test_stream_natural_end() {
        let base = serve(vec![("/short.wav", Route::Body(tone(0.3)))]);
        let player = Player::new(config());
        player.load_url(&format!("{}/short.wav", base)).await.unwrap();
        player.play();
        assert!(wait_for(|| {
            player.render(256).unwrap();
            player.state() == PlaybackState::Stopped
        }));
        assert_eq!(player.current_time(), 0.0);
    }

    #[tokio::test]
    async fn test_switching_sources_leaves_no_residual_audio() {
        let base = serve(vec![("/tone.wav", Route::Body(tone(2.0)))]);
        let player = loaded(5.0).await;
        player.play();
        assert!(player.render(1024).unwrap().peak() > 0.5);

        player.load_url(&format!("{}/tone.wav", base)).await.unwrap();
        assert!(player.is_streaming());
        assert!(!player.is_playing());
        assert_eq!(player.render(2048).unwrap().peak(), 0.0);

        player.load(tone(1.0)).await.unwrap();
        assert!(!player.is_streaming());
        assert_eq!(player.render(2048).unwrap().peak(), 0.0);
        assert!(player.play());
        assert!(player.render(1024).unwrap().peak() > 0.5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_new_load_supersedes_pending_one() {
        let base = serve(vec![("/stall.wav", Route::Stall)]);
        let player = Player::new(config());

        let pending = {
            let player = player.clone();
            let url = format!("{}/stall.wav", base);
            tokio::spawn(async move { player.load_url(&url).await })
        };
        for _ in 0..200 {
            if player.is_streaming() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(player.state(), PlaybackState::Loading);

        let duration = player.load(tone(1.0)).await.unwrap();
        assert_near(duration, 1.0, 1e-9);
        assert!(matches!(pending.await.unwrap(), Err(PlayerError::Superseded)));
        assert_eq!(player.state(), PlaybackState::Ready);
        assert!(!player.is_streaming());
    }
}
