//! Control-side player state behind the [`Player`](super::Player) lock
//!
//! Every method runs with the lock held and never blocks on I/O; the slow
//! halves of loads happen outside it and come back through `finish_*`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use basedrop::Owned;

use super::error::{PlayerError, PlayerResult};
use super::scheduler::ScheduledTask;
use super::state::{PlaybackState, Timing};
use crate::audio::{AudioContext, AudioError, OutputTarget};
use crate::config::PlayerConfig;
use crate::decode::{DecodeError, DecodedAudio};
use crate::dsp::Convolver;
use crate::equalizer::{Band, Equalizer, NUM_BANDS};
use crate::graph::{gc_handle, GraphCommand, RenderEvent, RendererSettings};
use crate::sound_field::{
    equal_power_gains, preset_index, SoundFieldSimulator, SoundFieldUpdate, OFF_PRESET,
    PRESET_DEFINITIONS,
};
use crate::source::{
    BufferSource, ElementEvent, Source, StreamElement, StreamError, StreamMetadata, StreamSource,
};
use crate::source::stream::MetadataReceiver;
use crate::types::StereoBuffer;

/// What the async half of a load needs from the lock-held half
pub(crate) struct LoadTicket {
    pub generation: u64,
    pub cancel: Arc<AtomicBool>,
    pub sample_rate: u32,
}

pub(crate) struct PlayerCore {
    config: PlayerConfig,
    context: Option<AudioContext>,
    sound_field: Option<SoundFieldSimulator>,
    preset: &'static str,
    equalizer: Equalizer,
    volume: f32,
    source: Option<Source>,
    /// Element of a stream load waiting for its metadata
    loading_stream: Option<StreamElement>,
    state: PlaybackState,
    timing: Timing,
    /// Bumped by every load and by destroy; a load finishing under an older
    /// generation has been superseded
    generation: u64,
    load_cancel: Option<Arc<AtomicBool>>,
    resume: Option<ScheduledTask>,
}

impl PlayerCore {
    pub fn new(config: PlayerConfig) -> Self {
        let volume = if config.initial_volume.is_finite() && config.initial_volume >= 0.0 {
            config.initial_volume
        } else {
            log::warn!(
                "Ignoring invalid initial volume {}, using 1.0",
                config.initial_volume
            );
            1.0
        };
        Self {
            config,
            context: None,
            sound_field: None,
            preset: OFF_PRESET,
            equalizer: Equalizer::new(),
            volume,
            source: None,
            loading_stream: None,
            state: PlaybackState::Unloaded,
            timing: Timing::default(),
            generation: 0,
            load_cancel: None,
            resume: None,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Context lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Create the audio context on first use
    fn ensure_context(&mut self) -> PlayerResult<()> {
        if self.context.is_none() {
            let mut settings = RendererSettings::new(0);
            settings.band_gains = self.equalizer.gains();
            settings.master_gain = self.volume;
            settings.time_constant_secs = self.config.timing.crossfade_time_constant_secs();
            if let Some(index) = preset_index(self.preset) {
                let (wet, dry) = equal_power_gains(PRESET_DEFINITIONS[index].wetness);
                settings.wet = wet;
                settings.dry = dry;
            }

            let context = AudioContext::new(&self.config.audio, settings)?;
            let mut sound_field = SoundFieldSimulator::new(context.sample_rate(), &self.config.sound_field);
            let update = sound_field.apply_preset(self.preset);
            self.context = Some(context);
            self.sound_field = Some(sound_field);
            if let Some(update) = update {
                self.send_sound_field(update);
            }
        }
        Ok(())
    }

    fn now(&self) -> f64 {
        self.context.as_ref().map_or(0.0, |c| c.current_time())
    }

    fn send(&self, cmd: GraphCommand) {
        if let Some(context) = &self.context {
            if let Err(e) = context.send(cmd) {
                log::warn!("Dropping graph command: {}", e);
            }
        }
    }

    fn send_sound_field(&self, update: SoundFieldUpdate) {
        self.send(GraphCommand::SetSoundFieldGains {
            wet: update.wet,
            dry: update.dry,
        });
        if let Some(kernel) = update.kernel {
            self.send(GraphCommand::SetConvolver(Owned::new(
                &gc_handle(),
                Convolver::new(kernel),
            )));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event processing
    // ─────────────────────────────────────────────────────────────────────

    /// Apply everything the renderer and the stream element reported since
    /// the last call
    pub fn sync(&mut self) {
        while let Some(event) = self.context.as_mut().and_then(|c| c.poll_event()) {
            match event {
                RenderEvent::SourceEnded { id } => {
                    let ours = self.source.as_ref().is_some_and(|s| s.owns_node(id));
                    if ours && self.state == PlaybackState::Playing {
                        self.finish_playback();
                    }
                }
            }
        }

        let mut failure = None;
        if let Some(Source::Stream(stream)) = &self.source {
            while let Some(ElementEvent::Failed(e)) = stream.try_event() {
                failure = Some(e);
            }
        }
        if let Some(e) = failure {
            if self.state == PlaybackState::Playing {
                let err = PlayerError::PlaybackStart(e.to_string());
                log::warn!("Stream stopped producing audio: {}", err);
                if let Some(source) = self.source.as_mut() {
                    source.halt();
                }
                self.timing.offset = self.position();
                self.state = PlaybackState::Paused;
            }
        }
    }

    /// Natural end of the source: same outcome as a user stop
    fn finish_playback(&mut self) {
        log::debug!("Playback reached the end");
        if let Some(source) = self.source.as_mut() {
            source.halt();
            if let Source::Stream(stream) = source {
                stream.reposition(0.0);
            }
        }
        self.timing.rewind();
        self.state = PlaybackState::Stopped;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────

    /// Tear down the current source and any pending load, then enter `Loading`
    pub fn begin_load(&mut self) -> PlayerResult<LoadTicket> {
        if let Err(e) = self.ensure_context() {
            self.fail_load(PlaybackState::Failed);
            return Err(e);
        }
        self.cancel_resume();
        self.abandon_pending_load();
        if let Some(source) = self.source.take() {
            source.release();
        }

        self.generation += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        self.load_cancel = Some(cancel.clone());
        self.timing = Timing::default();
        self.state = PlaybackState::Loading;

        Ok(LoadTicket {
            generation: self.generation,
            cancel,
            sample_rate: self.context_rate(),
        })
    }

    fn context_rate(&self) -> u32 {
        self.context
            .as_ref()
            .map_or(self.config.audio.target_sample_rate(), |c| c.sample_rate())
    }

    /// Cancel an in-flight decode and release a stream still resolving
    fn abandon_pending_load(&mut self) {
        if let Some(cancel) = self.load_cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
        if let Some(element) = self.loading_stream.take() {
            element.release();
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Start resolving `url`; the returned receiver yields its metadata
    pub fn open_stream(&mut self, url: &str, sample_rate: u32) -> PlayerResult<MetadataReceiver> {
        let mut element = match StreamElement::open(url, sample_rate, &self.config.stream) {
            Ok(element) => element,
            Err(e) => {
                self.fail_load(PlaybackState::Unloaded);
                return Err(PlayerError::StreamLoad(e));
            }
        };
        match element.take_metadata() {
            Some(metadata) => {
                self.loading_stream = Some(element);
                Ok(metadata)
            }
            None => {
                self.fail_load(PlaybackState::Unloaded);
                Err(PlayerError::StreamLoad(StreamError::Released))
            }
        }
    }

    pub fn finish_buffer_load(
        &mut self,
        generation: u64,
        result: Result<DecodedAudio, DecodeError>,
    ) -> PlayerResult<f64> {
        if !self.is_current(generation) {
            return Err(PlayerError::Superseded);
        }
        self.load_cancel = None;
        match result {
            Ok(audio) => {
                let source = BufferSource::new(audio);
                log::info!(
                    "Loaded {:.2}s ({} channel(s), {} frames)",
                    source.duration(),
                    source.channels(),
                    source.frames()
                );
                let duration = source.duration();
                self.install(Source::Buffer(source), duration);
                Ok(duration)
            }
            Err(e) => {
                log::warn!("Load failed: {}", e);
                self.fail_load(PlaybackState::Failed);
                Err(PlayerError::Decode(e))
            }
        }
    }

    pub fn finish_stream_load(
        &mut self,
        generation: u64,
        result: Result<StreamMetadata, StreamError>,
    ) -> PlayerResult<f64> {
        if !self.is_current(generation) {
            return Err(PlayerError::Superseded);
        }
        self.load_cancel = None;
        let Some(element) = self.loading_stream.take() else {
            return Err(PlayerError::Superseded);
        };

        let metadata = match result {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Stream {} failed to load: {}", element.url(), e);
                element.release();
                self.fail_load(PlaybackState::Unloaded);
                return Err(PlayerError::StreamLoad(e));
            }
        };

        let url = element.url().to_string();
        let connected = match self.context.as_ref() {
            Some(context) => StreamSource::connect(element, metadata, context.sender()),
            None => return Err(PlayerError::Superseded),
        };
        match connected {
            Ok(source) => {
                log::info!(
                    "Loaded stream {} ({:.2}s, {}Hz, {} channel(s))",
                    url,
                    metadata.duration,
                    metadata.sample_rate,
                    metadata.channels
                );
                let duration = source.duration();
                self.install(Source::Stream(source), duration);
                Ok(duration)
            }
            Err(e) => {
                self.fail_load(PlaybackState::Unloaded);
                Err(PlayerError::Audio(e))
            }
        }
    }

    fn install(&mut self, source: Source, duration: f64) {
        self.source = Some(source);
        self.timing = Timing::new(duration);
        self.state = PlaybackState::Ready;
    }

    /// Drop whatever the load left behind and settle in `state`
    ///
    /// Decode failures end in `Failed`. A stream that cannot be opened only
    /// rejects its load, leaving the player `Unloaded`.
    fn fail_load(&mut self, state: PlaybackState) {
        self.abandon_pending_load();
        if let Some(source) = self.source.take() {
            source.release();
        }
        self.timing = Timing::default();
        self.state = state;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────

    pub fn play(&mut self) -> bool {
        self.sync();
        if self.state == PlaybackState::Playing || self.source.is_none() {
            return false;
        }
        self.cancel_resume();
        let offset = self.timing.offset;
        let Some(source) = self.source.as_mut() else {
            return false;
        };

        let started = match source {
            Source::Buffer(buffer) => match self.context.as_ref() {
                Some(context) => buffer
                    .start(offset, context.sender())
                    .map(|_| ())
                    .map_err(|e| PlayerError::PlaybackStart(e.to_string())),
                None => Err(PlayerError::PlaybackStart("no audio context".to_string())),
            },
            Source::Stream(stream) => stream
                .start(offset)
                .map_err(|e| PlayerError::PlaybackStart(e.to_string())),
        };
        if let Err(e) = started {
            log::warn!("{}", e);
            return false;
        }

        self.timing.start_time = self.now();
        self.state = PlaybackState::Playing;
        log::debug!("Playing from {:.3}s", offset);
        true
    }

    /// Pause playback; false when nothing was playing
    ///
    /// A pending post-seek resume is cancelled either way.
    pub fn pause(&mut self) -> bool {
        self.sync();
        self.cancel_resume();
        if self.state != PlaybackState::Playing {
            return false;
        }
        if let Some(source) = self.source.as_mut() {
            source.halt();
        }
        self.timing.offset = self.position();
        self.state = PlaybackState::Paused;
        log::debug!("Paused at {:.3}s", self.timing.offset);
        true
    }

    pub fn stop(&mut self) {
        self.sync();
        self.cancel_resume();
        if let Some(source) = self.source.as_mut() {
            source.halt();
            if let Source::Stream(stream) = source {
                stream.reposition(0.0);
            }
            self.state = PlaybackState::Stopped;
        }
        self.timing.rewind();
    }

    /// Move to `seconds`; returns the clamped target and whether a resume
    /// must be scheduled
    pub fn seek(&mut self, seconds: f64) -> (f64, bool) {
        self.sync();
        if self.source.is_none() {
            return (self.timing.offset, false);
        }
        let was_playing = self.state == PlaybackState::Playing || self.resume.is_some();
        self.cancel_resume();

        let target = self.timing.clamp(seconds);
        if let Some(source) = self.source.as_mut() {
            source.halt();
            if let Source::Stream(stream) = source {
                stream.reposition(target);
            }
        }
        self.timing.offset = target;
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
        log::debug!("Seek to {:.3}s (resume: {})", target, was_playing);
        (target, was_playing)
    }

    pub fn set_resume(&mut self, task: ScheduledTask) {
        self.resume = Some(task);
    }

    /// Run the scheduled resume `id` if it is still the pending one
    pub fn fire_resume(&mut self, id: u64) {
        if self.resume.as_ref().map(ScheduledTask::id) != Some(id) {
            return;
        }
        self.resume = None;
        self.play();
    }

    /// True if a pending resume was cancelled
    fn cancel_resume(&mut self) -> bool {
        match self.resume.take() {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_volume(&mut self, volume: f32) -> PlayerResult<()> {
        if !volume.is_finite() || volume < 0.0 {
            return Err(PlayerError::InvalidParameter("volume"));
        }
        self.volume = volume;
        self.send(GraphCommand::SetMasterGain(volume));
        Ok(())
    }

    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) -> PlayerResult<f32> {
        let stored = self
            .equalizer
            .set_band_gain(index, gain_db)
            .ok_or(PlayerError::BandOutOfRange(index))?;
        self.send(GraphCommand::SetBandGain {
            index,
            gain_db: stored,
        });
        Ok(stored)
    }

    pub fn reset_equalizer(&mut self) {
        self.equalizer.reset();
        self.send(GraphCommand::SetAllBandGains([0.0; NUM_BANDS]));
    }

    /// Select a sound field preset; unknown names change nothing
    pub fn apply_preset(&mut self, name: &str) -> bool {
        let Some(index) = preset_index(name) else {
            log::debug!("Ignoring unknown sound field preset '{}'", name);
            return false;
        };
        self.preset = PRESET_DEFINITIONS[index].name;
        let update = self
            .sound_field
            .as_mut()
            .and_then(|sound_field| sound_field.apply_preset(name));
        if let Some(update) = update {
            self.send_sound_field(update);
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.loading_stream.is_some() || self.source.as_ref().is_some_and(Source::is_streaming)
    }

    pub fn duration(&self) -> f64 {
        self.timing.duration
    }

    /// Current position in seconds
    ///
    /// Streams report the element position; buffers derive it from the
    /// context clock while playing and the retained offset otherwise.
    pub fn position(&self) -> f64 {
        match &self.source {
            Some(Source::Stream(stream)) => stream.position(),
            _ if self.state == PlaybackState::Playing => self.timing.playing_position(self.now()),
            _ => self.timing.offset,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn bands(&self) -> [Band; NUM_BANDS] {
        *self.equalizer.bands()
    }

    pub fn active_preset(&self) -> &'static str {
        self.preset
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.context.as_ref().map(AudioContext::sample_rate)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Output & teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Pull frames from an offline context, creating it if needed
    pub fn render(&mut self, frames: usize) -> PlayerResult<StereoBuffer> {
        if self.config.audio.output != OutputTarget::Offline {
            return Err(PlayerError::Audio(AudioError::NotOffline));
        }
        self.ensure_context()?;
        match self.context.as_mut() {
            Some(context) => Ok(context.render(frames)?),
            None => Err(PlayerError::Audio(AudioError::NotOffline)),
        }
    }

    /// Release everything and close the context; idempotent
    pub fn destroy(&mut self) {
        self.cancel_resume();
        self.abandon_pending_load();
        if let Some(source) = self.source.take() {
            source.release();
        }
        self.generation += 1;
        self.timing = Timing::default();
        self.state = PlaybackState::Unloaded;
        self.sound_field = None;
        if self.context.take().is_some() {
            log::info!("Player destroyed");
        }
    }
}

impl Drop for PlayerCore {
    fn drop(&mut self) {
        self.destroy();
    }
}
