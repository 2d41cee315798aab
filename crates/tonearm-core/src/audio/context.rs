//! Audio context: the renderer, its clock and the queues that reach it
//!
//! A context is created lazily by the player and closed exactly once. The
//! renderer lives either on the device output thread or, for offline
//! contexts, inside the context itself where `render` pulls from it.

use std::sync::Arc;

use super::config::{AudioConfig, OutputTarget};
use super::cpal_backend::{start_device_output, DeviceOutput};
use super::error::{AudioError, AudioResult};
use crate::graph::{
    command_channel, event_channel, CommandSender, GraphCommand, RenderClock, RenderEvent, Renderer,
    RendererSettings,
};
use crate::types::StereoBuffer;

enum Output {
    Device(DeviceOutput),
    Offline(Box<Renderer>),
}

pub struct AudioContext {
    sample_rate: u32,
    clock: Arc<RenderClock>,
    commands: CommandSender,
    events: rtrb::Consumer<RenderEvent>,
    output: Output,
}

impl AudioContext {
    /// Start a context with the graph initialized from `settings`
    ///
    /// The sample rate in `settings` is replaced by the negotiated one.
    pub fn new(config: &AudioConfig, settings: RendererSettings) -> AudioResult<Self> {
        let (commands, command_rx) = command_channel();
        let (event_tx, events) = event_channel();

        let (sample_rate, clock, output) = match config.output {
            OutputTarget::Offline => {
                let sample_rate = config.target_sample_rate();
                let clock = Arc::new(RenderClock::new(sample_rate));
                let renderer = Renderer::new(
                    RendererSettings {
                        sample_rate,
                        ..settings
                    },
                    command_rx,
                    event_tx,
                    clock.clone(),
                );
                (sample_rate, clock, Output::Offline(Box::new(renderer)))
            }
            OutputTarget::Device => {
                let device = start_device_output(config, move |sample_rate| {
                    // Capture `settings` whole; disjoint field capture of the
                    // struct update below triggers a rustc ICE (broken MIR).
                    let settings = settings;
                    let clock = Arc::new(RenderClock::new(sample_rate));
                    Renderer::new(
                        RendererSettings {
                            sample_rate,
                            ..settings
                        },
                        command_rx,
                        event_tx,
                        clock,
                    )
                })?;
                (device.sample_rate(), device.clock().clone(), Output::Device(device))
            }
        };

        log::info!(
            "Audio context started ({:?}, {}Hz)",
            config.output,
            sample_rate
        );
        Ok(Self {
            sample_rate,
            clock,
            commands,
            events,
            output,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Context time in seconds
    pub fn current_time(&self) -> f64 {
        self.clock.now()
    }

    pub fn sender(&self) -> &CommandSender {
        &self.commands
    }

    /// Queue a graph command
    pub fn send(&self, cmd: GraphCommand) -> AudioResult<()> {
        self.commands.send(cmd).map_err(|_| AudioError::CommandQueueFull)
    }

    /// Next event from the renderer, if any
    pub fn poll_event(&mut self) -> Option<RenderEvent> {
        self.events.pop().ok()
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.output, Output::Offline(_))
    }

    /// Render `frames` frames of graph output (offline contexts only)
    pub fn render(&mut self, frames: usize) -> AudioResult<StereoBuffer> {
        match &mut self.output {
            Output::Offline(renderer) => {
                let mut out = StereoBuffer::silence(frames);
                renderer.render(out.as_mut_slice());
                Ok(out)
            }
            Output::Device(_) => Err(AudioError::NotOffline),
        }
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        log::info!("Audio context closed");
    }
}
