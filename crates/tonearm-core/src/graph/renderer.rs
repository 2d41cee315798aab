//! The render-side audio graph
//!
//! ```text
//! source ──► equalizer ──► sound field ──► master gain ──► output
//! ```
//!
//! The renderer is owned by whichever thread produces output (the device
//! callback or an offline caller). It works in fixed quanta of
//! [`RENDER_QUANTUM`] frames: commands are applied at the start of a quantum
//! and the clock advances at its end. Output requests of any size are served
//! from the current quantum.

use std::sync::Arc;

use basedrop::Owned;

use super::clock::RenderClock;
use super::command::{GraphCommand, RenderEvent};
use super::node::NodeId;
use crate::dsp::Convolver;
use crate::equalizer::{EqualizerNode, NUM_BANDS};
use crate::sound_field::SoundFieldNode;
use crate::source::SourceNode;
use crate::types::{StereoSample, RENDER_QUANTUM};

/// Initial parameters of a renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub sample_rate: u32,
    pub band_gains: [f32; NUM_BANDS],
    pub wet: f32,
    pub dry: f32,
    pub master_gain: f32,
    /// Smoothing time constant of the sound field mix gains (s)
    pub time_constant_secs: f32,
}

impl RendererSettings {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            band_gains: [0.0; NUM_BANDS],
            wet: 0.0,
            dry: 1.0,
            master_gain: 1.0,
            time_constant_secs: 0.05,
        }
    }
}

pub struct Renderer {
    commands: rtrb::Consumer<GraphCommand>,
    events: rtrb::Producer<RenderEvent>,
    clock: Arc<RenderClock>,
    source: Option<(NodeId, Owned<SourceNode>)>,
    equalizer: EqualizerNode,
    sound_field: SoundFieldNode,
    master_gain: f32,
    quantum: [StereoSample; RENDER_QUANTUM],
    /// Next unread frame of `quantum`; `RENDER_QUANTUM` when exhausted
    cursor: usize,
}

impl Renderer {
    pub fn new(
        settings: RendererSettings,
        commands: rtrb::Consumer<GraphCommand>,
        events: rtrb::Producer<RenderEvent>,
        clock: Arc<RenderClock>,
    ) -> Self {
        Self {
            commands,
            events,
            clock,
            source: None,
            equalizer: EqualizerNode::with_gains(settings.sample_rate, &settings.band_gains),
            sound_field: SoundFieldNode::new(
                settings.sample_rate,
                settings.time_constant_secs,
                settings.wet,
                settings.dry,
            ),
            master_gain: settings.master_gain,
            quantum: [StereoSample::silence(); RENDER_QUANTUM],
            cursor: RENDER_QUANTUM,
        }
    }

    pub fn clock(&self) -> &Arc<RenderClock> {
        &self.clock
    }

    /// Currently connected source, if any
    pub fn source_id(&self) -> Option<NodeId> {
        self.source.as_ref().map(|(id, _)| *id)
    }

    /// Fill `out` with the next frames of the graph output
    pub fn render(&mut self, out: &mut [StereoSample]) {
        let mut written = 0;
        while written < out.len() {
            if self.cursor == RENDER_QUANTUM {
                self.process_quantum();
                self.cursor = 0;
            }
            let n = (RENDER_QUANTUM - self.cursor).min(out.len() - written);
            out[written..written + n].copy_from_slice(&self.quantum[self.cursor..self.cursor + n]);
            self.cursor += n;
            written += n;
        }
    }

    fn process_quantum(&mut self) {
        self.apply_commands();

        self.quantum.fill(StereoSample::silence());
        if let Some((id, node)) = self.source.as_mut() {
            if node.render(&mut self.quantum) {
                // Event queue overflow only loses the notification
                let _ = self.events.push(RenderEvent::SourceEnded { id: *id });
                if !node.outlives_end() {
                    self.source = None;
                }
            }
        }

        self.equalizer.process(&mut self.quantum);
        self.sound_field.process(&mut self.quantum);
        if self.master_gain != 1.0 {
            for sample in self.quantum.iter_mut() {
                *sample *= self.master_gain;
            }
        }

        self.clock.advance(RENDER_QUANTUM as u64);
    }

    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                GraphCommand::ConnectSource { id, node } => {
                    self.source = Some((id, node));
                }
                GraphCommand::DisconnectSource { id } => {
                    if self.source_id() == Some(id) {
                        self.source = None;
                    }
                }
                GraphCommand::SetBandGain { index, gain_db } => {
                    self.equalizer.set_band_gain(index, gain_db);
                }
                GraphCommand::SetAllBandGains(gains) => {
                    self.equalizer.set_all_gains(&gains);
                }
                GraphCommand::SetSoundFieldGains { wet, dry } => {
                    self.sound_field.set_targets(wet, dry);
                }
                GraphCommand::SetConvolver(convolver) => {
                    self.replace_convolver(convolver);
                }
                GraphCommand::SetMasterGain(gain) => {
                    self.master_gain = gain;
                }
            }
        }
    }

    fn replace_convolver(&mut self, convolver: Owned<Convolver>) {
        // The previous convolver is reclaimed by the collector thread
        drop(self.sound_field.replace_convolver(convolver));
    }
}
