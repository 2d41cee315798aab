//! Sound field simulator: convolution reverb with an equal-power dry/wet mix
//!
//! [`SoundFieldSimulator`] is the control side. It owns the preset library,
//! synthesizes every preset's impulse response once at construction, and turns
//! `apply_preset` calls into [`SoundFieldUpdate`]s for the renderer. The
//! render side is [`SoundFieldNode`].

mod impulse;
mod node;
mod preset;

use std::sync::{Arc, OnceLock};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::SoundFieldConfig;
use crate::dsp::{normalization_scale, ConvolverKernel};

pub use impulse::ImpulseResponse;
pub use node::SoundFieldNode;
pub use preset::{
    equal_power_gains, preset_index, preset_names, ImpulseShape, PresetDefinition, OFF_PRESET,
    PRESET_DEFINITIONS,
};

/// A preset with its synthesized response
#[derive(Debug)]
pub struct ReverbPreset {
    pub name: &'static str,
    pub wetness: f32,
    pub impulse: Option<Arc<ImpulseResponse>>,
    kernel: OnceLock<Arc<ConvolverKernel>>,
}

impl ReverbPreset {
    /// Mix gains this preset selects, `(wet, dry)`
    pub fn gains(&self) -> (f32, f32) {
        equal_power_gains(self.wetness)
    }
}

/// What the renderer has to change to realize a preset
#[derive(Debug, Clone)]
pub struct SoundFieldUpdate {
    pub wet: f32,
    pub dry: f32,
    /// New response for the convolver; `None` keeps the current one
    pub kernel: Option<Arc<ConvolverKernel>>,
}

pub struct SoundFieldSimulator {
    sample_rate: u32,
    normalize: bool,
    presets: Vec<ReverbPreset>,
    active: usize,
}

impl SoundFieldSimulator {
    pub fn new(sample_rate: u32, config: &SoundFieldConfig) -> Self {
        let mut rng = match config.impulse_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let presets = PRESET_DEFINITIONS
            .iter()
            .map(|definition| ReverbPreset {
                name: definition.name,
                wetness: definition.wetness,
                impulse: definition
                    .shape
                    .map(|shape| Arc::new(ImpulseResponse::synthesize(&shape, sample_rate, &mut rng))),
                kernel: OnceLock::new(),
            })
            .collect();

        log::debug!(
            "Sound field ready: {} presets at {}Hz (normalize: {})",
            PRESET_DEFINITIONS.len(),
            sample_rate,
            config.normalize_impulse
        );

        Self {
            sample_rate,
            normalize: config.normalize_impulse,
            presets,
            active: 0,
        }
    }

    pub fn presets(&self) -> &[ReverbPreset] {
        &self.presets
    }

    pub fn preset_names(&self) -> Vec<&'static str> {
        self.presets.iter().map(|p| p.name).collect()
    }

    pub fn active_preset(&self) -> &'static str {
        self.presets[self.active].name
    }

    /// Target `(wet, dry)` gains of the active preset
    pub fn gains(&self) -> (f32, f32) {
        self.presets[self.active].gains()
    }

    /// Select a preset by name
    ///
    /// Unknown names leave everything unchanged and return `None`.
    pub fn apply_preset(&mut self, name: &str) -> Option<SoundFieldUpdate> {
        let index = self.presets.iter().position(|p| p.name == name)?;
        self.active = index;
        let preset = &self.presets[index];
        let (wet, dry) = preset.gains();

        let kernel = preset.impulse.as_ref().map(|ir| {
            preset
                .kernel
                .get_or_init(|| Arc::new(build_kernel(ir, self.sample_rate, self.normalize)))
                .clone()
        });

        log::debug!("Sound field preset '{}' (wet {:.2}, dry {:.2})", preset.name, wet, dry);
        Some(SoundFieldUpdate { wet, dry, kernel })
    }
}

fn build_kernel(ir: &ImpulseResponse, sample_rate: u32, normalize: bool) -> ConvolverKernel {
    let scale = if normalize {
        normalization_scale(&[&ir.left, &ir.right], sample_rate)
    } else {
        1.0
    };
    ConvolverKernel::new(&ir.left, &ir.right, scale)
}
