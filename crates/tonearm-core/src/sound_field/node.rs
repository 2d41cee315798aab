//! Render-side sound field: dry/wet split around the convolver
//!
//! ```text
//!            ┌──► dry gain ─────────────┐
//! input ─────┤                          ├──► output
//!            └──► convolver ─► wet gain ┘
//! ```

use basedrop::Owned;

use crate::dsp::{Convolver, SmoothedValue, PARTITION_SIZE};
use crate::types::StereoSample;

pub struct SoundFieldNode {
    input_gain: f32,
    output_gain: f32,
    wet: SmoothedValue,
    dry: SmoothedValue,
    convolver: Option<Owned<Convolver>>,
    wet_scratch: Vec<StereoSample>,
    /// Set while the convolver is bypassed, so it restarts from silence
    convolver_idle: bool,
}

impl SoundFieldNode {
    pub fn new(sample_rate: u32, time_constant_secs: f32, wet: f32, dry: f32) -> Self {
        Self {
            input_gain: 1.0,
            output_gain: 1.0,
            wet: SmoothedValue::new(wet, time_constant_secs, sample_rate),
            dry: SmoothedValue::new(dry, time_constant_secs, sample_rate),
            convolver: None,
            wet_scratch: vec![StereoSample::silence(); PARTITION_SIZE],
            convolver_idle: true,
        }
    }

    /// Start ramping towards new mix gains
    pub fn set_targets(&mut self, wet: f32, dry: f32) {
        self.wet.set_target(wet);
        self.dry.set_target(dry);
    }

    /// Swap in a new convolver, returning the previous one
    ///
    /// The returned value is reclaimed by the collector thread when dropped.
    pub fn replace_convolver(&mut self, convolver: Owned<Convolver>) -> Option<Owned<Convolver>> {
        self.convolver_idle = true;
        self.convolver.replace(convolver)
    }

    pub fn has_convolver(&self) -> bool {
        self.convolver.is_some()
    }

    /// Current (wet, dry) gains
    pub fn gains(&self) -> (f32, f32) {
        (self.wet.current(), self.dry.current())
    }

    fn wet_path_active(&self) -> bool {
        self.convolver.is_some() && !(self.wet.is_settled() && self.wet.current() == 0.0)
    }

    pub fn process(&mut self, block: &mut [StereoSample]) {
        if self.input_gain != 1.0 {
            for sample in block.iter_mut() {
                *sample *= self.input_gain;
            }
        }

        let wet_active = self.wet_path_active() && block.len() == PARTITION_SIZE;
        if wet_active {
            if let Some(convolver) = self.convolver.as_mut() {
                if self.convolver_idle {
                    convolver.reset();
                    self.convolver_idle = false;
                }
                self.wet_scratch.copy_from_slice(block);
                convolver.process(&mut self.wet_scratch);
            }
        } else {
            self.convolver_idle = true;
        }

        for (i, sample) in block.iter_mut().enumerate() {
            let wet = self.wet.next();
            let dry = self.dry.next();
            let mut mixed = *sample * dry;
            if wet_active {
                mixed += self.wet_scratch[i] * wet;
            }
            *sample = mixed * self.output_gain;
        }
    }
}
