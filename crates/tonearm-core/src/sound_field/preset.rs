//! Sound field preset library

/// Name of the preset that disables the reverb
pub const OFF_PRESET: &str = "Off";

/// Parameters of a synthesized room response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpulseShape {
    /// Response length in seconds
    pub duration_secs: f32,
    /// Exponential decay rate of the envelope (1/s)
    pub decay_rate: f32,
    /// Overall level of reflections and tail
    pub intensity: f32,
}

/// Static description of a preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetDefinition {
    pub name: &'static str,
    /// Wet share in [0, 1]
    pub wetness: f32,
    /// `None` for presets that only adjust the mix
    pub shape: Option<ImpulseShape>,
}

const fn room(name: &'static str, wetness: f32, duration_secs: f32, decay_rate: f32, intensity: f32) -> PresetDefinition {
    PresetDefinition {
        name,
        wetness,
        shape: Some(ImpulseShape {
            duration_secs,
            decay_rate,
            intensity,
        }),
    }
}

/// Every preset, in display order
pub static PRESET_DEFINITIONS: [PresetDefinition; 9] = [
    PresetDefinition {
        name: OFF_PRESET,
        wetness: 0.0,
        shape: None,
    },
    room("Preset 1", 0.30, 2.5, 2.0, 0.4),
    room("Preset 2", 0.40, 4.0, 3.0, 0.3),
    room("Preset 3", 0.25, 1.5, 1.8, 0.5),
    room("Preset 4", 0.15, 0.8, 4.0, 0.6),
    room("Preset 5", 0.35, 1.2, 2.5, 0.4),
    room("Preset 6", 0.20, 3.0, 1.5, 0.7),
    room("Preset 7", 0.45, 5.0, 1.2, 0.3),
    room("Preset 8", 0.35, 3.5, 2.2, 0.4),
];

/// Preset names in display order
pub fn preset_names() -> Vec<&'static str> {
    PRESET_DEFINITIONS.iter().map(|p| p.name).collect()
}

/// Position of a preset in the library
pub fn preset_index(name: &str) -> Option<usize> {
    PRESET_DEFINITIONS.iter().position(|p| p.name == name)
}

/// Equal-power mix for a wetness ratio: `(wet, dry)` with `wet² + dry² = 1`
pub fn equal_power_gains(wetness: f32) -> (f32, f32) {
    let wet = wetness.clamp(0.0, 1.0);
    (wet, (1.0 - wet * wet).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_is_equal_power() {
        for preset in &PRESET_DEFINITIONS {
            let (wet, dry) = equal_power_gains(preset.wetness);
            assert!((wet * wet + dry * dry - 1.0).abs() < 1e-6, "{}", preset.name);
        }
    }

    #[test]
    fn test_off_is_fully_dry() {
        let off = &PRESET_DEFINITIONS[preset_index(OFF_PRESET).unwrap()];
        assert!(off.shape.is_none());
        assert_eq!(equal_power_gains(off.wetness), (0.0, 1.0));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(preset_names().len(), 9);
        assert_eq!(preset_names()[0], OFF_PRESET);
        assert_eq!(preset_index("Preset 7"), Some(7));
        assert_eq!(preset_index("Cathedral"), None);
        let p7 = PRESET_DEFINITIONS[7];
        assert_eq!(p7.wetness, 0.45);
        assert_eq!(p7.shape.unwrap().duration_secs, 5.0);
    }
}
