//! Exponential parameter smoothing
//!
//! One-pole approach towards a target, equivalent to scheduling a value with
//! a time constant: after `tau` seconds the remaining distance has shrunk to
//! 1/e of where it started.

/// Distance below which a smoothed value snaps onto its target
const SETTLE_EPSILON: f32 = 1.0e-5;

#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedValue {
    /// Create a settled value
    ///
    /// A non-positive time constant makes every change immediate.
    pub fn new(value: f32, time_constant_secs: f32, sample_rate: u32) -> Self {
        let coeff = if time_constant_secs <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / (time_constant_secs * sample_rate as f32)).exp()
        };
        Self {
            current: value,
            target: value,
            coeff,
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump straight to `value`, abandoning any ramp in progress
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Advance one sample and return the new value
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.current != self.target {
            self.current += (self.target - self.current) * self.coeff;
            if (self.target - self.current).abs() < SETTLE_EPSILON {
                self.current = self.target;
            }
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}
