//! Signal processing building blocks
//!
//! Biquads, parameter smoothing and the convolver are allocation-free once
//! constructed and run on the render path. The rubato wrapper runs on decoder
//! threads to bring decoded audio to the context sample rate.

pub mod biquad;
pub mod convolver;
pub mod resample;
pub mod smoothing;

pub use biquad::{BiquadCoeffs, BiquadState};
pub use convolver::{normalization_scale, Convolver, ConvolverKernel, PARTITION_SIZE};
pub use resample::{resample_all, ResamplerError, StereoResampler};
pub use smoothing::SmoothedValue;
