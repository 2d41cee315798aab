//! Audio context and output
//!
//! - [`AudioContext`]: lazily created shared state (clock, queues, output)
//! - [`cpal_backend`]: device output on a dedicated thread
//! - [`device`]: output device enumeration across hosts

pub mod config;
pub mod context;
pub mod cpal_backend;
pub mod device;
pub mod error;

pub use config::{AudioConfig, DeviceId, OutputTarget};
pub use context::AudioContext;
pub use device::{output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
