//! Audio output configuration

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SAMPLE_RATE;

/// Largest device callback rendered in one pass (frames)
pub const MAX_BUFFER_SIZE: usize = 8192;

const MIN_BUFFER_SIZE: u32 = 64;

/// Where rendered audio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputTarget {
    /// A cpal output stream on a sound device
    #[default]
    Device,
    /// No device; the host pulls frames with `render`
    Offline,
}

/// An output device, optionally pinned to one host backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    pub name: String,
    /// Host label such as "ALSA" or "CoreAudio"; unset searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{} on {}", self.name, host),
            None => f.write_str(&self.name),
        }
    }
}

/// Configuration of the audio context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub output: OutputTarget,
    /// Output device; unset uses the system default
    pub device: Option<DeviceId>,
    /// Frames per device callback; unset leaves the choice to the device
    pub buffer_frames: Option<u32>,
    /// Preferred context rate; unset means 48kHz
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    /// Config for rendering without a device
    pub fn offline(sample_rate: u32) -> Self {
        Self {
            output: OutputTarget::Offline,
            sample_rate: Some(sample_rate),
            ..Default::default()
        }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Requested callback size, kept within what one render pass handles
    pub fn buffer_frames(&self) -> Option<u32> {
        self.buffer_frames
            .map(|frames| frames.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE as u32))
    }
}
