//! Tonearm Core - playback engine with equalizer and sound field

pub mod audio;
pub mod config;
pub mod decode;
pub mod dsp;
pub mod equalizer;
pub mod graph;
pub mod player;
pub mod sound_field;
pub mod source;
pub mod types;

#[cfg(test)]
mod test_support;

pub use player::{PlaybackState, Player, PlayerError, PlayerResult};
pub use types::*;
