//! Player error types

use thiserror::Error;

use crate::audio::AudioError;
use crate::decode::DecodeError;
use crate::source::StreamError;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// The loaded bytes are not decodable audio
    #[error("Failed to decode audio: {0}")]
    Decode(#[from] DecodeError),

    /// The URL could not be opened or its metadata never resolved
    #[error("Failed to load stream: {0}")]
    StreamLoad(#[from] StreamError),

    /// The source refused to start; logged by `play`, never returned from it
    #[error("Playback could not start: {0}")]
    PlaybackStart(String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// A newer load replaced this one before it finished
    #[error("Load superseded by a newer request")]
    Superseded,

    #[error("Equalizer band {0} does not exist")]
    BandOutOfRange(usize),

    #[error("Invalid {0}")]
    InvalidParameter(&'static str),
}

pub type PlayerResult<T> = Result<T, PlayerError>;
