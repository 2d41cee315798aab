//! Playback sources
//!
//! Two interchangeable sources share one playback contract:
//! - [`BufferSource`]: a decoded file; a fresh node per play, the context
//!   clock is authoritative
//! - [`StreamSource`]: a network stream; one tap for its lifetime, the
//!   element's position is authoritative
//!
//! [`SourceNode`] is what the renderer sees of either.

pub mod buffer;
pub mod stream;

pub use buffer::{BufferPlaybackNode, BufferSource};
pub use stream::{
    ElementEvent, StreamElement, StreamError, StreamMetadata, StreamSource, StreamTapNode,
};

use crate::graph::NodeId;
use crate::types::StereoSample;

/// Render-side half of a source
pub enum SourceNode {
    Buffer(BufferPlaybackNode),
    Stream(StreamTapNode),
}

impl SourceNode {
    /// Render into `out` (pre-silenced); true when the source reached its end
    pub fn render(&mut self, out: &mut [StereoSample]) -> bool {
        match self {
            SourceNode::Buffer(node) => node.render(out),
            SourceNode::Stream(node) => node.render(out),
        }
    }

    /// Whether the node stays connected after reporting its end
    pub fn outlives_end(&self) -> bool {
        matches!(self, SourceNode::Stream(_))
    }
}

/// The active source of a player
pub enum Source {
    Buffer(BufferSource),
    Stream(StreamSource),
}

impl Source {
    pub fn duration(&self) -> f64 {
        match self {
            Source::Buffer(source) => source.duration(),
            Source::Stream(source) => source.duration(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Source::Stream(_))
    }

    /// Whether `id` is the node this source has connected
    pub fn owns_node(&self, id: NodeId) -> bool {
        match self {
            Source::Buffer(source) => source.is_playing_node(id),
            Source::Stream(source) => source.is_tap(id),
        }
    }

    /// Stop producing audio, keeping the source loaded
    pub fn halt(&mut self) {
        match self {
            Source::Buffer(source) => source.halt(),
            Source::Stream(source) => source.halt(),
        }
    }

    /// Tear down everything the source connected or spawned
    pub fn release(self) {
        match self {
            Source::Buffer(mut source) => source.halt(),
            Source::Stream(source) => source.release(),
        }
    }
}
