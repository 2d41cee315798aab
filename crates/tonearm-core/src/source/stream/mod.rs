//! Network stream playback
//!
//! [`StreamElement`] plays the role of a media element: it downloads, probes
//! and decodes on its own threads and owns the authoritative position.
//! [`StreamSource`] binds one element to the audio graph through its tap.

mod decoder;
mod element;
mod error;
mod progressive;
mod tap;

pub use decoder::StreamMetadata;
pub use element::{ElementEvent, MetadataReceiver, StreamElement};
pub use error::StreamError;
pub use progressive::{ProgressiveBuffer, ProgressiveReader};
pub use tap::{StreamChunk, StreamShared, StreamTapNode, CHUNK_FRAMES};

use crate::audio::AudioResult;
use crate::graph::{CommandSender, NodeHandle, NodeId};

use super::SourceNode;

/// Positions closer than this are treated as equal (s)
const POSITION_EPSILON: f64 = 1e-3;

/// A resolved stream connected into the graph
///
/// The tap stays connected for the lifetime of the source; pausing only
/// pauses the element.
pub struct StreamSource {
    element: StreamElement,
    tap: Option<NodeHandle>,
    duration: f64,
}

impl StreamSource {
    /// Connect the element's tap; the element must not have handed it out yet
    pub fn connect(
        mut element: StreamElement,
        metadata: StreamMetadata,
        sender: &CommandSender,
    ) -> AudioResult<Self> {
        let tap = match element.take_tap() {
            Some(tap) => Some(NodeHandle::connect(sender, SourceNode::Stream(tap))?),
            None => None,
        };
        Ok(Self {
            element,
            tap,
            duration: metadata.duration,
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn element(&self) -> &StreamElement {
        &self.element
    }

    /// Element position, clamped to the known duration
    pub fn position(&self) -> f64 {
        let position = self.element.current_time();
        if self.duration > 0.0 {
            position.min(self.duration)
        } else {
            position
        }
    }

    /// Start the element at `offset`
    pub fn start(&mut self, offset: f64) -> Result<(), StreamError> {
        if (self.element.current_time() - offset).abs() > POSITION_EPSILON {
            self.element.set_current_time(offset)?;
        }
        self.element.play()
    }

    pub fn halt(&mut self) {
        self.element.pause();
    }

    /// Pause and move the element to `seconds`; failures are logged
    pub fn reposition(&mut self, seconds: f64) {
        self.element.pause();
        if let Err(e) = self.element.set_current_time(seconds) {
            log::warn!("Failed to move stream to {:.2}s: {}", seconds, e);
        }
    }

    pub fn is_tap(&self, id: NodeId) -> bool {
        self.tap.as_ref().is_some_and(|h| h.id() == id)
    }

    pub fn try_event(&self) -> Option<ElementEvent> {
        self.element.try_event()
    }

    /// Detach the tap and release the element
    pub fn release(mut self) {
        self.tap = None;
        self.element.release();
    }
}
