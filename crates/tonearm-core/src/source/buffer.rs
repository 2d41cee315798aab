//! In-memory playback: a decoded buffer and its per-play transient node

use std::sync::Arc;

use crate::audio::AudioResult;
use crate::decode::DecodedAudio;
use crate::graph::{CommandSender, NodeHandle, NodeId};
use crate::types::{frames_to_seconds, seconds_to_frames, StereoBuffer, StereoSample};

use super::SourceNode;

/// Render-side reader over a shared buffer
///
/// Plays once from its start frame and reports the end exactly once.
#[derive(Debug)]
pub struct BufferPlaybackNode {
    buffer: Arc<StereoBuffer>,
    position: usize,
    finished: bool,
}

impl BufferPlaybackNode {
    pub fn new(buffer: Arc<StereoBuffer>, start_frame: usize) -> Self {
        let position = start_frame.min(buffer.len());
        Self {
            buffer,
            position,
            finished: false,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Write the next frames into `out` (pre-silenced); true once the end is reached
    pub fn render(&mut self, out: &mut [StereoSample]) -> bool {
        if self.finished {
            return false;
        }
        let remaining = &self.buffer.as_slice()[self.position..];
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.position += n;

        if self.position == self.buffer.len() {
            self.finished = true;
            return true;
        }
        false
    }
}

/// A fully decoded track ready for playback
///
/// The playback node only exists while playing. Starting again replaces it
/// with a fresh node, since a finished or disconnected node cannot restart.
#[derive(Debug)]
pub struct BufferSource {
    buffer: Arc<StereoBuffer>,
    sample_rate: u32,
    channels: u16,
    node: Option<NodeHandle>,
}

impl BufferSource {
    pub fn new(audio: DecodedAudio) -> Self {
        Self {
            buffer: Arc::new(audio.frames),
            sample_rate: audio.sample_rate,
            channels: audio.source_channels,
            node: None,
        }
    }

    pub fn duration(&self) -> f64 {
        frames_to_seconds(self.buffer.len() as u64, self.sample_rate)
    }

    pub fn frames(&self) -> usize {
        self.buffer.len()
    }

    /// Channel count of the decoded file
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Connect a new playback node starting at `offset` seconds
    pub fn start(&mut self, offset: f64, sender: &CommandSender) -> AudioResult<NodeId> {
        self.halt();
        let start_frame = seconds_to_frames(offset, self.sample_rate) as usize;
        let node = BufferPlaybackNode::new(self.buffer.clone(), start_frame);
        let handle = NodeHandle::connect(sender, SourceNode::Buffer(node))?;
        let id = handle.id();
        self.node = Some(handle);
        Ok(id)
    }

    /// Tear down the playback node, if any
    pub fn halt(&mut self) {
        self.node = None;
    }

    pub fn is_playing_node(&self, id: NodeId) -> bool {
        self.node.as_ref().is_some_and(|h| h.id() == id)
    }

    pub fn has_node(&self) -> bool {
        self.node.is_some()
    }
}
