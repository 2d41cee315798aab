//! State shared between a stream element, its decoder and its tap node
//!
//! The decoder thread pushes fixed-size chunks into an `rtrb` ring. The tap
//! node pops them on the render path. Every chunk carries the seek epoch it
//! was decoded for, so a seek only has to bump the epoch to invalidate
//! everything already queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::types::{frames_to_seconds, StereoSample};

/// Frames per decoded chunk
pub const CHUNK_FRAMES: usize = 1024;

/// No end of stream reached in any epoch
const NO_EOF: u64 = u64::MAX;

/// The position word keeps frames in its low bits and the epoch they were
/// counted in above them, so a seek and a render advance cannot interleave
const FRAME_BITS: u32 = 40;
const FRAME_MASK: u64 = (1 << FRAME_BITS) - 1;

#[inline]
fn pack_position(epoch: u64, frame: u64) -> u64 {
    (epoch << FRAME_BITS) | (frame & FRAME_MASK)
}

#[inline]
fn epoch_tag(epoch: u64) -> u64 {
    epoch & (u64::MAX >> FRAME_BITS)
}

/// A block of decoded frames at the context rate
pub struct StreamChunk {
    pub epoch: u64,
    pub len: usize,
    pub frames: [StereoSample; CHUNK_FRAMES],
}

impl StreamChunk {
    pub fn new(epoch: u64, samples: &[StereoSample]) -> Self {
        let len = samples.len().min(CHUNK_FRAMES);
        let mut frames = [StereoSample::silence(); CHUNK_FRAMES];
        frames[..len].copy_from_slice(&samples[..len]);
        Self { epoch, len, frames }
    }
}

/// Element state readable from every thread
#[derive(Debug)]
pub struct StreamShared {
    sample_rate: u32,
    playing: AtomicBool,
    /// Element position in context-rate frames, tagged with its epoch
    position: AtomicU64,
    epoch: AtomicU64,
    /// Epoch whose last chunk has been queued
    eof_epoch: AtomicU64,
    released: AtomicBool,
    failed: AtomicBool,
}

impl StreamShared {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            eof_epoch: AtomicU64::new(NO_EOF),
            released: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Acquire) & FRAME_MASK
    }

    pub fn position_secs(&self) -> f64 {
        frames_to_seconds(self.position_frames(), self.sample_rate)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Move to `frame`, invalidating queued chunks; returns the new epoch
    pub fn reposition(&self, frame: u64) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.position.store(pack_position(epoch, frame), Ordering::Release);
        epoch
    }

    /// Count `frames` as played in `epoch`
    ///
    /// Returns false without moving the position once a seek has replaced
    /// `epoch`.
    pub fn advance(&self, epoch: u64, frames: u64) -> bool {
        self.position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                (word >> FRAME_BITS == epoch_tag(epoch))
                    .then(|| pack_position(epoch, (word & FRAME_MASK) + frames))
            })
            .is_ok()
    }

    /// Called by the decoder once the last chunk of `epoch` is queued
    pub fn mark_eof(&self, epoch: u64) {
        self.eof_epoch.store(epoch, Ordering::Release);
    }

    fn is_eof(&self, epoch: u64) -> bool {
        self.eof_epoch.load(Ordering::Acquire) == epoch
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn mark_released(&self) {
        self.released.store(true, Ordering::Release);
        self.set_playing(false);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::Release);
        if failed {
            self.set_playing(false);
        }
    }
}

/// Render-side end of a stream: plays queued chunks while the element plays
///
/// Stays connected after the end of the stream, since the element can be
/// rewound and played again.
pub struct StreamTapNode {
    shared: std::sync::Arc<StreamShared>,
    chunks: rtrb::Consumer<StreamChunk>,
    current: Option<StreamChunk>,
    cursor: usize,
    epoch: u64,
    ended_epoch: Option<u64>,
}

impl StreamTapNode {
    pub fn new(shared: std::sync::Arc<StreamShared>, chunks: rtrb::Consumer<StreamChunk>) -> Self {
        let epoch = shared.epoch();
        Self {
            shared,
            chunks,
            current: None,
            cursor: 0,
            epoch,
            ended_epoch: None,
        }
    }

    /// Next chunk of the current epoch, discarding stale ones
    fn next_chunk(&mut self) -> Option<StreamChunk> {
        while let Ok(chunk) = self.chunks.pop() {
            if chunk.epoch >= self.epoch {
                return Some(chunk);
            }
        }
        None
    }

    /// Write the next frames into `out` (pre-silenced); true when the stream ends
    pub fn render(&mut self, out: &mut [StereoSample]) -> bool {
        let epoch = self.shared.epoch();
        if epoch != self.epoch {
            self.epoch = epoch;
            if self.current.as_ref().is_some_and(|c| c.epoch != epoch) {
                self.current = None;
            }
        }
        if !self.shared.is_playing() {
            return false;
        }

        let mut written = 0;
        let mut ended = false;
        while written < out.len() {
            let exhausted = self.current.as_ref().map_or(true, |c| self.cursor >= c.len);
            if exhausted {
                // Load the flag before popping so the final chunk is never skipped
                let eof = self.shared.is_eof(epoch);
                match self.next_chunk() {
                    Some(chunk) if chunk.epoch == epoch => {
                        self.current = Some(chunk);
                        self.cursor = 0;
                    }
                    Some(chunk) => {
                        // Decoded for a seek newer than this quantum
                        self.current = Some(chunk);
                        self.cursor = 0;
                        break;
                    }
                    None => {
                        self.current = None;
                        ended = eof;
                        break;
                    }
                }
            }
            if let Some(chunk) = &self.current {
                let n = (chunk.len - self.cursor).min(out.len() - written);
                out[written..written + n].copy_from_slice(&chunk.frames[self.cursor..self.cursor + n]);
                self.cursor += n;
                written += n;
            }
        }

        if written > 0 {
            self.shared.advance(epoch, written as u64);
        }

        if ended && self.ended_epoch != Some(epoch) {
            self.ended_epoch = Some(epoch);
            self.shared.set_playing(false);
            return true;
        }
        false
    }
}
