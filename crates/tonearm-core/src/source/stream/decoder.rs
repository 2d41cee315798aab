//! Stream decoder thread
//!
//! Probes the progressive download for metadata, then decodes ahead of the
//! tap node into the chunk ring. Seeks arrive as commands tagged with the
//! epoch the element moved to.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{SeekMode, SeekTo};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tokio::sync::oneshot;

use super::error::StreamError;
use super::progressive::ProgressiveBuffer;
use super::tap::{StreamChunk, StreamShared, CHUNK_FRAMES};
use super::ElementEvent;
use crate::decode::{open_track, OpenedTrack, PacketConverter};
use crate::dsp::StereoResampler;
use crate::types::StereoSample;

/// How long to wait for ring space before checking commands again
const RING_POLL: Duration = Duration::from_millis(5);

/// What the stream resolved to once its header was probed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamMetadata {
    /// Seconds; 0 when the container does not declare a length
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

pub enum DecoderCommand {
    /// Continue from `frame` (context rate), stamping chunks with `epoch`
    Seek { frame: u64, epoch: u64 },
    Shutdown,
}

pub struct DecoderSetup {
    pub buffer: Arc<ProgressiveBuffer>,
    pub shared: Arc<StreamShared>,
    pub chunks: rtrb::Producer<StreamChunk>,
    pub commands: Receiver<DecoderCommand>,
    pub events: Sender<ElementEvent>,
    pub metadata: oneshot::Sender<Result<StreamMetadata, StreamError>>,
    pub hint: Hint,
}

/// Thread entry point: resolve metadata, then decode until shut down
pub fn run(setup: DecoderSetup) {
    let DecoderSetup {
        buffer,
        shared,
        chunks,
        commands,
        events,
        metadata,
        hint,
    } = setup;

    let track = match open_track(Box::new(buffer.reader()), &hint) {
        Ok(track) => track,
        Err(e) => {
            let error = if shared.is_released() {
                StreamError::Released
            } else {
                buffer.failure().unwrap_or(StreamError::Metadata(e.to_string()))
            };
            log::debug!("Stream probe failed: {}", error);
            let _ = metadata.send(Err(error));
            return;
        }
    };

    let resampler = match StereoResampler::new(track.sample_rate, shared.sample_rate()) {
        Ok(resampler) => resampler,
        Err(e) => {
            let _ = metadata.send(Err(StreamError::Metadata(e.to_string())));
            return;
        }
    };

    let info = StreamMetadata {
        duration: track
            .n_frames
            .map(|n| n as f64 / track.sample_rate as f64)
            .unwrap_or(0.0),
        sample_rate: track.sample_rate,
        channels: track.channels,
    };
    if metadata.send(Ok(info)).is_err() {
        // Nobody is waiting anymore
        return;
    }
    log::debug!(
        "Stream metadata: {:.2}s, {}Hz, {} ch",
        info.duration,
        info.sample_rate,
        info.channels
    );

    let mut decoder = StreamDecoder {
        track,
        resampler,
        converter: PacketConverter::default(),
        packet_frames: Vec::new(),
        pending: Vec::with_capacity(CHUNK_FRAMES * 4),
        chunks,
        shared,
        events,
        epoch: 0,
        skip_frames: 0,
        state: DecodeState::Decoding,
    };
    decoder.run(&commands);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Decoding,
    /// Input exhausted, flushing what is left
    Draining,
    /// Waiting for a seek or shutdown
    Idle,
}

struct StreamDecoder {
    track: OpenedTrack,
    resampler: StereoResampler,
    converter: PacketConverter,
    packet_frames: Vec<StereoSample>,
    /// Resampled frames not yet queued
    pending: Vec<StereoSample>,
    chunks: rtrb::Producer<StreamChunk>,
    shared: Arc<StreamShared>,
    events: Sender<ElementEvent>,
    epoch: u64,
    /// Source frames to drop after an inexact seek
    skip_frames: u64,
    state: DecodeState,
}

impl StreamDecoder {
    fn run(&mut self, commands: &Receiver<DecoderCommand>) {
        loop {
            let command = if self.state == DecodeState::Idle {
                match commands.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => return,
                }
            } else {
                match commands.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return,
                }
            };

            match command {
                Some(DecoderCommand::Shutdown) => return,
                Some(DecoderCommand::Seek { frame, epoch }) => {
                    self.seek(frame, epoch);
                    continue;
                }
                None => {}
            }
            if self.shared.is_released() {
                return;
            }

            let draining = self.state == DecodeState::Draining;
            self.queue_chunks(draining);

            let ring_full = self.chunks.slots() == 0 && !self.pending.is_empty();
            if ring_full || (draining && !self.pending.is_empty()) || self.pending.len() >= CHUNK_FRAMES {
                match commands.recv_timeout(RING_POLL) {
                    Ok(DecoderCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                    Ok(DecoderCommand::Seek { frame, epoch }) => self.seek(frame, epoch),
                    Err(RecvTimeoutError::Timeout) => {}
                }
                continue;
            }

            match self.state {
                DecodeState::Decoding => self.decode_next(),
                DecodeState::Draining => {
                    self.shared.mark_eof(self.epoch);
                    self.state = DecodeState::Idle;
                }
                DecodeState::Idle => {}
            }
        }
    }

    /// Move full chunks (and the final partial one when draining) into the ring
    fn queue_chunks(&mut self, draining: bool) {
        while self.chunks.slots() > 0 {
            let n = if self.pending.len() >= CHUNK_FRAMES {
                CHUNK_FRAMES
            } else if draining && !self.pending.is_empty() {
                self.pending.len()
            } else {
                break;
            };
            let chunk = StreamChunk::new(self.epoch, &self.pending[..n]);
            if self.chunks.push(chunk).is_err() {
                break;
            }
            self.pending.drain(..n);
        }
    }

    fn decode_next(&mut self) {
        let packet = match self.track.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish_input();
                return;
            }
            Err(e) => {
                self.fail(StreamError::Decode(e.to_string()));
                return;
            }
        };
        if packet.track_id() != self.track.track_id {
            return;
        }

        let decoded = match self.track.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Error decoding stream packet: {}", e);
                return;
            }
            Err(e) => {
                self.fail(StreamError::Decode(e.to_string()));
                return;
            }
        };

        self.packet_frames.clear();
        self.converter.append(decoded, &mut self.packet_frames);

        let skip = (self.skip_frames as usize).min(self.packet_frames.len());
        self.skip_frames -= skip as u64;
        if let Err(e) = self.resampler.push(&self.packet_frames[skip..], &mut self.pending) {
            self.fail(StreamError::Decode(e.to_string()));
        }
    }

    fn finish_input(&mut self) {
        if let Err(e) = self.resampler.finish(&mut self.pending) {
            log::warn!("Failed to flush stream resampler: {}", e);
        }
        self.state = DecodeState::Draining;
    }

    fn seek(&mut self, frame: u64, epoch: u64) {
        self.epoch = epoch;
        self.pending.clear();
        self.resampler.reset();
        self.track.decoder.reset();

        let source_rate = self.track.sample_rate;
        let seconds = frame as f64 / self.shared.sample_rate() as f64;
        let seek_to = SeekTo::Time {
            time: Time::from(seconds),
            track_id: Some(self.track.track_id),
        };

        match self.track.format.seek(SeekMode::Accurate, seek_to) {
            Ok(seeked) => {
                let ts_delta = seeked.required_ts.saturating_sub(seeked.actual_ts);
                self.skip_frames = match self.track.time_base {
                    Some(tb) => {
                        let time = tb.calc_time(ts_delta);
                        ((time.seconds as f64 + time.frac) * source_rate as f64).round() as u64
                    }
                    None => ts_delta,
                };
                self.shared.set_failed(false);
                self.state = DecodeState::Decoding;
            }
            Err(e) => {
                self.fail(StreamError::Decode(format!("seek to {:.2}s failed: {}", seconds, e)));
            }
        }
    }

    fn fail(&mut self, error: StreamError) {
        if self.shared.is_released() {
            return;
        }
        log::warn!("Stream decoder stopped: {}", error);
        self.shared.set_failed(true);
        self.state = DecodeState::Idle;
        let _ = self.events.send(ElementEvent::Failed(error));
    }
}
