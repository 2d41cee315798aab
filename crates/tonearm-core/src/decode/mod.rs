//! Audio file decoding using symphonia
//!
//! Turns a complete file held in memory into a stereo buffer at the context
//! sample rate. The probing and channel folding helpers are shared with the
//! streaming decoder, which feeds the same pipeline from a progressive
//! download.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use thiserror::Error;

use crate::dsp::{ResamplerError, StereoResampler};
use crate::types::{StereoBuffer, StereoSample};

#[derive(Error, Debug)]
pub enum DecodeError {
    /// The bytes are not in a format any enabled demuxer recognizes
    #[error("Unsupported or malformed audio: {0}")]
    Unsupported(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Unknown sample rate")]
    UnknownSampleRate,

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Decoded audio is empty")]
    Empty,

    #[error(transparent)]
    Resample(#[from] ResamplerError),

    /// A newer load cancelled this decode
    #[error("Decode cancelled")]
    Cancelled,

    #[error("Failed to start decoder thread: {0}")]
    Spawn(String),
}

/// A decoded file, converted to stereo at the context rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub frames: StereoBuffer,
    /// Rate of `frames`
    pub sample_rate: u32,
    /// Rate of the file before resampling
    pub source_rate: u32,
    /// Channel count of the file before folding to stereo
    pub source_channels: u16,
}

/// A probed container with a decoder for its first audio track
pub struct OpenedTrack {
    pub format: Box<dyn FormatReader>,
    pub decoder: Box<dyn Decoder>,
    pub track_id: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Total frames, when the container declares it
    pub n_frames: Option<u64>,
    pub time_base: Option<TimeBase>,
}

/// Probe a media source and set up a decoder for its first audio track
pub fn open_track(source: Box<dyn MediaSource>, hint: &Hint) -> Result<OpenedTrack, DecodeError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or(DecodeError::UnknownSampleRate)?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);
    let n_frames = track.codec_params.n_frames;
    let time_base = track.codec_params.time_base;

    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    Ok(OpenedTrack {
        format,
        decoder,
        track_id,
        sample_rate,
        channels,
        n_frames,
        time_base,
    })
}

/// Reusable interleaving scratch for decoded packets
#[derive(Default)]
pub struct PacketConverter {
    sample_buf: Option<SampleBuffer<f32>>,
}

impl PacketConverter {
    /// Append the packet as stereo frames: mono is duplicated, extra channels dropped
    pub fn append(&mut self, decoded: AudioBufferRef<'_>, out: &mut Vec<StereoSample>) {
        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let needed = decoded.capacity() * channels;

        if self.sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            self.sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = self.sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            fold_to_stereo(buf.samples(), channels, out);
        }
    }
}

/// Fold interleaved samples with `channels` channels into stereo frames
pub fn fold_to_stereo(samples: &[f32], channels: usize, out: &mut Vec<StereoSample>) {
    match channels {
        0 => {}
        1 => out.extend(samples.iter().map(|&s| StereoSample::mono(s))),
        _ => out.extend(
            samples
                .chunks_exact(channels)
                .map(|frame| StereoSample::new(frame[0], frame[1])),
        ),
    }
}

/// Decode a complete file held in memory
///
/// `cancel` is polled between packets so a superseded load stops early.
pub fn decode_audio(
    bytes: Vec<u8>,
    target_rate: u32,
    cancel: &AtomicBool,
) -> Result<DecodedAudio, DecodeError> {
    let OpenedTrack {
        mut format,
        mut decoder,
        track_id,
        sample_rate,
        channels,
        n_frames,
        ..
    } = open_track(Box::new(Cursor::new(bytes)), &Hint::new())?;

    let mut resampler = StereoResampler::new(sample_rate, target_rate)?;
    let mut converter = PacketConverter::default();
    let mut packet_frames: Vec<StereoSample> = Vec::new();
    let expected = n_frames
        .map(|n| (n as f64 * target_rate as f64 / sample_rate as f64).ceil() as usize)
        .unwrap_or(0);
    let mut frames: Vec<StereoSample> = Vec::with_capacity(expected);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(DecodeError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
            Err(e) => {
                log::warn!("Decoder stopped: {}", e);
                break;
            }
        };

        packet_frames.clear();
        converter.append(decoded, &mut packet_frames);
        resampler.push(&packet_frames, &mut frames)?;
    }
    resampler.finish(&mut frames)?;

    if frames.is_empty() {
        return Err(DecodeError::Empty);
    }

    log::debug!(
        "Decoded {} frames ({}Hz, {} ch) -> {}Hz",
        frames.len(),
        sample_rate,
        channels,
        target_rate
    );

    Ok(DecodedAudio {
        frames: StereoBuffer::from_vec(frames),
        sample_rate: target_rate,
        source_rate: sample_rate,
        source_channels: channels,
    })
}
