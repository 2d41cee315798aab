//! cpal device output
//!
//! ```text
//! ┌──────────────────┐   push()   ┌─────────────────────┐
//! │  control thread  │──────────►│   command queue     │
//! │ (player, loads)  │           │  (lock-free SPSC)   │
//! └──────────────────┘           └──────────┬──────────┘
//!          ▲                                │ pop()
//!          │ pop()                          ▼
//! ┌──────────────────┐   push()   ┌─────────────────────┐
//! │   event queue    │◄──────────│  cpal audio thread  │
//! └──────────────────┘           │  (owns Renderer)    │
//!                                └─────────────────────┘
//! ```
//!
//! `cpal::Stream` is not `Send`, so the stream is created, played and dropped
//! on a dedicated `tonearm-output` thread that parks until shutdown.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};
use crossbeam::channel::{self, Sender};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{default_device, find_device_by_id};
use super::error::{AudioError, AudioResult};
use crate::graph::{RenderClock, Renderer};
use crate::types::StereoSample;

/// A running device output
///
/// Dropping it stops the stream and joins the output thread.
pub struct DeviceOutput {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    clock: Arc<RenderClock>,
}

impl DeviceOutput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock(&self) -> &Arc<RenderClock> {
        &self.clock
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Audio output thread panicked");
            }
        }
    }
}

/// Open the configured device and start rendering
///
/// `make_renderer` runs on the output thread once the device rate is known.
pub fn start_device_output<F>(config: &AudioConfig, make_renderer: F) -> AudioResult<DeviceOutput>
where
    F: FnOnce(u32) -> Renderer + Send + 'static,
{
    let config = config.clone();
    let (ready_tx, ready_rx) = channel::bounded::<AudioResult<(u32, Arc<RenderClock>)>>(1);
    let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

    let thread = thread::Builder::new()
        .name("tonearm-output".to_string())
        .spawn(move || {
            let stream = match open_stream(&config, make_renderer) {
                Ok((stream, sample_rate, clock)) => {
                    let _ = ready_tx.send(Ok((sample_rate, clock)));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            // Park until the context closes
            let _ = shutdown_rx.recv();
            drop(stream);
            log::info!("Audio output stopped");
        })
        .map_err(|e| AudioError::OutputThread(e.to_string()))?;

    let (sample_rate, clock) = ready_rx
        .recv()
        .map_err(|_| AudioError::OutputThread("output thread exited during setup".to_string()))??;

    Ok(DeviceOutput {
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
        sample_rate,
        clock,
    })
}

fn open_stream<F>(
    config: &AudioConfig,
    make_renderer: F,
) -> AudioResult<(Stream, u32, Arc<RenderClock>)>
where
    F: FnOnce(u32) -> Renderer,
{
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => default_device()?,
    };

    let supported = choose_output_config(&device, config.target_sample_rate())?;
    let sample_rate = supported.sample_rate().0;
    let mut stream_config: StreamConfig = supported.into();
    if let Some(frames) = config.buffer_frames() {
        stream_config.buffer_size = CpalBufferSize::Fixed(frames);
    }

    let renderer = make_renderer(sample_rate);
    let clock = renderer.clock().clone();
    let stream = build_output_stream(&device, &stream_config, renderer)?;
    stream.play()?;

    log::info!(
        "Output open on '{}' at {}Hz, {} channels, buffer {:?}",
        device.name().unwrap_or_default(),
        sample_rate,
        stream_config.channels,
        stream_config.buffer_size,
    );
    Ok((stream, sample_rate, clock))
}

/// Pick the f32 output configuration closest to `target_rate`
///
/// Stereo ranges containing the rate win, then any stereo range at its
/// highest rate, then mono. Non-f32 devices are rejected.
fn choose_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let ranges: Vec<_> = device.supported_output_configs()?.collect();
    let Some(first) = ranges.first() else {
        return Err(AudioError::NoOutputConfig);
    };

    let contains = |r: &cpal::SupportedStreamConfigRange| {
        (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&target_rate)
    };
    let rank = |r: &cpal::SupportedStreamConfigRange| (r.channels() >= 2, contains(r));

    let best = ranges
        .iter()
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .max_by_key(|r| rank(r))
        .ok_or(AudioError::UnsupportedFormat(first.sample_format()))?;

    let rate = if contains(best) {
        target_rate
    } else {
        let fallback = best.max_sample_rate().0;
        log::warn!(
            "Device cannot run at {}Hz, using {}Hz; decoded audio is resampled to match",
            target_rate,
            fallback
        );
        fallback
    };
    Ok(best.clone().with_sample_rate(cpal::SampleRate(rate)))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: Renderer,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let mut scratch = vec![StereoSample::silence(); MAX_BUFFER_SIZE];

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for block in data.chunks_mut(channels * MAX_BUFFER_SIZE) {
                    let n_frames = block.len() / channels;
                    let frames = &mut scratch[..n_frames];
                    renderer.render(frames);

                    for (frame, sample) in block.chunks_mut(channels).zip(frames.iter()) {
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(AudioError::from)
}
