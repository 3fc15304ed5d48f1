//! Output side: the real-time fill routine and the device that drives it
//!
//! [`OutputDriver::render`] runs inside the device callback. It takes one
//! level snapshot per call, pulls frames from the chunk buffer, scales them and
//! pads any shortfall with silence. It never allocates, logs or waits on
//! anything but the chunk buffer's short critical section.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig};
use std::sync::Arc;
use thiserror::Error;

use super::buffer::{ChunkBuffer, Frame};
use super::level::LevelControl;
use super::stats::Diagnostics;
use crate::settings::AudioSettings;

/// Errors that can occur while acquiring the output device
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available")]
    NoDevice,

    #[error("Failed to get default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to play audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),

    #[error("Invalid audio settings: {0}")]
    InvalidSettings(String),
}

/// Fills device blocks from the chunk buffer
#[derive(Clone)]
pub struct OutputDriver {
    buffer: Arc<ChunkBuffer>,
    level: Arc<LevelControl>,
    stats: Arc<Diagnostics>,
    /// Preallocated staging for pulled frames
    scratch: Vec<Frame>,
}

impl OutputDriver {
    pub fn new(
        buffer: Arc<ChunkBuffer>,
        level: Arc<LevelControl>,
        stats: Arc<Diagnostics>,
        block_frames: usize,
    ) -> Self {
        Self {
            buffer,
            level,
            stats,
            scratch: vec![Frame::SILENCE; block_frames.max(1)],
        }
    }

    /// Fill one interleaved device block with `channels` samples per frame.
    ///
    /// Blocks longer than the scratch space are filled in segments, so any
    /// length the device asks for is served without allocating.
    pub fn render<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        if channels == 0 {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let level = self.level.snapshot();
        if level.muted {
            data.fill(T::EQUILIBRIUM);
            // Don't let latency pile up behind the mute
            self.buffer.clear();
            return;
        }

        let mut padded = 0;
        for segment in data.chunks_mut(self.scratch.len() * channels) {
            let wanted = segment.len() / channels;
            let got = self.buffer.pull_into(&mut self.scratch[..wanted]);

            let (filled, rest) = segment.split_at_mut(got * channels);
            for (out, frame) in filled.chunks_mut(channels).zip(&self.scratch[..got]) {
                write_frame(out, frame.scaled(level.volume));
            }
            rest.fill(T::EQUILIBRIUM);
            padded += wanted - got;
        }

        if padded > 0 {
            self.stats.record_underrun(padded as u64);
        }
    }
}

/// Write one frame into a device frame of any channel count
#[inline]
fn write_frame<T>(out: &mut [T], frame: Frame)
where
    T: SizedSample + FromSample<f32>,
{
    match out {
        [] => {}
        [mono] => *mono = to_device(0.5 * (frame.left + frame.right)),
        [left, right, rest @ ..] => {
            *left = to_device(frame.left);
            *right = to_device(frame.right);
            rest.fill(T::EQUILIBRIUM);
        }
    }
}

#[inline]
fn to_device<T>(value: f32) -> T
where
    T: SizedSample + FromSample<f32>,
{
    <T as Sample>::from_sample(value.clamp(-1.0, 1.0))
}

/// Something that can run an [`OutputDriver`] on a real-time schedule
///
/// The returned stream keeps the device alive; dropping it releases the device
/// and the driver with it.
pub trait OutputBackend {
    type Stream;

    fn open(
        &mut self,
        settings: &AudioSettings,
        driver: OutputDriver,
    ) -> Result<Self::Stream, AudioError>;
}

/// Default output device via cpal
pub struct CpalBackend {
    host: cpal::Host,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl OutputBackend for CpalBackend {
    type Stream = cpal::Stream;

    fn open(
        &mut self,
        settings: &AudioSettings,
        driver: OutputDriver,
    ) -> Result<cpal::Stream, AudioError> {
        let device = self
            .host
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using output device: {}", device_name);

        let supported = device.default_output_config()?;
        log::debug!("Device default config: {:?}", supported);

        let block_frames = u32::try_from(settings.block_frames).map_err(|_| {
            AudioError::InvalidSettings(format!("block size {} too large", settings.block_frames))
        })?;
        let requested = StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(settings.sample_rate),
            buffer_size: BufferSize::Fixed(block_frames),
        };

        let format = supported.sample_format();
        let stream = match build_stream(&device, format, &requested, driver.clone()) {
            Ok(stream) => stream,
            Err(AudioError::BuildStream(e)) => {
                let fallback = supported.config();
                log::warn!(
                    "Device rejected {} Hz / {} frame blocks ({}), falling back to {:?}",
                    settings.sample_rate,
                    block_frames,
                    e,
                    fallback
                );
                build_stream(&device, format, &fallback, driver)?
            }
            Err(e) => return Err(e),
        };

        stream.play()?;
        log::info!("Audio output started");
        Ok(stream)
    }
}

fn build_stream(
    device: &cpal::Device,
    format: SampleFormat,
    config: &StreamConfig,
    driver: OutputDriver,
) -> Result<cpal::Stream, AudioError> {
    let stream = match format {
        SampleFormat::F32 => build_typed_stream::<f32>(device, config, driver)?,
        SampleFormat::I16 => build_typed_stream::<i16>(device, config, driver)?,
        SampleFormat::U16 => build_typed_stream::<u16>(device, config, driver)?,
        other => return Err(AudioError::UnsupportedFormat(other)),
    };
    Ok(stream)
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut driver: OutputDriver,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32> + 'static,
{
    let channels = config.channels as usize;
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| driver.render(data, channels),
        |err| log::error!("Audio output error: {}", err),
        None,
    )
}
