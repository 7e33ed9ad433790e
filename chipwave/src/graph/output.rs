//! cpal output stream hosting the render callback

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::GraphRenderer;
use crate::decoder::ChipDecoder;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No audio output device available")]
    NoDevice,
    #[error("Failed to get default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("Failed to query output configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("Failed to play audio stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("Failed to pause audio stream: {0}")]
    Pause(#[from] cpal::PauseStreamError),
}

/// Pick an output config at `sample_rate`, falling back to the device default
fn choose_config(
    device: &cpal::Device,
    sample_rate: u32,
) -> Result<cpal::SupportedStreamConfig, OutputError> {
    let rate = cpal::SampleRate(sample_rate);
    let preferred = device
        .supported_output_configs()?
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter(|range| {
            matches!(
                range.sample_format(),
                cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
            )
        })
        .min_by_key(|range| {
            let format_rank = match range.sample_format() {
                cpal::SampleFormat::F32 => 0,
                cpal::SampleFormat::I16 => 1,
                _ => 2,
            };
            (range.channels() != 2, format_rank)
        });

    match preferred {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => {
            let config = device.default_output_config()?;
            warn!(
                "Device does not support {}Hz, using {}Hz (playback pitch will be off)",
                sample_rate,
                config.sample_rate().0
            );
            Ok(config)
        }
    }
}

fn build<T, D>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: GraphRenderer<D>,
) -> Result<cpal::Stream, OutputError>
where
    T: SizedSample + FromSample<f32>,
    D: ChipDecoder,
{
    let channels = config.channels as usize;
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            renderer.process(data, channels);
        },
        |err| error!("Audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Open the default output device and move `renderer` into its callback
///
/// The stream is returned suspended. Returns the stream and its sample rate.
pub fn open_stream<D: ChipDecoder>(
    renderer: GraphRenderer<D>,
    sample_rate: u32,
) -> Result<(cpal::Stream, u32), OutputError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(OutputError::NoDevice)?;

    let supported = choose_config(&device, sample_rate)?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build::<f32, D>(&device, &config, renderer)?,
        cpal::SampleFormat::I16 => build::<i16, D>(&device, &config, renderer)?,
        cpal::SampleFormat::U16 => build::<u16, D>(&device, &config, renderer)?,
        other => return Err(OutputError::UnsupportedFormat(format!("{:?}", other))),
    };

    // Some backends start streams immediately; the graph starts suspended.
    if let Err(e) = stream.pause() {
        warn!("Could not suspend new audio stream: {}", e);
    }

    debug!(
        "Audio stream opened at {}Hz, {} channels, {:?}",
        config.sample_rate.0, config.channels, sample_format
    );
    Ok((stream, config.sample_rate.0))
}
