use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
use tracing::{error, info, warn};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{AvatalkError, Result},
};

/// Handle to an open microphone stream.
///
/// **Not `Send`.** Create and drop on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    _stream: Stream,
    /// Cleared to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, falling back to the default
    /// input device and then the first available one.
    ///
    /// # Errors
    /// `AvatalkError::NoDefaultInputDevice` when the host has no input at all,
    /// `AvatalkError::MediaAccess` when the device refuses to open.
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let preferred = preferred_device_name.and_then(|wanted| {
            let found = host
                .input_devices()
                .map_err(|e| warn!("failed to list input devices: {e}"))
                .ok()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
            if found.is_none() {
                warn!("preferred input device '{wanted}' not found, falling back");
            }
            found
        });

        let device = match preferred.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                warn!("no default input device, falling back to first available input");
                host.input_devices()
                    .map_err(|e| AvatalkError::MediaAccess(e.to_string()))?
                    .next()
                    .ok_or(AvatalkError::NoDefaultInputDevice)?
            }
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| AvatalkError::MediaAccess(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let config: StreamConfig = supported.config();
        info!(sample_rate, channels = config.channels, "audio config selected");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_mono_stream::<f32>(&device, &config, producer, &running),
            SampleFormat::I16 => build_mono_stream::<i16>(&device, &config, producer, &running),
            SampleFormat::U8 => build_mono_stream::<u8>(&device, &config, producer, &running),
            fmt => {
                return Err(AvatalkError::MediaAccess(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| AvatalkError::MediaAccess(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Build an input stream that averages all channels into mono f32.
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: &Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let running = Arc::clone(running);
    let mut mix_buf: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / channels;
                mix_buf.resize(frames, 0.0);
                for (out, frame) in mix_buf.iter_mut().zip(data.chunks_exact(channels)) {
                    let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
                    *out = sum / channels as f32;
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!("ring buffer full: dropped {} frames", mix_buf.len() - written);
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| AvatalkError::MediaAccess(e.to_string()))
}
