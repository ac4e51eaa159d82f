//! Microphone capture via the cpal backend.
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must not allocate after warm-up, block on a lock, or log. Samples are
//! downmixed to mono and pushed into the SPSC ring producer, whose
//! `push_slice` is lock-free. Overflow is counted in an atomic and reported
//! from the driver thread.
//!
//! `cpal::Stream` is `!Send` on Windows and macOS, so `AudioCapture` must be
//! created and dropped on the same thread. The engine opens it inside its
//! blocking driver thread.

pub mod device;
pub mod resample;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SizedSample, Stream, StreamConfig,
};

use crate::{
    buffering::AudioProducer,
    error::{Result, VoxcueError},
};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active input stream.
///
/// Not `Send`: keep it on the thread that opened it.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    overflow: Arc<AtomicU64>,
    /// Rate the device actually delivers (Hz).
    pub sample_rate: u32,
    /// Name of the opened device, when the OS reports one.
    pub device_name: Option<String>,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available one.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if selected_device.is_none() {
                        warn!("preferred input device '{preferred_name}' not found, falling back");
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = match selected_device.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| VoxcueError::AudioDevice(e.to_string()))?;
                warn!("no default input device, falling back to first available input");
                devices.next().ok_or(VoxcueError::NoDefaultInputDevice)?
            }
        };

        let device_name = device.name().ok();
        info!(
            device = device_name.as_deref().unwrap_or_default(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| VoxcueError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, format = ?supported.sample_format(), "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        let overflow = Arc::new(AtomicU64::new(0));
        let sink = MonoSink {
            producer,
            running: Arc::clone(&running),
            overflow: Arc::clone(&overflow),
            channels: channels.max(1) as usize,
            mix: Vec::new(),
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sink, |s| s),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sink, |s| s as f32 / 32768.0),
            SampleFormat::U8 => {
                build_stream::<u8>(&device, &config, sink, |s| (s as f32 - 128.0) / 128.0)
            }
            fmt => {
                return Err(VoxcueError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| VoxcueError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            overflow,
            sample_rate,
            device_name,
        })
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Samples discarded by the callback because the ring was full.
    pub fn overflowed_samples(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

/// Callback-side state: downmix scratch plus the ring producer.
#[cfg(feature = "audio-cpal")]
struct MonoSink {
    producer: AudioProducer,
    running: Arc<AtomicBool>,
    overflow: Arc<AtomicU64>,
    channels: usize,
    mix: Vec<f32>,
}

#[cfg(feature = "audio-cpal")]
impl MonoSink {
    fn push<T: Copy>(&mut self, data: &[T], to_f32: fn(T) -> f32) {
        use crate::buffering::Producer;

        if !self.running.load(Ordering::Relaxed) {
            return;
        }
        let frames = data.len() / self.channels;
        self.mix.resize(frames, 0.0);
        for (frame, out) in data.chunks_exact(self.channels).zip(self.mix.iter_mut()) {
            let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
            *out = sum / self.channels as f32;
        }
        let written = self.producer.push_slice(&self.mix);
        if written < self.mix.len() {
            self.overflow
                .fetch_add((self.mix.len() - written) as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(feature = "audio-cpal")]
fn build_stream<T: SizedSample + 'static>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: MonoSink,
    to_f32: fn(T) -> f32,
) -> Result<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| sink.push(data, to_f32),
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| VoxcueError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(VoxcueError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(all(test, not(feature = "audio-cpal")))]
mod tests {
    use super::*;
    use crate::buffering::create_audio_ring;

    #[test]
    fn open_reports_missing_backend() {
        let (producer, _consumer) = create_audio_ring();
        let err = AudioCapture::open_with_preference(producer, Arc::new(AtomicBool::new(true)), None)
            .err()
            .expect("no backend compiled in");
        assert!(matches!(err, VoxcueError::AudioStream(_)));
    }
}
