//! Capture Buffer: device ring → looping clip → pending-window queue.
//!
//! `poll` runs once per tick on the driver thread. It drains whatever the
//! audio callback pushed since the last call, converts it to the pipeline
//! rate, appends it to the looping clip, and enqueues the newest
//! `window_len` samples as an [`AudioWindow`].
//!
//! A window is only emitted once a full window has been written since start,
//! and only if new samples arrived since the previous emission.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, info, warn};

use crate::{
    audio::{
        resample::{RateConverter, DEFAULT_CHUNK_SIZE},
        AudioCapture,
    },
    buffering::{
        clip::LoopingClip, create_audio_ring, queue::WindowSender, window::AudioWindow,
        AudioConsumer, Consumer,
    },
    error::Result,
};

/// Samples drained from the device ring per pop.
const DRAIN_CHUNK: usize = 4096;

/// Geometry of the capture side.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Pipeline sample rate; device audio is converted to it.
    pub sample_rate: u32,
    /// Samples per emitted window.
    pub window_len: usize,
    /// Looping clip length in samples; never smaller than `window_len`.
    pub clip_capacity: usize,
    pub preferred_input_device: Option<String>,
}

impl CaptureConfig {
    /// Clip of `ceil(window_secs)` seconds, at least one window long.
    pub fn new(sample_rate: u32, window_secs: f32) -> Self {
        let window_len = (sample_rate as f64 * window_secs as f64).round() as usize;
        let clip_capacity = (window_secs.ceil() as usize * sample_rate as usize).max(window_len);
        Self {
            sample_rate,
            window_len,
            clip_capacity,
            preferred_input_device: None,
        }
    }
}

pub struct CaptureBuffer {
    consumer: AudioConsumer,
    converter: RateConverter,
    clip: LoopingClip,
    config: CaptureConfig,
    sender: WindowSender,
    /// `clip.total_written()` at the last emitted window.
    last_emitted: Option<u64>,
    device: Option<AudioCapture>,
    running: Arc<AtomicBool>,
    reported_overflow: u64,
    drain_buf: Vec<f32>,
    converted: Vec<f32>,
}

impl CaptureBuffer {
    /// Open the preferred (or default) input device and begin recording.
    ///
    /// Must be called on the thread that will poll and drop the buffer,
    /// because the device stream is bound to its creating thread.
    ///
    /// # Errors
    /// Device-unavailable and stream-build failures are returned here and are
    /// not retried.
    pub fn start(config: CaptureConfig, sender: WindowSender) -> Result<Self> {
        let (producer, consumer) = create_audio_ring();
        let running = Arc::new(AtomicBool::new(true));
        let device = AudioCapture::open_with_preference(
            producer,
            Arc::clone(&running),
            config.preferred_input_device.as_deref(),
        )?;
        info!(
            device = device.device_name.as_deref().unwrap_or("unknown"),
            device_rate = device.sample_rate,
            pipeline_rate = config.sample_rate,
            window_len = config.window_len,
            clip_capacity = config.clip_capacity,
            "capture started"
        );
        let device_rate = device.sample_rate;
        let mut buffer = Self::from_consumer(consumer, device_rate, config, sender)?;
        buffer.device = Some(device);
        buffer.running = running;
        Ok(buffer)
    }

    /// Build a buffer over an existing ring consumer delivering audio at
    /// `source_rate`. Used for file replay and tests.
    pub fn from_consumer(
        consumer: AudioConsumer,
        source_rate: u32,
        config: CaptureConfig,
        sender: WindowSender,
    ) -> Result<Self> {
        let converter = RateConverter::new(source_rate, config.sample_rate, DEFAULT_CHUNK_SIZE)?;
        Ok(Self {
            consumer,
            converter,
            clip: LoopingClip::new(config.clip_capacity.max(config.window_len)),
            sender,
            last_emitted: None,
            device: None,
            running: Arc::new(AtomicBool::new(true)),
            reported_overflow: 0,
            drain_buf: vec![0.0; DRAIN_CHUNK],
            converted: Vec::with_capacity(DRAIN_CHUNK),
            config,
        })
    }

    /// Drain new audio and enqueue the latest window.
    ///
    /// Returns `true` when a window was enqueued.
    pub fn poll(&mut self) -> bool {
        self.drain_ring();
        self.report_overflow();

        let total = self.clip.total_written();
        if self.last_emitted == Some(total) {
            return false;
        }
        let Some(samples) = self.clip.read_latest(self.config.window_len) else {
            return false;
        };
        self.last_emitted = Some(total);
        debug!(total_written = total, cursor = self.clip.position(), "window captured");
        self.sender
            .push(AudioWindow::new(samples, self.config.sample_rate));
        true
    }

    /// Signal the device callback to stop and release the device.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(device) = self.device.take() {
            device.stop();
            info!("capture stopped");
        }
    }

    pub fn is_recording(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Samples written to the clip since start, at the pipeline rate.
    pub fn total_written(&self) -> u64 {
        self.clip.total_written()
    }

    fn drain_ring(&mut self) {
        loop {
            let n = self.consumer.pop_slice(&mut self.drain_buf);
            if n == 0 {
                break;
            }
            self.converter
                .process_into(&self.drain_buf[..n], &mut self.converted);
            self.clip.write(&self.converted);
            self.converted.clear();
        }
    }

    fn report_overflow(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };
        let overflow = device.overflowed_samples();
        if overflow > self.reported_overflow {
            warn!(
                dropped_samples = overflow - self.reported_overflow,
                "capture ring full, device samples dropped"
            );
            self.reported_overflow = overflow;
        }
    }
}

impl Drop for CaptureBuffer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{
        queue::{window_queue, WindowReceiver},
        AudioProducer, Producer,
    };

    fn small_config() -> CaptureConfig {
        CaptureConfig {
            sample_rate: 1_000,
            window_len: 300,
            clip_capacity: 1_000,
            preferred_input_device: None,
        }
    }

    fn buffer(config: CaptureConfig) -> (AudioProducer, CaptureBuffer, WindowReceiver) {
        let (producer, consumer) = create_audio_ring();
        let (tx, rx) = window_queue(64);
        let rate = config.sample_rate;
        let capture = CaptureBuffer::from_consumer(consumer, rate, config, tx).unwrap();
        (producer, capture, rx)
    }

    #[test]
    fn clip_capacity_covers_whole_seconds() {
        let config = CaptureConfig::new(16_000, 1.0);
        assert_eq!(config.window_len, 16_000);
        assert_eq!(config.clip_capacity, 16_000);

        let config = CaptureConfig::new(16_000, 1.5);
        assert_eq!(config.window_len, 24_000);
        assert_eq!(config.clip_capacity, 32_000);
    }

    #[test]
    fn underrun_emits_nothing() {
        let (mut producer, mut capture, rx) = buffer(small_config());
        assert!(!capture.poll());
        producer.push_slice(&[0.1; 299]);
        assert!(!capture.poll());
        assert!(rx.is_empty());

        producer.push_slice(&[0.1; 1]);
        assert!(capture.poll());
        assert_eq!(rx.try_pop().map(|w| w.len()), Some(300));
    }

    #[test]
    fn no_new_samples_means_no_new_window() {
        let (mut producer, mut capture, rx) = buffer(small_config());
        producer.push_slice(&[0.2; 400]);
        assert!(capture.poll());
        assert!(!capture.poll());
        assert_eq!(rx.len(), 1);

        producer.push_slice(&[0.2; 1]);
        assert!(capture.poll());
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn windows_match_linear_history_across_wraparound() {
        let (mut producer, mut capture, rx) = buffer(small_config());
        let mut history = Vec::new();
        let mut next = 0u32;

        for step in 0..200 {
            let n = 37 + (step * 13) % 151;
            let chunk: Vec<f32> = (0..n).map(|i| (next + i as u32) as f32).collect();
            next += n as u32;
            producer.push_slice(&chunk);
            history.extend_from_slice(&chunk);

            if capture.poll() {
                let window = rx.try_pop().unwrap();
                assert_eq!(window.samples(), &history[history.len() - 300..]);
                assert_eq!(window.sample_rate(), 1_000);
            } else {
                assert!(history.len() < 300);
            }
        }
        assert!(capture.total_written() > 1_000 * 5);
    }

    #[test]
    fn device_rate_is_converted_to_pipeline_rate() {
        let (mut producer, consumer) = create_audio_ring();
        let (tx, rx) = window_queue(4);
        let config = CaptureConfig::new(16_000, 0.25);
        let mut capture = CaptureBuffer::from_consumer(consumer, 48_000, config, tx).unwrap();

        // 0.5 s at 48 kHz is enough for one 0.25 s window at 16 kHz.
        producer.push_slice(&vec![0.0; 24_000]);
        assert!(capture.poll());
        let window = rx.try_pop().unwrap();
        assert_eq!(window.len(), 4_000);
        assert_eq!(window.sample_rate(), 16_000);
    }

    #[test]
    fn stop_clears_recording_flag() {
        let (_producer, mut capture, _rx) = buffer(small_config());
        assert!(capture.is_recording());
        capture.stop();
        assert!(!capture.is_recording());
    }
}
