//! `CommandEngine`, the top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! CommandEngine::new()
//!     └─► warm_up()          → model loaded, status = WarmingUp → Idle
//!         └─► start()        → device open, driver spawned, status = Listening
//!             └─► stop()     → run flag cleared, device released, status = Stopped
//! ```
//!
//! Calling `start()`/`stop()` in the wrong state returns an error rather
//! than panicking.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so the [`CaptureBuffer`] is
//! created inside the `spawn_blocking` closure and never crosses a thread
//! boundary. A sync channel reports the device-open result back to `start()`.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    buffering::queue::{window_queue, WindowSender, DEFAULT_MAX_PENDING_WINDOWS},
    capture::{CaptureBuffer, CaptureConfig},
    decision::{Command, CommandSink},
    error::{Result, VoxcueError},
    features::MfccConfig,
    inference::{
        adapter::{DEFAULT_COEFF_COUNT, DEFAULT_TIME_STEPS},
        ModelHandle,
    },
    ipc::events::{AudioActivityEvent, CommandEvent, EngineStatus, EngineStatusEvent},
    vad::energy::DEFAULT_VAD_THRESHOLD,
};

use pipeline::{DiagnosticsSnapshot, DriverContext, PipelineDiagnostics, VoicePipeline};

/// Events buffered per subscriber before slow receivers start lagging.
const BROADCAST_CAP: usize = 256;

/// Configuration for `CommandEngine`. Every field has a default, so a
/// partial JSON object deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EngineConfig {
    /// Pipeline sample rate (Hz); device audio is resampled to it.
    pub sample_rate: u32,
    pub window_duration_secs: f32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub num_mel_filters: usize,
    pub n_mfcc: usize,
    pub min_hz: f32,
    pub max_hz: f32,
    pub pre_emphasis: f32,
    /// Mean absolute amplitude a window needs to reach the classifier.
    pub vad_threshold: f32,
    /// Minimum winning probability for a dispatch (inclusive).
    pub confidence_threshold: f32,
    pub command_cooldown_secs: f32,
    /// Classifier input is `[1, time_steps, coeff_count, 1]`.
    pub time_steps: usize,
    pub coeff_count: usize,
    pub max_pending_windows: usize,
    pub tick_interval_ms: u64,
    /// Input device name; `None` uses the system default.
    pub preferred_input_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mfcc = MfccConfig::default();
        Self {
            sample_rate: mfcc.sample_rate,
            window_duration_secs: 1.0,
            n_fft: mfcc.n_fft,
            hop_length: mfcc.hop_length,
            num_mel_filters: mfcc.num_mel_filters,
            n_mfcc: mfcc.n_mfcc,
            min_hz: mfcc.min_hz,
            max_hz: mfcc.max_hz,
            pre_emphasis: mfcc.pre_emphasis,
            vad_threshold: DEFAULT_VAD_THRESHOLD,
            confidence_threshold: 0.7,
            command_cooldown_secs: 3.0,
            time_steps: DEFAULT_TIME_STEPS,
            coeff_count: DEFAULT_COEFF_COUNT,
            max_pending_windows: DEFAULT_MAX_PENDING_WINDOWS,
            tick_interval_ms: 16,
            preferred_input_device: None,
        }
    }
}

impl EngineConfig {
    pub fn mfcc_config(&self) -> MfccConfig {
        MfccConfig {
            sample_rate: self.sample_rate,
            n_fft: self.n_fft,
            hop_length: self.hop_length,
            num_mel_filters: self.num_mel_filters,
            n_mfcc: self.n_mfcc,
            min_hz: self.min_hz,
            max_hz: self.max_hz,
            pre_emphasis: self.pre_emphasis,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            preferred_input_device: self.preferred_input_device.clone(),
            ..CaptureConfig::new(self.sample_rate, self.window_duration_secs)
        }
    }

    /// Samples per window: `sample_rate × window_duration_secs`.
    pub fn window_len(&self) -> usize {
        self.capture_config().window_len
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.command_cooldown_secs.max(0.0))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// # Errors
    /// `VoxcueError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.mfcc_config().validate()?;
        if !(self.window_duration_secs.is_finite() && self.window_duration_secs > 0.0) {
            return Err(VoxcueError::Config(format!(
                "windowDurationSecs must be > 0, got {}",
                self.window_duration_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(VoxcueError::Config(format!(
                "confidenceThreshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(self.command_cooldown_secs.is_finite() && self.command_cooldown_secs >= 0.0) {
            return Err(VoxcueError::Config(format!(
                "commandCooldownSecs must be ≥ 0, got {}",
                self.command_cooldown_secs
            )));
        }
        if !(self.vad_threshold.is_finite() && self.vad_threshold >= 0.0) {
            return Err(VoxcueError::Config(format!(
                "vadThreshold must be ≥ 0, got {}",
                self.vad_threshold
            )));
        }
        if self.time_steps == 0 || self.coeff_count == 0 {
            return Err(VoxcueError::Config(
                "timeSteps and coeffCount must be > 0".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(VoxcueError::Config("tickIntervalMs must be > 0".into()));
        }
        Ok(())
    }
}

type SharedSink = Arc<Mutex<Option<Box<dyn CommandSink>>>>;

/// The top-level engine handle.
///
/// `Send + Sync`: all fields use interior mutability. Wrap in an `Arc` to
/// share with event-forwarding tasks.
pub struct CommandEngine {
    config: EngineConfig,
    model: ModelHandle,
    /// Stop flag of the live driver. Every run gets a fresh flag, so a
    /// stopped driver that has not yet woken cannot be revived by `start`.
    active_run: Mutex<Option<Arc<AtomicBool>>>,
    status: Arc<Mutex<EngineStatus>>,
    command_tx: broadcast::Sender<CommandEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    /// Shared by command and activity events.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
    sink: SharedSink,
}

impl CommandEngine {
    /// Create an engine. Does not open the device; call `warm_up()` then
    /// `start()`.
    pub fn new(config: EngineConfig, model: ModelHandle) -> Self {
        let (command_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            model,
            active_run: Mutex::new(None),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            command_tx,
            status_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receive accepted commands synchronously on the driver thread, in
    /// addition to the broadcast `CommandEvent`s. Survives restarts.
    pub fn set_sink<S: CommandSink>(&self, sink: S) {
        *self.sink.lock() = Some(Box::new(sink));
    }

    /// Load the classifier and run a dummy inference.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up command classifier");
        if let Err(e) = self.model.0.lock().warm_up() {
            self.set_status(EngineStatus::Error, Some(e.to_string()));
            return Err(e);
        }
        self.set_status(EngineStatus::Idle, None);
        info!("command classifier ready");
        Ok(())
    }

    /// Start capture and the tick driver on the configured device.
    ///
    /// Blocks until the device is open (or failed). Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    /// - `VoxcueError::AlreadyRunning` if already started.
    /// - `VoxcueError::Config` if the configuration is invalid.
    /// - `VoxcueError::NoDefaultInputDevice` / `AudioStream` on device error.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(self.config.preferred_input_device.clone())
    }

    /// Start using a preferred input device name, falling back to the
    /// default device when it is not found.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        let running = self.claim_run()?;

        let (pipeline, window_tx) = match self.build_pipeline() {
            Ok(built) => built,
            Err(e) => {
                self.release_run(&running);
                return Err(e);
            }
        };

        self.diagnostics.reset();
        let capture_config = CaptureConfig {
            preferred_input_device,
            ..self.config.capture_config()
        };
        let driver_running = Arc::clone(&running);
        let tick_interval = self.config.tick_interval();
        let command_tx = self.command_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let seq = Arc::clone(&self.seq);

        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        tokio::task::spawn_blocking(move || {
            // The stream must be created on this thread.
            let capture = match CaptureBuffer::start(capture_config, window_tx) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(()));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };

            pipeline::run(DriverContext {
                capture,
                pipeline,
                running: driver_running,
                tick_interval,
                command_tx,
                activity_tx,
                seq,
                started: Instant::now(),
            });
        });

        match open_rx.recv() {
            Ok(Ok(())) => {
                self.set_status(EngineStatus::Listening, None);
                info!("engine started, listening for commands");
                Ok(())
            }
            Ok(Err(e)) => {
                self.release_run(&running);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.release_run(&running);
                self.set_status(EngineStatus::Error, Some("driver failed to start".into()));
                Err(VoxcueError::Other(anyhow::anyhow!(
                    "driver task died before opening the device"
                )))
            }
        }
    }

    /// Stop capture and the driver. The device is released on the driver
    /// thread at its next tick.
    ///
    /// # Errors
    /// `VoxcueError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        let Some(running) = self.active_run.lock().take() else {
            return Err(VoxcueError::NotRunning);
        };
        running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.active_run.lock().is_some()
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn subscribe_commands(&self) -> broadcast::Receiver<CommandEvent> {
        self.command_tx.subscribe()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn claim_run(&self) -> Result<Arc<AtomicBool>> {
        let mut active = self.active_run.lock();
        if active.is_some() {
            return Err(VoxcueError::AlreadyRunning);
        }
        let running = Arc::new(AtomicBool::new(true));
        *active = Some(Arc::clone(&running));
        Ok(running)
    }

    /// Undo a claim whose driver never started.
    fn release_run(&self, running: &Arc<AtomicBool>) {
        running.store(false, Ordering::SeqCst);
        let mut active = self.active_run.lock();
        if active.as_ref().is_some_and(|current| Arc::ptr_eq(current, running)) {
            *active = None;
        }
    }

    fn build_pipeline(&self) -> Result<(VoicePipeline, WindowSender)> {
        self.config.validate()?;
        let (window_tx, window_rx) = window_queue(self.config.max_pending_windows);
        let shared = Arc::clone(&self.sink);
        let sink = move |command: Command| {
            if let Some(sink) = shared.lock().as_mut() {
                sink.dispatch(command);
            }
        };
        let pipeline =
            VoicePipeline::new(&self.config, self.model.clone(), window_rx, Box::new(sink))?
                .with_diagnostics(Arc::clone(&self.diagnostics));
        Ok((pipeline, window_tx))
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl Drop for CommandEngine {
    fn drop(&mut self) {
        if let Some(running) = self.active_run.get_mut().take() {
            running.store(false, Ordering::SeqCst);
            warn!("engine dropped while running, stopping driver");
        }
    }
}
