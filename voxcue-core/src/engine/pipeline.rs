//! Per-tick pipeline and the blocking driver loop.
//!
//! ## Stages (per tick)
//!
//! ```text
//! 1. CaptureBuffer::poll      drain ring → clip → enqueue newest window
//! 2. VoicePipeline::process_once
//!    a. pop at most one pending window
//!    b. energy gate; silent windows stop here
//!    c. MFCC extraction
//!    d. classifier adapter (pad/truncate, shape, run model)
//!    e. command decision (threshold + cooldown)
//!    f. dispatch accepted command to the CommandSink
//! 3. Broadcast an AudioActivityEvent for the evaluated window, and a
//!    CommandEvent when a command was dispatched
//! ```
//!
//! The driver runs in `spawn_blocking` so the tokio executor stays free.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    buffering::queue::WindowReceiver,
    capture::CaptureBuffer,
    decision::{CommandDecision, CommandSink, Decision},
    engine::EngineConfig,
    error::Result,
    features::mfcc::MfccExtractor,
    inference::{ClassifierAdapter, ModelHandle, ProbabilityVector},
    ipc::events::{AudioActivityEvent, CommandEvent},
    vad::{EnergyGate, VoiceActivityDetector},
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub windows_captured: AtomicU64,
    pub windows_dropped: AtomicU64,
    pub windows_in: AtomicU64,
    pub windows_gated: AtomicU64,
    pub windows_classified: AtomicU64,
    pub inference_errors: AtomicU64,
    pub commands_dispatched: AtomicU64,
    pub commands_suppressed: AtomicU64,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            windows_captured: self.windows_captured.load(Ordering::Relaxed),
            windows_dropped: self.windows_dropped.load(Ordering::Relaxed),
            windows_in: self.windows_in.load(Ordering::Relaxed),
            windows_gated: self.windows_gated.load(Ordering::Relaxed),
            windows_classified: self.windows_classified.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            commands_dispatched: self.commands_dispatched.load(Ordering::Relaxed),
            commands_suppressed: self.commands_suppressed.load(Ordering::Relaxed),
        }
    }

    fn counters(&self) -> [&AtomicU64; 8] {
        [
            &self.windows_captured,
            &self.windows_dropped,
            &self.windows_in,
            &self.windows_gated,
            &self.windows_classified,
            &self.inference_errors,
            &self.commands_dispatched,
            &self.commands_suppressed,
        ]
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub windows_captured: u64,
    pub windows_dropped: u64,
    pub windows_in: u64,
    pub windows_gated: u64,
    pub windows_classified: u64,
    pub inference_errors: u64,
    pub commands_dispatched: u64,
    pub commands_suppressed: u64,
}

/// What one call to [`VoicePipeline::process_once`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No pending window.
    Idle,
    /// Window rejected by the gate; extraction and inference were skipped.
    Gated { energy: f32 },
    Classified {
        energy: f32,
        probabilities: ProbabilityVector,
        decision: Decision,
    },
}

impl TickOutcome {
    /// Command dispatched during this tick, if any.
    pub fn command(&self) -> Option<crate::decision::Command> {
        match self {
            TickOutcome::Classified { decision, .. } => decision.accepted(),
            _ => None,
        }
    }

    /// Gate energy of the evaluated window; `None` when idle.
    pub fn energy(&self) -> Option<f32> {
        match self {
            TickOutcome::Idle => None,
            TickOutcome::Gated { energy } | TickOutcome::Classified { energy, .. } => Some(*energy),
        }
    }
}

/// Gate → MFCC → classifier → decision → sink, one window per tick.
pub struct VoicePipeline {
    gate: Box<dyn VoiceActivityDetector>,
    extractor: MfccExtractor,
    adapter: ClassifierAdapter,
    decision: CommandDecision,
    sink: Box<dyn CommandSink>,
    windows: WindowReceiver,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl VoicePipeline {
    /// Build a pipeline with an [`EnergyGate`] at `config.vad_threshold`.
    ///
    /// # Errors
    /// Returns `VoxcueError::Config` if the MFCC parameters are invalid or
    /// the warmed-up model declares a different input shape.
    pub fn new(
        config: &EngineConfig,
        model: ModelHandle,
        windows: WindowReceiver,
        sink: Box<dyn CommandSink>,
    ) -> Result<Self> {
        let adapter = ClassifierAdapter::new(model, config.time_steps, config.coeff_count);
        adapter.check_model_shape()?;
        Ok(Self {
            gate: Box::new(EnergyGate::new(config.vad_threshold)),
            extractor: MfccExtractor::new(config.mfcc_config())?,
            adapter,
            decision: CommandDecision::new(config.confidence_threshold, config.cooldown()),
            sink,
            windows,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        })
    }

    pub fn with_gate(mut self, gate: Box<dyn VoiceActivityDetector>) -> Self {
        self.gate = gate;
        self
    }

    /// Share counters with an outside observer (the engine).
    pub fn with_diagnostics(mut self, diagnostics: Arc<PipelineDiagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn diagnostics(&self) -> &Arc<PipelineDiagnostics> {
        &self.diagnostics
    }

    pub fn decision(&self) -> &CommandDecision {
        &self.decision
    }

    /// Process at most one pending window.
    ///
    /// # Errors
    /// An inference failure is returned for this tick only; the window is
    /// consumed and the next call proceeds normally.
    pub fn process_once(&mut self, now: Instant) -> Result<TickOutcome> {
        self.diagnostics
            .windows_dropped
            .store(self.windows.dropped(), Ordering::Relaxed);

        let Some(window) = self.windows.try_pop() else {
            return Ok(TickOutcome::Idle);
        };
        bump(&self.diagnostics.windows_in);

        let reading = self.gate.classify(&window);
        let energy = reading.energy;
        if !reading.is_speech() {
            bump(&self.diagnostics.windows_gated);
            debug!(energy, "window gated");
            return Ok(TickOutcome::Gated { energy });
        }

        let features = self.extractor.extract(window.samples());
        let probabilities = match self.adapter.classify(&features) {
            Ok(probabilities) => probabilities,
            Err(e) => {
                bump(&self.diagnostics.inference_errors);
                error!("classifier failed: {e}");
                return Err(e);
            }
        };
        bump(&self.diagnostics.windows_classified);

        let decision = self.decision.evaluate(&probabilities, now);
        match decision {
            Decision::Accepted {
                command,
                confidence,
            } => {
                bump(&self.diagnostics.commands_dispatched);
                info!(%command, confidence, energy, "command dispatched");
                self.sink.dispatch(command);
            }
            Decision::Suppressed { .. } => bump(&self.diagnostics.commands_suppressed),
            Decision::BelowThreshold { .. } => {}
        }

        Ok(TickOutcome::Classified {
            energy,
            probabilities,
            decision,
        })
    }
}

/// Everything the blocking driver owns.
pub struct DriverContext {
    pub capture: CaptureBuffer,
    pub pipeline: VoicePipeline,
    pub running: Arc<AtomicBool>,
    pub tick_interval: Duration,
    pub command_tx: broadcast::Sender<CommandEvent>,
    pub activity_tx: broadcast::Sender<AudioActivityEvent>,
    pub seq: Arc<AtomicU64>,
    /// Origin for `CommandEvent::elapsed_ms`.
    pub started: Instant,
}

/// Tick `poll` + `process_once` until `ctx.running` becomes false.
pub fn run(mut ctx: DriverContext) {
    info!(tick_ms = ctx.tick_interval.as_millis() as u64, "pipeline started");
    let diagnostics = Arc::clone(ctx.pipeline.diagnostics());

    while ctx.running.load(Ordering::Relaxed) {
        let tick_start = Instant::now();

        if ctx.capture.poll() {
            bump(&diagnostics.windows_captured);
        }

        // Errors are counted and logged inside process_once.
        if let Ok(outcome) = ctx.pipeline.process_once(tick_start) {
            if let Some(energy) = outcome.energy() {
                let _ = ctx.activity_tx.send(AudioActivityEvent {
                    seq: ctx.seq.fetch_add(1, Ordering::Relaxed),
                    energy,
                    is_voiced: !matches!(outcome, TickOutcome::Gated { .. }),
                });
            }
            if let TickOutcome::Classified {
                decision:
                    Decision::Accepted {
                        command,
                        confidence,
                    },
                ..
            } = outcome
            {
                let _ = ctx.command_tx.send(CommandEvent {
                    seq: ctx.seq.fetch_add(1, Ordering::Relaxed),
                    command,
                    confidence,
                    elapsed_ms: tick_start.duration_since(ctx.started).as_millis() as u64,
                });
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < ctx.tick_interval {
            std::thread::sleep(ctx.tick_interval - elapsed);
        }
    }

    ctx.capture.stop();
    info!(diagnostics = ?diagnostics.snapshot(), "pipeline stopped");
}
