use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxcue_core::audio::{device::list_input_devices, wav::read_wav_mono_f32};
use voxcue_core::buffering::{create_audio_ring, queue::window_queue, Producer};
use voxcue_core::capture::CaptureBuffer;
use voxcue_core::decision::Decision;
use voxcue_core::{
    Command, CommandEngine, CommandEvent, EngineConfig, ModelHandle, OnnxModel, OnnxModelConfig,
    StubModel, TickOutcome, VoicePipeline,
};

/// voxcue - spoken commands from a live microphone
#[derive(Parser)]
#[command(name = "voxcue", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Listen on a microphone and print accepted commands as JSON lines
    Listen {
        #[command(flatten)]
        tuning: Tuning,

        /// Input device name (see `voxcue devices`)
        #[arg(short, long, env = "VOXCUE_INPUT_DEVICE")]
        device: Option<String>,

        /// Also print per-window activity events
        #[arg(long)]
        activity: bool,
    },
    /// Run a WAV file through the pipeline with a simulated clock
    Replay {
        /// Path to a .wav file (any rate, any channel count)
        wav: PathBuf,

        #[command(flatten)]
        tuning: Tuning,

        /// Simulated time between ticks, in milliseconds
        #[arg(long, default_value = "250")]
        hop_ms: u64,
    },
    /// List audio input devices
    Devices,
}

#[derive(Args)]
struct Tuning {
    /// ONNX command model; defaults to command_model.onnx in the models dir
    #[arg(short, long, env = "VOXCUE_MODEL")]
    model: Option<PathBuf>,

    /// Minimum winning probability for a command
    #[arg(long)]
    confidence: Option<f32>,

    /// Seconds between accepted commands
    #[arg(long)]
    cooldown: Option<f32>,

    /// Mean-amplitude gate threshold
    #[arg(long)]
    vad: Option<f32>,
}

impl Tuning {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::default();
        if let Some(v) = self.confidence {
            config.confidence_threshold = v;
        }
        if let Some(v) = self.cooldown {
            config.command_cooldown_secs = v;
        }
        if let Some(v) = self.vad {
            config.vad_threshold = v;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "voxcue=info",
        1 => "voxcue=debug",
        _ => "voxcue=trace",
    };
    // Logs go to stderr; stdout carries JSON lines only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Cmd::Listen {
            tuning,
            device,
            activity,
        } => listen(&tuning, device, activity).await,
        Cmd::Replay {
            wav,
            tuning,
            hop_ms,
        } => replay(&wav, &tuning, hop_ms),
        Cmd::Devices => {
            for device in list_input_devices() {
                println!("{}", serde_json::to_string(&device)?);
            }
            Ok(())
        }
    }
}

/// An explicit `--model` must load; the default location is optional and
/// falls back to the stub, which never dispatches.
fn load_model(path: Option<&Path>) -> anyhow::Result<ModelHandle> {
    let config = match path {
        Some(path) => OnnxModelConfig::from_path(path),
        None => {
            let config = OnnxModelConfig::default();
            if !config.model_path.exists() {
                warn!(
                    path = %config.model_path.display(),
                    "no command model found, using stub classifier (no commands will fire)"
                );
                return Ok(ModelHandle::new(StubModel::new()));
            }
            config
        }
    };
    info!(path = %config.model_path.display(), "loading command model");
    Ok(ModelHandle::new(OnnxModel::new(config)))
}

async fn listen(tuning: &Tuning, device: Option<String>, activity: bool) -> anyhow::Result<()> {
    let config = tuning.engine_config()?;
    let engine = CommandEngine::new(config, load_model(tuning.model.as_deref())?);
    engine.warm_up().context("model warm-up failed")?;

    let mut commands = engine.subscribe_commands();
    let mut activity_rx = engine.subscribe_activity();
    engine
        .start_with_device(device)
        .context("failed to start listening")?;
    info!("listening; press Ctrl+C to stop");

    loop {
        tokio::select! {
            event = commands.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "command output lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            event = activity_rx.recv(), if activity => {
                if let Ok(event) = event {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.stop()?;
    // Give the driver one tick to release the device.
    tokio::time::sleep(engine.config().tick_interval() * 2).await;
    info!(diagnostics = ?engine.diagnostics_snapshot(), "stopped");
    Ok(())
}

fn replay(wav: &Path, tuning: &Tuning, hop_ms: u64) -> anyhow::Result<()> {
    let config = tuning.engine_config()?;
    let clip = read_wav_mono_f32(wav).with_context(|| format!("reading {}", wav.display()))?;
    info!(
        path = %wav.display(),
        sample_rate = clip.sample_rate,
        secs = clip.duration_secs(),
        "replaying"
    );

    let model = load_model(tuning.model.as_deref())?;
    model.0.lock().warm_up().context("model warm-up failed")?;

    let (mut producer, consumer) = create_audio_ring();
    let (window_tx, window_rx) = window_queue(config.max_pending_windows);
    let mut capture = CaptureBuffer::from_consumer(
        consumer,
        clip.sample_rate,
        config.capture_config(),
        window_tx,
    )?;
    let mut pipeline = VoicePipeline::new(&config, model, window_rx, Box::new(|_: Command| {}))?;

    let hop = Duration::from_millis(hop_ms.max(1));
    let hop_len = ((clip.sample_rate as u64 * hop.as_millis() as u64) / 1000).max(1) as usize;
    let t0 = Instant::now();
    let mut seq = 0u64;

    for (i, chunk) in clip.samples.chunks(hop_len).enumerate() {
        producer.push_slice(chunk);
        capture.poll();
        let now = t0 + hop * (i as u32 + 1);
        match pipeline.process_once(now) {
            Ok(TickOutcome::Classified {
                decision:
                    Decision::Accepted {
                        command,
                        confidence,
                    },
                ..
            }) => {
                let event = CommandEvent {
                    seq,
                    command,
                    confidence,
                    elapsed_ms: (now - t0).as_millis() as u64,
                };
                seq += 1;
                println!("{}", serde_json::to_string(&event)?);
            }
            Ok(_) => {}
            Err(e) => warn!(tick = i, "inference failed: {e}"),
        }
    }

    info!(diagnostics = ?pipeline.diagnostics().snapshot(), "replay finished");
    Ok(())
}
