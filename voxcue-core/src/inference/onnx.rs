//! Command classifier backend via the `ort` crate.
//!
//! Targets a single-graph keyword model:
//! - input  `[1, 63, 40, 1]` f32 (MFCC frames × coefficients × channel)
//! - output `[1, 6]` f32 probabilities in label order
//!   `stop, left, go, down, right, up`
//!
//! Input and output names are read from the graph at warm-up, so exports
//! with different tensor names load unchanged.
//!
//! ## Environment
//!
//! | Variable                   | Effect                                   |
//! |----------------------------|------------------------------------------|
//! | `VOXCUE_MODEL_DIR`         | directory searched for `command_model.onnx` |
//! | `VOXCUE_ORT_EP`            | `cpu`, `directml` or `auto` (default)    |
//! | `VOXCUE_ORT_INTRA_THREADS` | intra-op threads (1–32)                  |
//! | `VOXCUE_ORT_INTER_THREADS` | inter-op threads (1–8)                   |

use std::path::{Path, PathBuf};

use ndarray::{Array4, ArrayView4};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use ort::{
    ep,
    session::builder::{GraphOptimizationLevel, SessionBuilder},
};
use tracing::{info, warn};

use crate::{
    error::{Result, VoxcueError},
    inference::{
        adapter::{DEFAULT_COEFF_COUNT, DEFAULT_TIME_STEPS},
        InferenceEngine,
    },
};

const DEFAULT_MODEL_FILE: &str = "command_model.onnx";

// ── Model config ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OnnxModelConfig {
    pub model_path: PathBuf,
}

impl OnnxModelConfig {
    pub fn from_path(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
        }
    }
}

impl Default for OnnxModelConfig {
    fn default() -> Self {
        Self {
            model_path: selected_models_dir().join(DEFAULT_MODEL_FILE),
        }
    }
}

fn selected_models_dir() -> PathBuf {
    match std::env::var("VOXCUE_MODEL_DIR") {
        Ok(explicit) if !explicit.trim().is_empty() => PathBuf::from(explicit.trim()),
        _ => default_models_dir(),
    }
}

pub fn default_models_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|p| PathBuf::from(p).join("voxcue").join("models"))
            .unwrap_or_else(|| PathBuf::from("models"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("voxcue")
            .join("models")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrtExecutionPreference {
    Auto,
    Cpu,
    DirectML,
}

fn ort_execution_preference() -> OrtExecutionPreference {
    match std::env::var("VOXCUE_ORT_EP")
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "cpu" => OrtExecutionPreference::Cpu,
        "dml" | "directml" => OrtExecutionPreference::DirectML,
        _ => OrtExecutionPreference::Auto,
    }
}

fn env_threads(var: &str, default: usize, max: usize) -> usize {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
        .clamp(1, max)
}

fn create_session(model_path: &Path) -> Result<Session> {
    let pref = ort_execution_preference();
    // The model is small; a couple of intra-op threads saturate it.
    let intra_threads = env_threads("VOXCUE_ORT_INTRA_THREADS", 2, 32);
    let inter_threads = env_threads("VOXCUE_ORT_INTER_THREADS", 1, 8);

    let mut builder = SessionBuilder::new()
        .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?
        .with_intra_threads(intra_threads)
        .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?
        .with_inter_threads(inter_threads)
        .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::All)
        .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?;
    info!(intra_threads, inter_threads, ?pref, "ONNX session configured");

    #[cfg(target_os = "windows")]
    {
        builder = match pref {
            OrtExecutionPreference::Cpu => builder
                .with_execution_providers([ep::CPU::default().build()])
                .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?,
            OrtExecutionPreference::DirectML => builder
                .with_execution_providers([
                    ep::DirectML::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                    ep::CPU::default().build(),
                ])
                .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?,
            OrtExecutionPreference::Auto => builder
                .with_execution_providers([
                    ep::DirectML::default()
                        .with_device_id(0)
                        .build()
                        .fail_silently(),
                    ep::CPU::default().build(),
                ])
                .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?,
        };
    }

    #[cfg(not(target_os = "windows"))]
    {
        if pref == OrtExecutionPreference::DirectML {
            warn!("VOXCUE_ORT_EP=directml requested on non-Windows host; using CPU EP");
        }
        builder = builder
            .with_execution_providers([ep::CPU::default().build()])
            .map_err(|e| VoxcueError::OnnxSession(e.to_string()))?;
    }

    builder
        .commit_from_file(model_path)
        .map_err(|e| VoxcueError::OnnxSession(e.to_string()))
}

// ── OnnxModel ────────────────────────────────────────────────────────────────

pub struct OnnxModel {
    config: OnnxModelConfig,
    session: Option<Session>,
    input_name: String,
    output_name: String,
    declared_shape: Option<(usize, usize)>,
}

impl OnnxModel {
    pub fn new(config: OnnxModelConfig) -> Self {
        Self {
            config,
            session: None,
            input_name: "input".into(),
            output_name: "output".into(),
            declared_shape: None,
        }
    }
}

impl InferenceEngine for OnnxModel {
    fn warm_up(&mut self) -> Result<()> {
        let path = &self.config.model_path;
        if !path.exists() {
            return Err(VoxcueError::ModelNotFound { path: path.clone() });
        }
        let size_kb = std::fs::metadata(path)
            .map(|m| m.len() as f64 / 1024.0)
            .unwrap_or(0.0);
        info!("loading command model from {:?} ({:.1} KiB)", path, size_kb);

        let session = create_session(path)?;

        for input in session.inputs().iter() {
            info!("  model input: {}", input.name());
        }
        for output in session.outputs().iter() {
            info!("  model output: {}", output.name());
        }

        let input = session
            .inputs()
            .first()
            .ok_or_else(|| VoxcueError::OnnxSession("model declares no inputs".into()))?;
        self.input_name = input.name().to_string();
        // Dynamic dims are reported as -1; only a fully fixed shape counts.
        self.declared_shape = input
            .dtype()
            .tensor_shape()
            .filter(|s| s.len() == 4 && s[1] > 0 && s[2] > 0)
            .map(|s| (s[1] as usize, s[2] as usize));
        self.output_name = session
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| VoxcueError::OnnxSession("model declares no outputs".into()))?;
        self.session = Some(session);

        // Dummy forward pass to populate CPU caches.
        let (time_steps, coeff_count) = self
            .declared_shape
            .unwrap_or((DEFAULT_TIME_STEPS, DEFAULT_COEFF_COUNT));
        let dummy = Array4::<f32>::zeros((1, time_steps, coeff_count, 1));
        self.execute(dummy.view())?;

        info!(
            input = %self.input_name,
            output = %self.output_name,
            time_steps,
            coeff_count,
            "OnnxModel warm-up complete"
        );
        Ok(())
    }

    fn input_shape(&self) -> Option<(usize, usize)> {
        self.declared_shape
    }

    fn execute(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>> {
        let Some(session) = self.session.as_mut() else {
            return Err(VoxcueError::OnnxSession(
                "model not loaded; call warm_up() first".into(),
            ));
        };

        // Input and output values are owned here and dropped on every return
        // path, releasing their runtime allocations.
        let input_value = Value::from_array(input.to_owned())
            .map_err(|e: ort::Error| VoxcueError::OnnxSession(e.to_string()))?;
        let inputs: Vec<(String, SessionInputValue<'_>)> = vec![(
            self.input_name.clone(),
            SessionInputValue::from(input_value),
        )];

        let outputs = session
            .run(inputs)
            .map_err(|e| VoxcueError::Inference(e.to_string()))?;
        let (_, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| VoxcueError::Inference(e.to_string()))?;
        Ok(data.to_vec())
    }
}
