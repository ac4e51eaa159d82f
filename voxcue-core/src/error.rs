use thiserror::Error;

/// All errors produced by voxcue-core.
#[derive(Debug, Error)]
pub enum VoxcueError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("classifier returned {got} probabilities, expected {expected}")]
    OutputShape { expected: usize, got: usize },

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("ONNX session error: {0}")]
    OnnxSession(String),

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VoxcueError>;
