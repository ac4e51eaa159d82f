//! # voxcue-core
//!
//! Live audio to discrete voice commands.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → CaptureBuffer (looping clip)
//!                                                    │ AudioWindow
//!                                            bounded WindowQueue
//!                                                    │
//!                                  EnergyGate → MfccExtractor → ClassifierAdapter
//!                                                    │ ProbabilityVector
//!                                         CommandDecision (threshold + cooldown)
//!                                                    │
//!                              CommandSink + broadcast::Sender<CommandEvent>
//! ```
//!
//! The audio callback does not allocate after its first buffer. Everything
//! else runs on one blocking driver thread, one tick at a time.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod capture;
pub mod decision;
pub mod engine;
pub mod error;
pub mod features;
pub mod inference;
pub mod ipc;
pub mod vad;

pub use decision::{Command, CommandDecision, CommandSink};
pub use engine::{
    pipeline::{TickOutcome, VoicePipeline},
    CommandEngine, EngineConfig,
};
pub use error::{Result, VoxcueError};
pub use features::{mfcc::MfccExtractor, FeatureMatrix, MfccConfig};
pub use inference::{stub::StubModel, InferenceEngine, ModelHandle, ProbabilityVector};
pub use ipc::events::{AudioActivityEvent, CommandEvent, EngineStatus, EngineStatusEvent};

#[cfg(feature = "onnx")]
pub use inference::{OnnxModel, OnnxModelConfig};
