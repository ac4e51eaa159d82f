//! Classifier abstraction.
//!
//! The `InferenceEngine` trait decouples the pipeline from any specific
//! backend (stub, ONNX Runtime, …). Backends see a ready-shaped
//! `[1, time_steps, coeff_count, 1]` tensor; padding and reshaping live in
//! [`adapter::ClassifierAdapter`].
//!
//! `&mut self` on `execute` expresses that runtimes hold mutable execution
//! state. All mutation is serialised through `ModelHandle`'s
//! `parking_lot::Mutex`.

pub mod adapter;
pub mod stub;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxModel, OnnxModelConfig};

pub use adapter::ClassifierAdapter;

use std::sync::Arc;

use ndarray::ArrayView4;
use parking_lot::Mutex;

use crate::error::Result;

/// Contract for classification backends.
pub trait InferenceEngine: Send + 'static {
    /// One-time load: open model files, allocate the execution context, run a
    /// dummy inference. Called once at engine startup.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Run the classifier on one input tensor and return its raw output.
    ///
    /// Any runtime-owned tensors must be released before this returns, on the
    /// error path as well.
    fn execute(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>>;

    /// `(time_steps, coeff_count)` the backend was built for, when it
    /// declares a fixed one. Only meaningful after `warm_up`.
    fn input_shape(&self) -> Option<(usize, usize)> {
        None
    }
}

/// Thread-safe reference-counted handle to any `InferenceEngine` implementor.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn InferenceEngine>>);

impl ModelHandle {
    /// Wrap any `InferenceEngine` in a `ModelHandle`.
    pub fn new<M: InferenceEngine>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

/// Classifier output: one probability per command label, index-aligned with
/// [`Command::ALL`](crate::decision::Command::ALL).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index and value of the largest element. Ties go to the lowest index.
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let (&first, rest) = self.0.split_first()?;
        let mut best = (0, first);
        for (i, &p) in rest.iter().enumerate() {
            if p > best.1 {
                best = (i + 1, p);
            }
        }
        Some(best)
    }
}
