//! Feature matrix → classifier tensor → probability vector.
//!
//! The classifier expects exactly `time_steps × coeff_count` values laid out
//! as `[1, time_steps, coeff_count, 1]`, time-major. Feature matrices of any
//! other length are zero-padded on the right or truncated; a length mismatch
//! is never an error.

use ndarray::Array4;
use tracing::{debug, trace};

use crate::{
    decision::Command,
    error::{Result, VoxcueError},
    features::FeatureMatrix,
    inference::{ModelHandle, ProbabilityVector},
};

/// Default classifier time axis (frames).
pub const DEFAULT_TIME_STEPS: usize = 63;
/// Default classifier coefficient axis.
pub const DEFAULT_COEFF_COUNT: usize = 40;

pub struct ClassifierAdapter {
    model: ModelHandle,
    time_steps: usize,
    coeff_count: usize,
}

impl ClassifierAdapter {
    pub fn new(model: ModelHandle, time_steps: usize, coeff_count: usize) -> Self {
        Self {
            model,
            time_steps,
            coeff_count,
        }
    }

    /// Fail when the model declares an input layout other than the one this
    /// adapter shapes features into.
    ///
    /// # Errors
    /// `VoxcueError::Config` on a mismatch. Models without a fixed shape pass.
    pub fn check_model_shape(&self) -> Result<()> {
        match self.model.0.lock().input_shape() {
            Some(declared) if declared != (self.time_steps, self.coeff_count) => {
                Err(VoxcueError::Config(format!(
                    "model expects {}x{} input but timeSteps x coeffCount is {}x{}",
                    declared.0, declared.1, self.time_steps, self.coeff_count
                )))
            }
            _ => Ok(()),
        }
    }

    /// Number of feature values the classifier consumes.
    pub fn target_len(&self) -> usize {
        self.time_steps * self.coeff_count
    }

    /// Pad/truncate `features` and lay them out as `[1, T, C, 1]`.
    pub fn shape_input(&self, features: &FeatureMatrix) -> Result<Array4<f32>> {
        let flat = pad_or_truncate(features.as_slice(), self.target_len());
        Array4::from_shape_vec((1, self.time_steps, self.coeff_count, 1), flat)
            .map_err(|e| VoxcueError::Inference(format!("input tensor shape: {e}")))
    }

    /// Run the classifier synchronously on one feature matrix.
    ///
    /// # Errors
    /// Propagates engine failures, and returns `VoxcueError::OutputShape`
    /// when the engine output does not have one value per command label.
    pub fn classify(&self, features: &FeatureMatrix) -> Result<ProbabilityVector> {
        let input = self.shape_input(features)?;
        if features.len() != self.target_len() {
            trace!(
                features = features.len(),
                target = self.target_len(),
                "feature length adjusted to classifier input"
            );
        }

        let output = {
            let mut model = self.model.0.lock();
            model.execute(input.view())?
        };

        if output.len() != Command::COUNT {
            return Err(VoxcueError::OutputShape {
                expected: Command::COUNT,
                got: output.len(),
            });
        }

        debug!(
            probabilities = ?output,
            "classifier output"
        );
        Ok(ProbabilityVector::new(output))
    }
}

/// Copy `values` into a vector of exactly `target_len`, zero-filling the tail.
pub fn pad_or_truncate(values: &[f32], target_len: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(target_len);
    out.extend_from_slice(&values[..values.len().min(target_len)]);
    out.resize(target_len, 0.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use ndarray::ArrayView4;
    use parking_lot::Mutex;

    use crate::inference::InferenceEngine;

    /// Counts tensors the fake runtime has allocated but not yet released.
    struct TensorLease {
        live: Arc<AtomicUsize>,
    }

    impl TensorLease {
        fn acquire(live: &Arc<AtomicUsize>) -> Self {
            live.fetch_add(1, Ordering::SeqCst);
            Self {
                live: Arc::clone(live),
            }
        }
    }

    impl Drop for TensorLease {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    struct FakeEngine {
        seen: Arc<Mutex<Vec<Vec<f32>>>>,
        live: Arc<AtomicUsize>,
        output: Vec<f32>,
        fail_next: bool,
        declared: Option<(usize, usize)>,
    }

    impl FakeEngine {
        fn new(output: Vec<f32>) -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                live: Arc::new(AtomicUsize::new(0)),
                output,
                fail_next: false,
                declared: None,
            }
        }
    }

    impl InferenceEngine for FakeEngine {
        fn warm_up(&mut self) -> Result<()> {
            Ok(())
        }

        fn execute(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>> {
            let _input_tensor = TensorLease::acquire(&self.live);
            self.seen.lock().push(input.iter().copied().collect());
            if std::mem::take(&mut self.fail_next) {
                return Err(VoxcueError::Inference("runtime fault".into()));
            }
            let _output_tensor = TensorLease::acquire(&self.live);
            Ok(self.output.clone())
        }

        fn input_shape(&self) -> Option<(usize, usize)> {
            self.declared
        }
    }

    fn uniform() -> Vec<f32> {
        vec![1.0 / 6.0; 6]
    }

    #[test]
    fn short_features_are_zero_padded() {
        let engine = FakeEngine::new(uniform());
        let seen = Arc::clone(&engine.seen);
        let adapter = ClassifierAdapter::new(ModelHandle::new(engine), 63, 40);

        let features = FeatureMatrix::new(vec![1.0, 2.0, 3.0], 40);
        let probs = adapter.classify(&features).expect("padding never fails");
        assert_eq!(probs.len(), 6);

        let input = &seen.lock()[0];
        assert_eq!(input.len(), 63 * 40);
        assert_eq!(&input[..3], &[1.0, 2.0, 3.0]);
        assert!(input[3..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn empty_features_become_all_zero_input() {
        let engine = FakeEngine::new(uniform());
        let seen = Arc::clone(&engine.seen);
        let adapter = ClassifierAdapter::new(ModelHandle::new(engine), 63, 40);

        adapter
            .classify(&FeatureMatrix::new(Vec::new(), 40))
            .expect("empty features are padded");
        assert!(seen.lock()[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn long_features_are_truncated() {
        let adapter = ClassifierAdapter::new(ModelHandle::new(FakeEngine::new(uniform())), 2, 3);
        let features = FeatureMatrix::new((0..10).map(|v| v as f32).collect(), 3);
        let tensor = adapter.shape_input(&features).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 3, 1]);
        assert_eq!(
            tensor.iter().copied().collect::<Vec<_>>(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn tensor_is_time_major() {
        let adapter = ClassifierAdapter::new(ModelHandle::new(FakeEngine::new(uniform())), 63, 40);
        let values: Vec<f32> = (0..63 * 40).map(|v| v as f32).collect();
        let tensor = adapter
            .shape_input(&FeatureMatrix::new(values, 40))
            .unwrap();
        assert_eq!(tensor[[0, 0, 39, 0]], 39.0);
        assert_eq!(tensor[[0, 1, 0, 0]], 40.0);
        assert_eq!(tensor[[0, 62, 39, 0]], (63 * 40 - 1) as f32);
    }

    #[test]
    fn wrong_output_length_is_an_error() {
        let adapter =
            ClassifierAdapter::new(ModelHandle::new(FakeEngine::new(vec![0.5, 0.5])), 63, 40);
        let err = adapter
            .classify(&FeatureMatrix::new(vec![0.0; 10], 40))
            .unwrap_err();
        assert!(matches!(
            err,
            VoxcueError::OutputShape {
                expected: 6,
                got: 2
            }
        ));
    }

    #[test]
    fn engine_failure_releases_tensors_and_next_call_succeeds() {
        let mut engine = FakeEngine::new(uniform());
        engine.fail_next = true;
        let live = Arc::clone(&engine.live);
        let adapter = ClassifierAdapter::new(ModelHandle::new(engine), 63, 40);
        let features = FeatureMatrix::new(vec![0.1; 100], 40);

        assert!(adapter.classify(&features).is_err());
        assert_eq!(live.load(Ordering::SeqCst), 0);

        let probs = adapter.classify(&features).expect("recovers on next call");
        assert_eq!(probs.len(), 6);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn declared_model_shape_must_match() {
        let mut engine = FakeEngine::new(uniform());
        engine.declared = Some((98, 40));
        let adapter = ClassifierAdapter::new(ModelHandle::new(engine), 63, 40);
        assert!(matches!(adapter.check_model_shape(), Err(VoxcueError::Config(_))));

        let mut engine = FakeEngine::new(uniform());
        engine.declared = Some((63, 40));
        let adapter = ClassifierAdapter::new(ModelHandle::new(engine), 63, 40);
        adapter.check_model_shape().unwrap();

        let adapter = ClassifierAdapter::new(ModelHandle::new(FakeEngine::new(uniform())), 63, 40);
        adapter.check_model_shape().unwrap();
    }

    #[test]
    fn pad_or_truncate_is_deterministic() {
        let a = pad_or_truncate(&[0.25, -0.5], 5);
        let b = pad_or_truncate(&[0.25, -0.5], 5);
        assert_eq!(a, vec![0.25, -0.5, 0.0, 0.0, 0.0]);
        assert_eq!(a, b);
        assert_eq!(pad_or_truncate(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    }
}
