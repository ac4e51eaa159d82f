//! `StubModel`: placeholder backend used when no model file is available.
//!
//! Returns a uniform distribution over the command labels, so it never
//! clears a sane confidence threshold. Lets the capture → gate → MFCC path
//! run end-to-end without an inference runtime.

use ndarray::ArrayView4;
use tracing::debug;

use crate::decision::Command;
use crate::error::Result;
use crate::inference::InferenceEngine;

pub struct StubModel {
    calls: u64,
}

impl StubModel {
    pub fn new() -> Self {
        Self { calls: 0 }
    }

    /// How many times `execute` has run.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubModel {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for StubModel {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubModel::warm_up is a no-op");
        Ok(())
    }

    fn execute(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>> {
        self.calls += 1;
        debug!(shape = ?input.shape(), calls = self.calls, "StubModel::execute");
        Ok(vec![1.0 / Command::COUNT as f32; Command::COUNT])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn uniform_output_over_labels() {
        let mut model = StubModel::new();
        let input = Array4::<f32>::zeros((1, 63, 40, 1));
        let out = model.execute(input.view()).unwrap();
        assert_eq!(out.len(), Command::COUNT);
        approx::assert_relative_eq!(out.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert_eq!(model.calls(), 1);
    }
}
