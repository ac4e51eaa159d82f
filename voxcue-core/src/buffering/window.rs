//! The unit of work handed from capture to the pipeline.

/// A fixed-length block of mono PCM samples ending at the capture cursor.
///
/// Immutable once built; each window is consumed by exactly one pipeline tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWindow {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioWindow {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Mono f32 samples in [-1.0, 1.0], oldest first.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
