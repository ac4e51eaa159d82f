//! Energy gate using mean absolute amplitude.
//!
//! `energy = sum(|s|) / N`; a window is voiced iff `energy >= threshold`.
//! Stateless and O(N): it exists to keep silence off the FFT/inference path.

use super::{VadDecision, VadReading, VoiceActivityDetector};
use crate::buffering::window::AudioWindow;

/// Default threshold on a [-1, 1] amplitude scale.
pub const DEFAULT_VAD_THRESHOLD: f32 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct EnergyGate {
    threshold: f32,
}

impl EnergyGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Mean absolute amplitude; 0 for an empty slice.
    pub fn mean_abs_energy(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = samples.iter().map(|s| s.abs()).sum();
        sum / samples.len() as f32
    }

    pub fn is_voiced(&self, samples: &[f32]) -> bool {
        Self::mean_abs_energy(samples) >= self.threshold
    }
}

impl Default for EnergyGate {
    fn default() -> Self {
        Self::new(DEFAULT_VAD_THRESHOLD)
    }
}

impl VoiceActivityDetector for EnergyGate {
    fn classify(&mut self, window: &AudioWindow) -> VadReading {
        let energy = Self::mean_abs_energy(window.samples());
        let decision = if energy >= self.threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        };
        VadReading { decision, energy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(samples: Vec<f32>) -> AudioWindow {
        AudioWindow::new(samples, 16_000)
    }

    #[test]
    fn silence_is_rejected() {
        let mut gate = EnergyGate::default();
        assert_eq!(gate.classify(&window(vec![0.0; 16_000])).decision, VadDecision::Silence);
    }

    #[test]
    fn loud_window_passes() {
        let mut gate = EnergyGate::default();
        assert_eq!(gate.classify(&window(vec![0.5; 160])).decision, VadDecision::Speech);
    }

    #[test]
    fn reading_carries_the_measured_energy() {
        let mut gate = EnergyGate::new(0.3);
        let reading = gate.classify(&window(vec![0.25, -0.25, 0.5, -0.5]));
        approx::assert_relative_eq!(reading.energy, 0.375);
        assert!(reading.is_speech());

        let quiet = gate.classify(&window(vec![0.1, -0.1]));
        approx::assert_relative_eq!(quiet.energy, 0.1);
        assert!(!quiet.is_speech());
    }

    #[test]
    fn threshold_is_inclusive() {
        let gate = EnergyGate::new(0.25);
        assert!(gate.is_voiced(&[0.25, -0.25, 0.25, -0.25]));
        assert!(!gate.is_voiced(&[0.25, -0.25, 0.25, -0.24]));
    }

    #[test]
    fn sign_does_not_cancel_energy() {
        // Mean of the raw samples is 0, mean absolute amplitude is 0.5.
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        approx::assert_relative_eq!(EnergyGate::mean_abs_energy(&samples), 0.5);
    }

    #[test]
    fn empty_window_is_silence() {
        let mut gate = EnergyGate::default();
        let reading = gate.classify(&window(vec![]));
        assert_eq!(reading.decision, VadDecision::Silence);
        assert_eq!(reading.energy, 0.0);
    }
}
