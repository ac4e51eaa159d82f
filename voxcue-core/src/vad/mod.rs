//! Voice Activity Detection (VAD) abstraction.
//!
//! The `VoiceActivityDetector` trait is the pipeline's gate: windows it
//! rejects never reach MFCC extraction or the classifier. `EnergyGate` is the
//! default.

pub mod energy;

pub use energy::EnergyGate;

use crate::buffering::window::AudioWindow;

/// Whether a window is worth classifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// Energy at or above threshold.
    Speech,
    /// Silent or below threshold.
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// A decision together with the energy figure it was based on, so callers
/// can report activity without measuring the window twice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadReading {
    pub decision: VadDecision,
    pub energy: f32,
}

impl VadReading {
    pub fn is_speech(self) -> bool {
        self.decision.is_speech()
    }
}

/// Trait for all VAD implementations.
pub trait VoiceActivityDetector: Send + 'static {
    /// Analyse a window once and return the decision with its energy.
    fn classify(&mut self, window: &AudioWindow) -> VadReading;

    /// Reset any internal state.
    fn reset(&mut self) {}
}
