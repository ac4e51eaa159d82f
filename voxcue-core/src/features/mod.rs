//! MFCC feature frontend.
//!
//! ```text
//! AudioWindow ─► pre-emphasis ─► frames (n_fft, hop) ─► |FFT| ─► mel filterbank ─► DCT-II
//!                                                                      │
//!                                              FeatureMatrix (frames × n_mfcc, flattened)
//! ```
//!
//! The parameters must match whatever the classifier was trained with; the
//! defaults reproduce the reference keyword model frontend.

pub mod mel;
pub mod mfcc;

pub use mel::MelFilterbank;
pub use mfcc::MfccExtractor;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxcueError};

/// MFCC frontend parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct MfccConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub num_mel_filters: usize,
    pub n_mfcc: usize,
    pub min_hz: f32,
    pub max_hz: f32,
    pub pre_emphasis: f32,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            n_fft: 512,
            hop_length: 256,
            num_mel_filters: 26,
            n_mfcc: 40,
            min_hz: 0.0,
            max_hz: 8_000.0,
            pre_emphasis: 0.97,
        }
    }
}

impl MfccConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VoxcueError::Config("sampleRate must be > 0".into()));
        }
        if self.n_fft < 2 || self.hop_length == 0 {
            return Err(VoxcueError::Config(format!(
                "nFft ({}) must be ≥ 2 and hopLength ({}) > 0",
                self.n_fft, self.hop_length
            )));
        }
        if self.num_mel_filters == 0 || self.n_mfcc == 0 {
            return Err(VoxcueError::Config(
                "numMelFilters and nMfcc must be > 0".into(),
            ));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(0.0..self.max_hz).contains(&self.min_hz) || self.max_hz > nyquist {
            return Err(VoxcueError::Config(format!(
                "mel range {}..{} Hz must be ascending and within Nyquist ({nyquist} Hz)",
                self.min_hz, self.max_hz
            )));
        }
        Ok(())
    }

    /// Frames produced for a window of `len` samples. Trailing samples that
    /// do not fill a whole frame are dropped, and a window no longer than
    /// one frame yields none.
    pub fn frame_count(&self, len: usize) -> usize {
        if len <= self.n_fft {
            0
        } else {
            (len - self.n_fft) / self.hop_length + 1
        }
    }
}

/// Per-frame MFCC vectors of one window, flattened in frame order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureMatrix {
    data: Vec<f32>,
    n_coeffs: usize,
}

impl FeatureMatrix {
    pub fn new(data: Vec<f32>, n_coeffs: usize) -> Self {
        Self { data, n_coeffs }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn n_coeffs(&self) -> usize {
        self.n_coeffs
    }

    pub fn frame_count(&self) -> usize {
        if self.n_coeffs == 0 {
            0
        } else {
            self.data.len() / self.n_coeffs
        }
    }

    /// MFCC vector of frame `i`.
    pub fn frame(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(self.n_coeffs)?;
        self.data.get(start..start + self.n_coeffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        MfccConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_max_hz_above_nyquist() {
        let cfg = MfccConfig {
            sample_rate: 8_000,
            ..MfccConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(VoxcueError::Config(_))));
    }

    #[test]
    fn rejects_zero_hop() {
        let cfg = MfccConfig {
            hop_length: 0,
            ..MfccConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn frame_count_drops_partial_tail() {
        let cfg = MfccConfig::default();
        assert_eq!(cfg.frame_count(0), 0);
        assert_eq!(cfg.frame_count(511), 0);
        assert_eq!(cfg.frame_count(512), 0);
        assert_eq!(cfg.frame_count(513), 1);
        assert_eq!(cfg.frame_count(767), 1);
        assert_eq!(cfg.frame_count(768), 2);
        assert_eq!(cfg.frame_count(16_000), 61);
    }

    #[test]
    fn feature_matrix_frames() {
        let m = FeatureMatrix::new((0..6).map(|v| v as f32).collect(), 3);
        assert_eq!(m.frame_count(), 2);
        assert_eq!(m.frame(1), Some(&[3.0, 4.0, 5.0][..]));
        assert_eq!(m.frame(2), None);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: MfccConfig = serde_json::from_str(r#"{"nMfcc": 13}"#).unwrap();
        assert_eq!(cfg.n_mfcc, 13);
        assert_eq!(cfg.n_fft, 512);
    }
}
