//! MFCC extraction: pre-emphasis, framing, FFT magnitude, mel energies, DCT-II.
//!
//! ## Numeric conventions (must match the classifier's training frontend)
//!
//! | Step           | Convention                                              |
//! |----------------|---------------------------------------------------------|
//! | Pre-emphasis   | in place, forward: `x[i] -= a * x[i-1]` on updated `x`  |
//! | Framing        | rectangular, no window function, partial tail dropped   |
//! | FFT            | complex forward, symmetric `1/sqrt(n_fft)` scaling      |
//! | Mel energies   | magnitude (not power) weighted by triangles             |
//! | DCT            | type II, unnormalized, `n_mfcc` may exceed filter count |
//!
//! Everything is f32.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{FeatureMatrix, MelFilterbank, MfccConfig};
use crate::error::Result;

/// Precomputed MFCC frontend. Holds only immutable tables, so one extractor
/// can serve every window.
pub struct MfccExtractor {
    config: MfccConfig,
    fft: Arc<dyn Fft<f32>>,
    filterbank: MelFilterbank,
    /// `n_mfcc × num_filters` cosine table, row-major.
    dct_table: Vec<f32>,
    fft_scale: f32,
}

impl std::fmt::Debug for MfccExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfccExtractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MfccExtractor {
    /// # Errors
    /// Returns `VoxcueError::Config` when `config` fails validation.
    pub fn new(config: MfccConfig) -> Result<Self> {
        config.validate()?;

        let fft = FftPlanner::<f32>::new().plan_fft_forward(config.n_fft);
        let filterbank = MelFilterbank::new(&config);
        let dct_table = build_dct_table(config.n_mfcc, filterbank.len());
        let fft_scale = 1.0 / (config.n_fft as f32).sqrt();

        Ok(Self {
            config,
            fft,
            filterbank,
            dct_table,
            fft_scale,
        })
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    pub fn filterbank(&self) -> &MelFilterbank {
        &self.filterbank
    }

    /// Compute the flattened MFCC matrix of one audio window.
    ///
    /// `samples` is not modified. A window of at most `n_fft` samples yields
    /// an empty matrix.
    pub fn extract(&self, samples: &[f32]) -> FeatureMatrix {
        let n_fft = self.config.n_fft;
        let n_mfcc = self.config.n_mfcc;
        let frames = self.config.frame_count(samples.len());
        if frames == 0 {
            return FeatureMatrix::new(Vec::new(), n_mfcc);
        }

        let mut signal = samples.to_vec();
        pre_emphasize(&mut signal, self.config.pre_emphasis);

        let mut out = vec![0.0f32; frames * n_mfcc];
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut magnitudes = vec![0.0f32; n_fft];
        let mut mel = vec![0.0f32; self.filterbank.len()];

        for (frame, coeffs) in out.chunks_exact_mut(n_mfcc).enumerate() {
            let start = frame * self.config.hop_length;
            self.magnitude_spectrum(&signal[start..start + n_fft], &mut fft_buf, &mut magnitudes);
            self.filterbank.apply(&magnitudes, &mut mel);
            self.dct(&mel, coeffs);
        }

        FeatureMatrix::new(out, n_mfcc)
    }

    /// Mel energies of a single frame (no pre-emphasis applied).
    pub fn mel_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        let n_fft = self.config.n_fft;
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut magnitudes = vec![0.0f32; n_fft];
        let mut mel = vec![0.0f32; self.filterbank.len()];
        self.magnitude_spectrum(frame, &mut fft_buf, &mut magnitudes);
        self.filterbank.apply(&magnitudes, &mut mel);
        mel
    }

    /// Unnormalized DCT-II of a mel spectrum into `out` (`n_mfcc` values).
    pub fn dct(&self, mel: &[f32], out: &mut [f32]) {
        let n = self.filterbank.len();
        for (k, coeff) in out.iter_mut().enumerate().take(self.config.n_mfcc) {
            let row = &self.dct_table[k * n..(k + 1) * n];
            let mut sum = 0.0f32;
            for (m, c) in mel.iter().zip(row) {
                sum += m * c;
            }
            *coeff = sum;
        }
    }

    /// Magnitudes of all `n_fft` bins of a real frame. Frames shorter than
    /// `n_fft` are zero-extended.
    fn magnitude_spectrum(&self, frame: &[f32], buf: &mut [Complex<f32>], out: &mut [f32]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = Complex::new(frame.get(i).copied().unwrap_or(0.0), 0.0);
        }
        self.fft.process(buf);
        for (mag, bin) in out.iter_mut().zip(buf.iter()) {
            *mag = (*bin * self.fft_scale).norm();
        }
    }
}

/// Pre-emphasis filter, applied in place walking forward so each step sees
/// the already-filtered previous sample.
pub fn pre_emphasize(samples: &mut [f32], coeff: f32) {
    for i in 1..samples.len() {
        samples[i] -= coeff * samples[i - 1];
    }
}

fn build_dct_table(n_mfcc: usize, n_filters: usize) -> Vec<f32> {
    let mut table = Vec::with_capacity(n_mfcc * n_filters);
    let denom = (2 * n_filters) as f32;
    for k in 0..n_mfcc {
        for n in 0..n_filters {
            table.push((PI * k as f32 * (2 * n + 1) as f32 / denom).cos());
        }
    }
    table
}
