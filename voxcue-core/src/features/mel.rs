//! Triangular mel filterbank over FFT magnitude bins.
//!
//! Filter edges are `num_filters + 2` points equally spaced on the mel scale
//! between `min_hz` and `max_hz`, mapped to bins with
//! `floor((n_fft + 1) * hz / sample_rate)`. Filter `m` rises over
//! `[edge[m], edge[m+1])` and falls over `[edge[m+1], edge[m+2])`, peaking at
//! exactly 1.0 on its center bin.

use super::MfccConfig;

pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// One triangle. `weights[i]` applies to bin `left + i`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangularFilter {
    pub left: usize,
    pub center: usize,
    pub right: usize,
    weights: Vec<f32>,
}

impl TriangularFilter {
    fn new(left: usize, center: usize, right: usize) -> Self {
        let mut weights = Vec::with_capacity(right.saturating_sub(left));
        for j in left..center {
            weights.push((j - left) as f32 / (center - left) as f32);
        }
        for j in center..right {
            weights.push((right - j) as f32 / (right - center) as f32);
        }
        Self {
            left,
            center,
            right,
            weights,
        }
    }

    /// Weight applied to FFT bin `bin`; zero outside `[left, right)`.
    pub fn weight(&self, bin: usize) -> f32 {
        bin.checked_sub(self.left)
            .and_then(|i| self.weights.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Weighted sum of `magnitudes` under this triangle, in ascending bin order.
    fn apply(&self, magnitudes: &[f32]) -> f32 {
        let mut energy = 0.0f32;
        for (i, &w) in self.weights.iter().enumerate() {
            if let Some(&m) = magnitudes.get(self.left + i) {
                energy += w * m;
            }
        }
        energy
    }
}

#[derive(Debug, Clone)]
pub struct MelFilterbank {
    filters: Vec<TriangularFilter>,
    edges: Vec<usize>,
}

impl MelFilterbank {
    pub fn new(config: &MfccConfig) -> Self {
        let n = config.num_mel_filters;
        let min_mel = hz_to_mel(config.min_hz);
        let max_mel = hz_to_mel(config.max_hz);
        let top_bin = config.n_fft / 2;

        let edges: Vec<usize> = (0..n + 2)
            .map(|i| {
                let mel = min_mel + (max_mel - min_mel) * i as f32 / (n + 1) as f32;
                let bin =
                    ((config.n_fft + 1) as f32 * mel_to_hz(mel) / config.sample_rate as f32).floor();
                (bin.max(0.0) as usize).min(top_bin)
            })
            .collect();

        let filters = edges
            .windows(3)
            .map(|e| TriangularFilter::new(e[0], e[1], e[2]))
            .collect();

        Self { filters, edges }
    }

    pub fn filters(&self) -> &[TriangularFilter] {
        &self.filters
    }

    /// The `num_filters + 2` bin edges, ascending.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter energies for one magnitude spectrum.
    pub fn apply(&self, magnitudes: &[f32], out: &mut [f32]) {
        for (slot, filter) in out.iter_mut().zip(&self.filters) {
            *slot = filter.apply(magnitudes);
        }
    }
}
