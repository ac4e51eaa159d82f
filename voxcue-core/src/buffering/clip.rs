//! Fixed-capacity looping recording buffer with a write cursor.
//!
//! Behaves like a looping device clip: writes wrap at the end, and the most
//! recent `len` samples are read back in chronological order. When the
//! requested span crosses the end of the buffer the read is the tail segment
//! `[C + start, C)` followed by the head segment `[0, cursor)`.

#[derive(Debug, Clone)]
pub struct LoopingClip {
    samples: Vec<f32>,
    cursor: usize,
    written: u64,
}

impl LoopingClip {
    /// `capacity` is clamped to at least one sample.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
            cursor: 0,
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Index the next sample will be written to.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Samples written since creation (not capped by capacity).
    pub fn total_written(&self) -> u64 {
        self.written
    }

    pub fn write(&mut self, data: &[f32]) {
        let cap = self.samples.len();
        self.written += data.len() as u64;

        // Only the newest `cap` samples can survive.
        let mut data = data;
        if data.len() > cap {
            let skip = data.len() - cap;
            self.cursor = (self.cursor + skip) % cap;
            data = &data[skip..];
        }

        let first = (cap - self.cursor).min(data.len());
        self.samples[self.cursor..self.cursor + first].copy_from_slice(&data[..first]);
        let rest = &data[first..];
        self.samples[..rest.len()].copy_from_slice(rest);
        self.cursor = (self.cursor + data.len()) % cap;
    }

    /// The `len` samples ending just before the cursor, oldest first.
    ///
    /// Returns `None` until `len` samples have been written, or if `len`
    /// exceeds the capacity.
    pub fn read_latest(&self, len: usize) -> Option<Vec<f32>> {
        if len > self.capacity() || self.written < len as u64 {
            return None;
        }
        Some(self.read_ending_at(self.cursor, len))
    }

    /// The `len` samples ending just before index `end`, wrapping backwards
    /// past index 0 when `end < len`.
    ///
    /// # Panics
    /// Panics if `len > capacity` or `end > capacity`.
    pub fn read_ending_at(&self, end: usize, len: usize) -> Vec<f32> {
        let cap = self.capacity();
        assert!(len <= cap && end <= cap, "read of {len} ending at {end} exceeds clip of {cap}");

        let mut out = Vec::with_capacity(len);
        if let Some(start) = end.checked_sub(len) {
            out.extend_from_slice(&self.samples[start..end]);
        } else {
            let tail_start = cap - (len - end);
            out.extend_from_slice(&self.samples[tail_start..]);
            out.extend_from_slice(&self.samples[..end]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn ramp(from: usize, len: usize) -> Vec<f32> {
        (from..from + len).map(|v| v as f32).collect()
    }

    #[test]
    fn underrun_reads_nothing() {
        let mut clip = LoopingClip::new(16);
        clip.write(&ramp(0, 7));
        assert_eq!(clip.read_latest(8), None);
        clip.write(&ramp(7, 1));
        assert_eq!(clip.read_latest(8), Some(ramp(0, 8)));
    }

    #[test]
    fn wrapped_read_is_tail_then_head() {
        let mut clip = LoopingClip::new(10);
        clip.write(&ramp(0, 14)); // cursor = 4, buffer holds 10..14 at [0..4), 4..10 at [4..10)
        assert_eq!(clip.position(), 4);
        // start = 4 - 6 = -2 → tail [8, 10) then head [0, 4)
        assert_eq!(clip.read_latest(6), Some(vec![8.0, 9.0, 10.0, 11.0, 12.0, 13.0]));
    }

    #[test]
    fn full_capacity_read_wraps() {
        let mut clip = LoopingClip::new(8);
        clip.write(&ramp(0, 11));
        assert_eq!(clip.read_latest(8), Some(ramp(3, 8)));
    }

    #[test]
    fn oversized_write_keeps_newest_samples() {
        let mut clip = LoopingClip::new(5);
        clip.write(&ramp(0, 2));
        clip.write(&ramp(2, 12));
        assert_eq!(clip.total_written(), 14);
        assert_eq!(clip.position(), 14 % 5);
        assert_eq!(clip.read_latest(5), Some(ramp(9, 5)));
    }

    #[test]
    fn read_longer_than_capacity_is_refused() {
        let mut clip = LoopingClip::new(4);
        clip.write(&ramp(0, 20));
        assert_eq!(clip.read_latest(5), None);
    }

    #[test]
    fn matches_linear_history_for_random_writes() {
        let mut rng = StdRng::seed_from_u64(11);
        let cap = 1_000;
        let window = 640;
        let mut clip = LoopingClip::new(cap);
        let mut history: Vec<f32> = Vec::new();

        for _ in 0..400 {
            let n = rng.gen_range(0..300);
            let chunk: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
            clip.write(&chunk);
            history.extend_from_slice(&chunk);

            match clip.read_latest(window) {
                Some(read) => assert_eq!(read, history[history.len() - window..]),
                None => assert!(history.len() < window),
            }
        }
    }
}
