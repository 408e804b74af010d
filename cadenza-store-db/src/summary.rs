// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Precomputed block statistics used to draw waveforms without reading
//! the payload.

/// Frames covered by one entry of the fine summary.
pub const FRAMES_PER_256: usize = 256;
/// Frames covered by one entry of the coarse summary.
pub const FRAMES_PER_64K: usize = 65536;

/// Summary statistics of one block at three granularities: the whole block,
/// and per-256 and per-65536 frame windows. Windowed summaries are packed as
/// little-endian `f32` `(min, max, rms)` triples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockSummary {
    pub min: f32,
    pub max: f32,
    pub rms: f32,
    pub summary_256: Vec<u8>,
    pub summary_64k: Vec<u8>,
}

impl BlockSummary {
    pub fn from_samples(samples: &[f32]) -> Self {
        let Some(whole) = Window::of(samples) else {
            return Self::default();
        };
        Self {
            min: whole.min,
            max: whole.max,
            rms: whole.rms(),
            summary_256: pack(samples, FRAMES_PER_256),
            summary_64k: pack(samples, FRAMES_PER_64K),
        }
    }

    /// Decode the per-256 frame triples.
    pub fn windows_256(&self) -> Vec<(f32, f32, f32)> {
        unpack(&self.summary_256)
    }

    /// Decode the per-65536 frame triples.
    pub fn windows_64k(&self) -> Vec<(f32, f32, f32)> {
        unpack(&self.summary_64k)
    }
}

struct Window {
    min: f32,
    max: f32,
    sum_sq: f64,
    len: usize,
}

impl Window {
    fn of(samples: &[f32]) -> Option<Self> {
        let first = *samples.first()?;
        let mut w = Window {
            min: first,
            max: first,
            sum_sq: 0.0,
            len: samples.len(),
        };
        for &s in samples {
            w.min = w.min.min(s);
            w.max = w.max.max(s);
            w.sum_sq += f64::from(s) * f64::from(s);
        }
        Some(w)
    }

    fn rms(&self) -> f32 {
        (self.sum_sq / self.len as f64).sqrt() as f32
    }
}

fn pack(samples: &[f32], frames: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len().div_ceil(frames) * 12);
    for w in samples.chunks(frames).filter_map(Window::of) {
        out.extend_from_slice(&w.min.to_le_bytes());
        out.extend_from_slice(&w.max.to_le_bytes());
        out.extend_from_slice(&w.rms().to_le_bytes());
    }
    out
}

fn unpack(bytes: &[u8]) -> Vec<(f32, f32, f32)> {
    let f = |b: &[u8]| f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    bytes
        .chunks_exact(12)
        .map(|t| (f(&t[0..4]), f(&t[4..8]), f(&t[8..12])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_block() {
        assert_eq!(BlockSummary::from_samples(&[]), BlockSummary::default());
    }

    #[test]
    fn test_whole_block_statistics() {
        let s = BlockSummary::from_samples(&[-0.5, 0.5, 0.5, -0.5]);
        assert_eq!(s.min, -0.5);
        assert_eq!(s.max, 0.5);
        assert!((s.rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_window_counts() {
        let samples: Vec<f32> = (0..600).map(|i| i as f32 / 600.0).collect();
        let s = BlockSummary::from_samples(&samples);

        let fine = s.windows_256();
        assert_eq!(fine.len(), 3);
        assert_eq!(s.summary_256.len(), 3 * 12);
        assert_eq!(fine[0].0, 0.0);
        assert_eq!(fine[2].1, 599.0 / 600.0);

        let coarse = s.windows_64k();
        assert_eq!(coarse.len(), 1);
        assert_eq!((coarse[0].0, coarse[0].1), (s.min, s.max));
    }
}
