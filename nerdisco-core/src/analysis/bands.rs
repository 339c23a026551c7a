//! Octave banding and SQNR normalization of a linear dB spectrum.
//!
//! Band `i` is centred on `15.625 · 2^i` Hz and spans `[c/√2, c·√2]`.
//! Eleven bands cover 11 Hz – 22.6 kHz.

use std::f32::consts::SQRT_2;

use serde::{Deserialize, Serialize};

/// Number of octave bands in a [`SpectrumFrame`].
pub const BAND_COUNT: usize = 11;

/// Centre frequency of band 0 in Hz.
pub const BASE_BAND_HZ: f32 = 15.625;

/// Floor applied to bin power before taking the logarithm (−120 dB).
pub const POWER_FLOOR: f32 = 1e-12;

/// dB value corresponding to [`POWER_FLOOR`].
pub const DB_FLOOR: f32 = -120.0;

/// Eleven SQNR-normalized octave band values.
///
/// Quieter-than-quantization content trends toward 0, full-scale content
/// toward 1. Values are not clamped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpectrumFrame {
    pub bands: [f32; BAND_COUNT],
}

impl SpectrumFrame {
    /// Index of the loudest band.
    pub fn peak_band(&self) -> usize {
        self.bands
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            })
            .0
    }
}

/// Centre frequency of band `index` in Hz.
pub fn band_center_hz(index: usize) -> f32 {
    BASE_BAND_HZ * 2f32.powi(index as i32)
}

/// `[low, high]` frequency edges of band `index` in Hz.
pub fn band_edges_hz(index: usize) -> (f32, f32) {
    let center = band_center_hz(index);
    (center / SQRT_2, center * SQRT_2)
}

/// Signal-to-quantization-noise ratio for a bit depth: `20·log10(2^bits)`.
pub fn sqnr_db(bit_depth: u16) -> f32 {
    20.0 * 2f32.powi(i32::from(bit_depth)).log10()
}

/// Precomputed inclusive bin ranges for each band at one
/// (sample rate, window size) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctaveBands {
    /// `None` when the band lies entirely above the last usable bin.
    ranges: [Option<(usize, usize)>; BAND_COUNT],
}

impl OctaveBands {
    pub fn new(sample_rate: u32, window_size: usize) -> Self {
        let mut ranges = [None; BAND_COUNT];
        let bin_count = window_size / 2 + 1;
        if sample_rate == 0 || bin_count < 3 {
            return Self { ranges };
        }

        let bin_hz = sample_rate as f32 / window_size as f32;
        // Bin 0 is DC and the last bin is Nyquist; neither belongs to a band.
        let last_usable = bin_count - 2;

        for (index, range) in ranges.iter_mut().enumerate() {
            let (low_hz, high_hz) = band_edges_hz(index);
            let low = ((low_hz / bin_hz).round() as usize).max(1);
            let high = ((high_hz / bin_hz).round() as usize).min(last_usable);
            if low <= high {
                *range = Some((low, high));
            }
        }
        Self { ranges }
    }

    /// Inclusive bin range of band `index`.
    pub fn range(&self, index: usize) -> Option<(usize, usize)> {
        self.ranges.get(index).copied().flatten()
    }

    /// Average the dB values of each band's bins.
    pub fn reduce(&self, bins_db: &[f32]) -> [f32; BAND_COUNT] {
        let mut out = [DB_FLOOR; BAND_COUNT];
        for (value, range) in out.iter_mut().zip(&self.ranges) {
            let Some((low, high)) = *range else { continue };
            let Some(slice) = bins_db.get(low..=high) else { continue };
            *value = slice.iter().sum::<f32>() / slice.len() as f32;
        }
        out
    }
}

/// Map band dB values into SQNR-relative units: `(sqnr + db) / sqnr`.
pub fn normalize_bands(bands_db: [f32; BAND_COUNT], sqnr_db: f32) -> SpectrumFrame {
    let mut bands = bands_db;
    if sqnr_db > 0.0 {
        for value in &mut bands {
            *value = (sqnr_db + *value) / sqnr_db;
        }
    }
    SpectrumFrame { bands }
}
