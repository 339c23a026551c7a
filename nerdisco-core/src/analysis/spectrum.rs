//! Sliding-window FFT over a carry-over sample buffer.
//!
//! ## Per call
//!
//! ```text
//! carry ← carry ++ samples
//! while carry[offset..] holds a full window:
//!     hann → FFT → per-bin power → dB → accumulate
//!     offset += window - overlap
//! mean dB per bin → octave bands → SQNR normalization
//! carry ← carry[offset..]            (always shorter than one window)
//! ```
//!
//! Fewer samples than one window is not an error: nothing is emitted and the
//! samples wait for the next call.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use super::bands::{normalize_bands, sqnr_db, OctaveBands, SpectrumFrame, POWER_FLOOR};

/// Upper sample rate (inclusive) of the 1024-point tier.
pub const SMALL_WINDOW_MAX_RATE: u32 = 11_025;
/// Upper sample rate (inclusive) of the 2048-point tier.
pub const MEDIUM_WINDOW_MAX_RATE: u32 = 44_100;

/// FFT window size for a sample rate: 1024, 2048 or 4096.
pub fn window_size_for_rate(sample_rate: u32) -> usize {
    if sample_rate <= SMALL_WINDOW_MAX_RATE {
        1024
    } else if sample_rate <= MEDIUM_WINDOW_MAX_RATE {
        2048
    } else {
        4096
    }
}

/// Samples shared between consecutive windows: one eighth of the window.
pub fn overlap_for_window(window_size: usize) -> usize {
    window_size / 8
}

/// Hann coefficients `0.5·(1 − cos(2πn/(N−1)))`.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f32 / denom).cos()))
        .collect()
}

/// Persistent spectral analysis state for one capture configuration.
///
/// Rebuilt from scratch whenever the sample rate or bit depth changes so that
/// one window never mixes samples captured under different settings.
pub struct SpectrumAnalyzer {
    sample_rate: u32,
    bit_depth: u16,
    window_size: usize,
    bin_count: usize,
    overlap: usize,
    window: Vec<f32>,
    window_sum: f32,
    sqnr_db: f32,
    bands: OctaveBands,
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Per-bin dB sum across the windows of the current call.
    accum_db: Vec<f32>,
    /// Samples received but not yet consumed by a full window.
    carry: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32, bit_depth: u16) -> Self {
        let window_size = window_size_for_rate(sample_rate);
        let bin_count = window_size / 2 + 1;
        let window = hann_window(window_size);
        let window_sum = window.iter().sum();
        let fft = FftPlanner::<f32>::new().plan_fft_forward(window_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        debug!(sample_rate, bit_depth, window_size, bin_count, "spectrum state allocated");

        Self {
            sample_rate,
            bit_depth,
            window_size,
            bin_count,
            overlap: overlap_for_window(window_size),
            window,
            window_sum,
            sqnr_db: sqnr_db(bit_depth),
            bands: OctaveBands::new(sample_rate, window_size),
            fft,
            fft_buf: vec![Complex::new(0.0, 0.0); window_size],
            scratch,
            accum_db: vec![0.0; bin_count],
            carry: Vec::with_capacity(window_size * 2),
        }
    }

    /// `true` when this state was built for the given configuration.
    pub fn matches(&self, sample_rate: u32, bit_depth: u16) -> bool {
        self.sample_rate == sample_rate && self.bit_depth == bit_depth
    }

    /// Drop buffered samples without reallocating.
    pub fn clear(&mut self) {
        self.carry.clear();
    }

    /// Append mono samples and emit a spectrum if at least one window completed.
    pub fn process(&mut self, samples: &[f32]) -> Option<SpectrumFrame> {
        self.carry.extend_from_slice(samples);
        if self.carry.len() < self.window_size {
            return None;
        }

        self.accum_db.iter_mut().for_each(|v| *v = 0.0);
        let hop = self.window_size - self.overlap;
        let mut offset = 0;
        let mut chunks = 0usize;
        while offset + self.window_size <= self.carry.len() {
            self.accumulate_window(offset);
            offset += hop;
            chunks += 1;
        }
        self.carry.drain(..offset);

        let scale = 1.0 / chunks as f32;
        self.accum_db.iter_mut().for_each(|v| *v *= scale);

        let bands_db = self.bands.reduce(&self.accum_db);
        Some(normalize_bands(bands_db, self.sqnr_db))
    }

    fn accumulate_window(&mut self, offset: usize) {
        let input = &self.carry[offset..offset + self.window_size];
        for ((slot, &s), &w) in self.fft_buf.iter_mut().zip(input).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.fft_buf, &mut self.scratch);

        // Amplitude scaled by 2/Σw so a full-scale sine peaks near 0 dB.
        let amp_scale = if self.window_sum > 0.0 {
            2.0 / self.window_sum
        } else {
            1.0
        };
        let power_scale = amp_scale * amp_scale;
        for (acc, bin) in self.accum_db.iter_mut().zip(&self.fft_buf[..self.bin_count]) {
            let power = (bin.norm_sqr() * power_scale).max(POWER_FLOOR);
            *acc += 10.0 * power.log10();
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn window_sum(&self) -> f32 {
        self.window_sum
    }

    pub fn bands(&self) -> &OctaveBands {
        &self.bands
    }

    /// Samples waiting for the next window.
    pub fn carry_len(&self) -> usize {
        self.carry.len()
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("bit_depth", &self.bit_depth)
            .field("window_size", &self.window_size)
            .field("carry_len", &self.carry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * freq * n as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn window_tiers_follow_sample_rate() {
        assert_eq!(window_size_for_rate(8_000), 1024);
        assert_eq!(window_size_for_rate(11_025), 1024);
        assert_eq!(window_size_for_rate(11_026), 2048);
        assert_eq!(window_size_for_rate(16_000), 2048);
        assert_eq!(window_size_for_rate(22_049), 2048);
        assert_eq!(window_size_for_rate(22_050), 2048);
        assert_eq!(window_size_for_rate(44_100), 2048);
        assert_eq!(window_size_for_rate(44_101), 4096);
        assert_eq!(window_size_for_rate(48_000), 4096);
        assert_eq!(window_size_for_rate(192_000), 4096);
    }

    #[test]
    fn overlap_is_an_eighth() {
        assert_eq!(overlap_for_window(1024), 128);
        assert_eq!(overlap_for_window(2048), 256);
        assert_eq!(overlap_for_window(4096), 512);
    }

    #[test]
    fn hann_is_zero_at_edges_and_one_in_the_middle() {
        let w = hann_window(1025);
        assert!(w[0].abs() <= 1e-6);
        assert!(w[1024].abs() <= 1e-6);
        assert!((w[512] - 1.0).abs() <= 1e-6);
    }

    #[test]
    fn state_is_sized_from_rate() {
        let state = SpectrumAnalyzer::new(44_100, 16);
        assert_eq!(state.window_size(), 2048);
        assert_eq!(state.bin_count(), 1025);
        assert_eq!(state.overlap(), 256);
        // Σ hann(N) = (N-1)/2
        assert!((state.window_sum() - 1023.5).abs() <= 0.05);
        assert!(state.matches(44_100, 16));
        assert!(!state.matches(44_100, 24));
    }

    #[test]
    fn short_input_is_carried_over_silently() {
        let mut state = SpectrumAnalyzer::new(44_100, 16);
        assert!(state.process(&vec![0.1; 1024]).is_none());
        assert_eq!(state.carry_len(), 1024);
        assert!(state.process(&[]).is_none());
        assert_eq!(state.carry_len(), 1024);
    }

    #[test]
    fn carry_over_stays_below_one_window() {
        let mut state = SpectrumAnalyzer::new(44_100, 16);
        let tone = sine(440.0, 44_100, 0.5, 10_000);
        for chunk in tone.chunks(777) {
            state.process(chunk);
            assert!(state.carry_len() < state.window_size());
        }
    }

    #[test]
    fn exact_window_leaves_the_unconsumed_tail() {
        let mut state = SpectrumAnalyzer::new(44_100, 16);
        let frame = state.process(&sine(440.0, 44_100, 0.5, 2048));
        assert!(frame.is_some());
        // One window consumed, offset advanced by 2048 - 256.
        assert_eq!(state.carry_len(), 256);
    }

    #[test]
    fn loud_sine_lands_in_its_octave_band() {
        let mut state = SpectrumAnalyzer::new(44_100, 16);
        let frame = state
            .process(&sine(1_000.0, 44_100, 1.0, 4096))
            .expect("spectrum");
        // 1 kHz sits in band 6. Its peak bins approach 0 dB but the band
        // average also covers the window's skirt.
        assert_eq!(frame.peak_band(), 6);
        assert!(frame.bands[6] > 0.2, "band6={}", frame.bands[6]);
        assert!(frame.bands[6] < 1.1, "band6={}", frame.bands[6]);
    }

    #[test]
    fn silence_stays_finite() {
        let mut state = SpectrumAnalyzer::new(11_025, 8);
        let frame = state.process(&vec![0.0; 2048]).expect("spectrum");
        for v in frame.bands {
            assert!(v.is_finite());
            assert!(v < 0.0, "silence should sit under the noise floor, got {v}");
        }
    }

    #[test]
    fn clear_drops_carry_over() {
        let mut state = SpectrumAnalyzer::new(44_100, 16);
        state.process(&vec![0.2; 100]);
        state.clear();
        assert_eq!(state.carry_len(), 0);
    }
}
