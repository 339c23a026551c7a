//! Level metering and octave spectrum analysis.
//!
//! [`Analyzer`] is the only stateful stage in the pipeline: it owns the
//! [`SpectrumAnalyzer`] carry-over buffer and must be driven from a single
//! thread, one frame at a time, in capture order.
//!
//! Beat detection is intentionally absent; see the crate docs.

pub mod bands;
pub mod spectrum;

pub use bands::{SpectrumFrame, BAND_COUNT};
pub use spectrum::SpectrumAnalyzer;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{buffering::frame::NormalizedFrame, convert::downmix_to_mono};

/// Per-channel peak magnitude of one frame. No cross-frame memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelVector(pub Vec<f32>);

impl LevelVector {
    pub fn channels(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Result of analysing one frame. A disabled stage, or a spectrum that is
/// still waiting for a full window, is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalysisOutput {
    pub levels: Option<LevelVector>,
    pub spectrum: Option<SpectrumFrame>,
}

/// Maximum absolute sample value per channel.
pub fn peak_levels(samples: &[f32], channels: u16) -> LevelVector {
    let ch = usize::from(channels);
    let mut levels = vec![0.0f32; ch];
    if ch == 0 {
        return LevelVector(levels);
    }
    for frame in samples.chunks_exact(ch) {
        for (level, sample) in levels.iter_mut().zip(frame) {
            *level = level.max(sample.abs());
        }
    }
    LevelVector(levels)
}

/// Stateful per-session analyzer.
#[derive(Debug)]
pub struct Analyzer {
    enable_levels: bool,
    enable_spectrum: bool,
    spectrum: SpectrumAnalyzer,
}

impl Analyzer {
    /// Create an analyzer with both levels and spectrum enabled.
    pub fn new(sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            enable_levels: true,
            enable_spectrum: true,
            spectrum: SpectrumAnalyzer::new(sample_rate, bit_depth),
        }
    }

    pub fn with_stages(mut self, enable_levels: bool, enable_spectrum: bool) -> Self {
        self.enable_levels = enable_levels;
        self.enable_spectrum = enable_spectrum;
        self
    }

    /// Adopt a capture configuration. Reallocates the analysis state, and
    /// drops any buffered samples, when sample rate or bit depth differ.
    ///
    /// Returns `true` if the state was rebuilt.
    pub fn configure(&mut self, sample_rate: u32, bit_depth: u16) -> bool {
        if self.spectrum.matches(sample_rate, bit_depth) {
            return false;
        }
        info!(
            from_rate = self.spectrum.sample_rate(),
            from_bits = self.spectrum.bit_depth(),
            sample_rate,
            bit_depth,
            "capture configuration changed, reallocating analysis state"
        );
        self.spectrum = SpectrumAnalyzer::new(sample_rate, bit_depth);
        true
    }

    /// Forget buffered samples (new session, unrelated audio).
    pub fn reset(&mut self) {
        self.spectrum.clear();
    }

    /// Analyse one frame.
    pub fn process(&mut self, frame: &NormalizedFrame) -> AnalysisOutput {
        let levels = self
            .enable_levels
            .then(|| peak_levels(&frame.samples, frame.channels));

        let spectrum = if self.enable_spectrum && !frame.is_empty() {
            if frame.channels > 1 {
                let mono = downmix_to_mono(&frame.samples, usize::from(frame.channels));
                self.spectrum.process(&mono)
            } else {
                self.spectrum.process(&frame.samples)
            }
        } else {
            None
        };

        AnalysisOutput { levels, spectrum }
    }

    pub fn spectrum_state(&self) -> &SpectrumAnalyzer {
        &self.spectrum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::format::{AudioFormat, RawBuffer, SampleEncoding},
        convert::Converter,
    };
    use std::f32::consts::PI;

    fn sine_i16_bytes(freq: f32, rate: u32, start: usize, len: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(len * 2);
        for n in start..start + len {
            let v = 0.5 * (2.0 * PI * freq * n as f32 / rate as f32).sin();
            bytes.extend_from_slice(&((v * 32_767.0) as i16).to_le_bytes());
        }
        bytes
    }

    #[test]
    fn levels_track_peak_per_channel() {
        let frame = NormalizedFrame::new(vec![0.1, -0.9, -0.4, 0.2, 0.3, 0.0], 2, 0.0);
        let levels = peak_levels(&frame.samples, frame.channels);
        assert_eq!(levels.channels(), 2);
        assert!((levels.as_slice()[0] - 0.4).abs() <= 1e-6);
        assert!((levels.as_slice()[1] - 0.9).abs() <= 1e-6);
    }

    #[test]
    fn empty_frames_produce_zero_levels_and_no_spectrum() {
        let mut analyzer = Analyzer::new(44_100, 16);
        for _ in 0..10 {
            let out = analyzer.process(&NormalizedFrame::empty(2));
            assert_eq!(out.levels, Some(LevelVector(vec![0.0, 0.0])));
            assert_eq!(out.spectrum, None);
            assert_eq!(analyzer.spectrum_state().carry_len(), 0);
        }
    }

    #[test]
    fn malformed_stereo_buffer_meters_as_zero() {
        let converter = Converter::default();
        let format = AudioFormat::new(44_100, 2, 16, SampleEncoding::SignedInt);
        let frame = converter.convert(RawBuffer::new(vec![0x7F; 6], format));
        assert!(frame.is_empty());

        let mut analyzer = Analyzer::new(44_100, 16);
        let out = analyzer.process(&frame);
        assert_eq!(out.levels, Some(LevelVector(vec![0.0, 0.0])));
        assert!(out.spectrum.is_none());
    }

    #[test]
    fn sine_440_peaks_in_the_500hz_band() {
        let rate = 44_100;
        let converter = Converter::default();
        let format = AudioFormat::new(rate, 1, 16, SampleEncoding::SignedInt);
        let mut analyzer = Analyzer::new(rate, 16);

        let mut spectrum = None;
        for chunk in 0..4 {
            let bytes = sine_i16_bytes(440.0, rate, chunk * 1024, 1024);
            let frame = converter.convert(RawBuffer::new(bytes, format));
            let out = analyzer.process(&frame);
            let levels = out.levels.expect("levels enabled");
            assert!((levels.as_slice()[0] - 0.5).abs() <= 0.01);
            if chunk == 0 {
                // 1024 < 2048: carried over, nothing emitted yet.
                assert!(out.spectrum.is_none());
            }
            if out.spectrum.is_some() {
                spectrum = out.spectrum;
            }
        }

        let spectrum = spectrum.expect("a full window must have completed");
        // 440 Hz falls in band 5: 500 Hz centre, 353.6–707.1 Hz.
        assert_eq!(spectrum.peak_band(), 5);
    }

    #[test]
    fn sample_rate_drop_resets_window_before_next_spectrum() {
        let mut analyzer = Analyzer::new(44_100, 16);
        let first = NormalizedFrame::new(vec![0.25; 1024], 1, 0.0);
        assert!(analyzer.process(&first).spectrum.is_none());
        assert_eq!(analyzer.spectrum_state().carry_len(), 1024);

        assert!(analyzer.configure(11_025, 16));
        assert_eq!(analyzer.spectrum_state().window_size(), 1024);
        assert_eq!(analyzer.spectrum_state().carry_len(), 0);

        let second = NormalizedFrame::new(vec![0.25; 1024], 1, 0.0);
        let out = analyzer.process(&second);
        assert!(out.spectrum.is_some());
        // Only the new 1024 samples were windowed: 1024 - (1024 - 128) remain.
        assert_eq!(analyzer.spectrum_state().carry_len(), 128);
    }

    #[test]
    fn bit_depth_change_also_resets() {
        let mut analyzer = Analyzer::new(48_000, 16);
        analyzer.process(&NormalizedFrame::new(vec![0.1; 500], 1, 0.0));
        assert!(!analyzer.configure(48_000, 16));
        assert_eq!(analyzer.spectrum_state().carry_len(), 500);
        assert!(analyzer.configure(48_000, 32));
        assert_eq!(analyzer.spectrum_state().carry_len(), 0);
        assert_eq!(analyzer.spectrum_state().bit_depth(), 32);
    }

    #[test]
    fn stereo_frames_feed_one_window_per_frame_index() {
        let mut analyzer = Analyzer::new(44_100, 16);
        let frame = NormalizedFrame::new(vec![0.5; 2 * 1000], 2, 0.0);
        analyzer.process(&frame);
        assert_eq!(analyzer.spectrum_state().carry_len(), 1000);
    }

    #[test]
    fn disabled_stages_produce_nothing() {
        let mut analyzer = Analyzer::new(44_100, 16).with_stages(false, false);
        let out = analyzer.process(&NormalizedFrame::new(vec![0.5; 4096], 1, 0.0));
        assert_eq!(out, AnalysisOutput::default());
        assert_eq!(analyzer.spectrum_state().carry_len(), 0);
    }

    #[test]
    fn reset_drops_carry_over() {
        let mut analyzer = Analyzer::new(44_100, 16);
        analyzer.process(&NormalizedFrame::new(vec![0.5; 1500], 1, 0.0));
        analyzer.reset();
        assert_eq!(analyzer.spectrum_state().carry_len(), 0);
    }
}
