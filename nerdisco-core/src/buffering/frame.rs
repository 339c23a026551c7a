//! Normalized sample frame passed from the converter to the analyzer.

/// Interleaved f32 samples decoded from one capture buffer.
///
/// Allocated once per buffer on the worker thread and discarded after analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFrame {
    /// Interleaved samples, nominally in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Channel count of `samples` (1 after a mono downmix).
    pub channels: u16,
    /// Duration of the source buffer in microseconds.
    pub duration_us: f32,
}

impl NormalizedFrame {
    pub fn new(samples: Vec<f32>, channels: u16, duration_us: f32) -> Self {
        Self {
            samples,
            channels,
            duration_us,
        }
    }

    /// A frame carrying no samples. Keeps the channel count so that level
    /// meters still report one (zero) value per channel.
    pub fn empty(channels: u16) -> Self {
        Self::new(Vec::new(), channels, 0.0)
    }

    /// Number of whole multi-channel frames.
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            ch => self.samples.len() / usize::from(ch),
        }
    }

    /// Returns true if the frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
