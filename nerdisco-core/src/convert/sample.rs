//! Supported sample layouts and their normalization rules.

use crate::audio::format::{AudioFormat, SampleEncoding};

/// Peak magnitude used for 32-bit float input. Historical calibration value,
/// kept so float captures meter identically to older builds.
pub const FLOAT_CALIBRATION_PEAK: f64 = 1.000_03;

/// Every (encoding, bit depth) pair the converter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
}

impl SampleKind {
    /// Resolve a format to a sample kind. `None` means "unsupported, do nothing".
    pub fn from_format(format: &AudioFormat) -> Option<Self> {
        let kind = match (format.encoding, format.bit_depth) {
            (SampleEncoding::UnsignedInt, 8) => SampleKind::U8,
            (SampleEncoding::UnsignedInt, 16) => SampleKind::U16,
            (SampleEncoding::UnsignedInt, 32) => SampleKind::U32,
            (SampleEncoding::SignedInt, 8) => SampleKind::I8,
            (SampleEncoding::SignedInt, 16) => SampleKind::I16,
            (SampleEncoding::SignedInt, 32) => SampleKind::I32,
            (SampleEncoding::Float, 32) => SampleKind::F32,
            _ => return None,
        };
        Some(kind)
    }

    /// Bytes per sample.
    pub const fn width(self) -> usize {
        match self {
            SampleKind::U8 | SampleKind::I8 => 1,
            SampleKind::U16 | SampleKind::I16 => 2,
            SampleKind::U32 | SampleKind::I32 | SampleKind::F32 => 4,
        }
    }

    /// Largest representable magnitude for this layout.
    pub const fn peak(self) -> f64 {
        match self {
            SampleKind::U8 => u8::MAX as f64,
            SampleKind::U16 => u16::MAX as f64,
            SampleKind::U32 => u32::MAX as f64,
            SampleKind::I8 => i8::MAX as f64,
            SampleKind::I16 => i16::MAX as f64,
            SampleKind::I32 => i32::MAX as f64,
            SampleKind::F32 => FLOAT_CALIBRATION_PEAK,
        }
    }

    /// Unsigned layouts encode silence at half the peak and are centered first.
    pub const fn is_centered(self) -> bool {
        matches!(self, SampleKind::U8 | SampleKind::U16 | SampleKind::U32)
    }

    /// Decode one little-endian sample. `bytes.len()` must equal [`width`](Self::width).
    pub fn decode_le(self, bytes: &[u8]) -> f64 {
        match (self, bytes) {
            (SampleKind::U8, [b]) => f64::from(*b),
            (SampleKind::I8, [b]) => f64::from(*b as i8),
            (SampleKind::U16, [a, b]) => f64::from(u16::from_le_bytes([*a, *b])),
            (SampleKind::I16, [a, b]) => f64::from(i16::from_le_bytes([*a, *b])),
            (SampleKind::U32, [a, b, c, d]) => f64::from(u32::from_le_bytes([*a, *b, *c, *d])),
            (SampleKind::I32, [a, b, c, d]) => f64::from(i32::from_le_bytes([*a, *b, *c, *d])),
            (SampleKind::F32, [a, b, c, d]) => f64::from(f32::from_le_bytes([*a, *b, *c, *d])),
            _ => 0.0,
        }
    }

    /// Map a decoded raw value into the normalized range.
    ///
    /// Unsigned: `|raw - peak/2| / (peak/2)`. Signed and float: `raw / peak`.
    pub fn normalize(self, raw: f64) -> f32 {
        let peak = self.peak();
        if self.is_centered() {
            let half = 0.5 * peak;
            ((raw - half).abs() / half) as f32
        } else {
            (raw / peak) as f32
        }
    }
}
