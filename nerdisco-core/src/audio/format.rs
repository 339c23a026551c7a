//! Capture format descriptors and the raw byte buffers handed to the converter.

use serde::{Deserialize, Serialize};

/// How individual samples are encoded in a raw capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SampleEncoding {
    /// Unsigned PCM. Silence sits at the mid-point of the range.
    UnsignedInt,
    /// Two's-complement PCM. Silence is zero.
    SignedInt,
    /// IEEE-754 floating point.
    Float,
}

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the host, which is what cpal hands us.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }
}

/// Describes the PCM layout of one capture session.
///
/// Immutable for the lifetime of a session. A different format means the
/// analyzer must throw away whatever it had buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Bits per sample (8, 16 or 32 are supported by the converter).
    pub bit_depth: u16,
    pub encoding: SampleEncoding,
    pub byte_order: ByteOrder,
}

impl AudioFormat {
    /// Little-endian format, the only byte order the converter accepts.
    pub fn new(sample_rate: u32, channels: u16, bit_depth: u16, encoding: SampleEncoding) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
            encoding,
            byte_order: ByteOrder::LittleEndian,
        }
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// `true` when the descriptor could describe real PCM at all.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0 && self.bit_depth > 0 && self.bit_depth % 8 == 0
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bit_depth / 8)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Number of whole frames contained in `len` bytes.
    pub fn frames_for_bytes(&self, len: usize) -> usize {
        match self.bytes_per_frame() {
            0 => 0,
            frame => len / frame,
        }
    }

    /// Playback duration of `len` bytes in microseconds. Zero for invalid formats.
    pub fn duration_us_for_bytes(&self, len: usize) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        (self.frames_for_bytes(len) as f64 * 1_000_000.0 / f64::from(self.sample_rate)) as f32
    }
}

/// Bytes captured during one notify interval, together with their format.
///
/// Owned by the capture side until dispatched; moved into the worker after.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBuffer {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

impl RawBuffer {
    pub fn new(bytes: Vec<u8>, format: AudioFormat) -> Self {
        Self { bytes, format }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_16bit_frame_is_four_bytes() {
        let format = AudioFormat::new(44_100, 2, 16, SampleEncoding::SignedInt);
        assert_eq!(format.bytes_per_sample(), 2);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.frames_for_bytes(4_410 * 4), 4_410);
    }

    #[test]
    fn duration_follows_frame_count() {
        let format = AudioFormat::new(48_000, 1, 32, SampleEncoding::Float);
        // 480 frames at 48 kHz = 10 ms
        let us = format.duration_us_for_bytes(480 * 4);
        assert!((us - 10_000.0).abs() < 0.01, "us={us}");
    }

    #[test]
    fn invalid_format_has_no_duration() {
        let format = AudioFormat::new(0, 1, 16, SampleEncoding::SignedInt);
        assert!(!format.is_valid());
        assert_eq!(format.duration_us_for_bytes(1024), 0.0);

        let odd_depth = AudioFormat::new(44_100, 1, 12, SampleEncoding::SignedInt);
        assert!(!odd_depth.is_valid());
    }

    #[test]
    fn format_serializes_with_camel_case() {
        let format = AudioFormat::new(22_050, 2, 8, SampleEncoding::UnsignedInt);
        let json = serde_json::to_value(format).expect("serialize format");
        assert_eq!(json["sampleRate"], 22_050);
        assert_eq!(json["bitDepth"], 8);
        assert_eq!(json["encoding"], "unsignedInt");
        assert_eq!(json["byteOrder"], "littleEndian");
    }
}
