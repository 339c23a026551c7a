//! Raw PCM → normalized f32 conversion.
//!
//! ## Rules
//!
//! - Only little-endian PCM in the layouts listed by [`SampleKind`] is decoded.
//! - The buffer must hold a whole number of frames.
//! - Anything else yields an **empty** frame. Callers treat that as "nothing
//!   to report this interval"; it is never an error.
//!
//! The converter holds no state besides the downmix flag, so independent
//! buffers may be converted concurrently.

pub mod sample;

pub use sample::SampleKind;

use tracing::debug;

use crate::{
    audio::format::{AudioFormat, ByteOrder, RawBuffer},
    buffering::frame::NormalizedFrame,
};

/// Decodes capture buffers into [`NormalizedFrame`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Converter {
    mono_downmix: bool,
}

impl Converter {
    pub fn new(mono_downmix: bool) -> Self {
        Self { mono_downmix }
    }

    pub fn set_mono_downmix(&mut self, mono_downmix: bool) {
        self.mono_downmix = mono_downmix;
    }

    pub fn mono_downmix(&self) -> bool {
        self.mono_downmix
    }

    /// Convert a raw buffer, consuming it.
    pub fn convert(&self, buffer: RawBuffer) -> NormalizedFrame {
        let RawBuffer { bytes, format } = buffer;
        let out_channels = self.output_channels(&format);

        let Some(samples) = decode(&bytes, &format) else {
            return NormalizedFrame::empty(out_channels);
        };
        let duration_us = format.duration_us_for_bytes(bytes.len());

        if out_channels != format.channels {
            let mono = downmix_to_mono(&samples, usize::from(format.channels));
            return NormalizedFrame::new(mono, 1, duration_us);
        }
        NormalizedFrame::new(samples, format.channels, duration_us)
    }

    fn output_channels(&self, format: &AudioFormat) -> u16 {
        if self.mono_downmix && format.channels > 1 {
            1
        } else {
            format.channels
        }
    }
}

/// Decode `bytes` into normalized interleaved samples, or `None` when the
/// format or buffer length is unusable.
fn decode(bytes: &[u8], format: &AudioFormat) -> Option<Vec<f32>> {
    if !format.is_valid() || format.byte_order != ByteOrder::LittleEndian {
        debug!(?format, "unsupported capture format, dropping buffer");
        return None;
    }
    let Some(kind) = SampleKind::from_format(format) else {
        debug!(?format, "no sample layout for format, dropping buffer");
        return None;
    };
    if bytes.len() % format.bytes_per_frame() != 0 {
        debug!(
            len = bytes.len(),
            frame_bytes = format.bytes_per_frame(),
            "buffer is not a whole number of frames, dropping"
        );
        return None;
    }

    Some(
        bytes
            .chunks_exact(kind.width())
            .map(|raw| kind.normalize(kind.decode_le(raw)))
            .collect(),
    )
}

/// Average interleaved channels into one, sample index by sample index.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
