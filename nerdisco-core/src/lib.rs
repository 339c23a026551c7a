//! # nerdisco-core
//!
//! Real-time audio analysis core for NerDisco: raw PCM in, level meters and
//! an 11-band octave spectrum out.
//!
//! ## Architecture
//!
//! ```text
//! Device → AudioCapture → SPSC byte ring → capture thread (every 10–50 ms)
//!                                                │ RawBuffer (moved)
//!                                     bounded drop-oldest handoff
//!                                                │
//!                                   analysis worker (one thread)
//!                                   Converter → Analyzer
//!                                                │
//!                  broadcast<LevelEvent | SpectrumEvent> + watch<AnalysisResult>
//! ```
//!
//! The audio callback is zero-alloc. All decoding and FFT work happens on the
//! worker. Malformed or unsupported audio never produces an error: it simply
//! produces no updates.
//!
//! Beat detection is not provided. `PipelineConfig::enable_beat_detection` is
//! accepted and ignored.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod buffering;
pub mod convert;
pub mod engine;
pub mod error;
pub mod ipc;

// Convenience re-exports for downstream crates
pub use analysis::{Analyzer, AnalysisOutput, LevelVector, SpectrumFrame, BAND_COUNT};
pub use audio::format::{AudioFormat, ByteOrder, RawBuffer, SampleEncoding};
pub use buffering::frame::NormalizedFrame;
pub use convert::Converter;
pub use engine::{pipeline::DiagnosticsSnapshot, PipelineConfig, PipelineCoordinator};
pub use error::{DiscoError, Result};
pub use ipc::events::{
    AnalysisResult, CoordinatorStatus, CoordinatorStatusEvent, LevelEvent, SpectrumEvent,
};
