//! Events published by the pipeline coordinator.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `LevelEvent` | `PipelineCoordinator::subscribe_levels` |
//! | `SpectrumEvent` | `PipelineCoordinator::subscribe_spectrum` |
//! | `CoordinatorStatusEvent` | `PipelineCoordinator::subscribe_status` |
//!
//! `AnalysisResult` is the latest-value snapshot behind
//! `PipelineCoordinator::latest`.

use serde::{Deserialize, Serialize};

use crate::analysis::{LevelVector, SpectrumFrame};

// ---------------------------------------------------------------------------
// Meter events
// ---------------------------------------------------------------------------

/// Per-channel peak meter, once per processed buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelEvent {
    /// Sequence number of the source buffer. Shared with `SpectrumEvent`.
    pub seq: u64,
    pub levels: LevelVector,
    /// Duration of the source buffer in microseconds.
    pub frame_duration_us: f32,
}

/// Eleven-band spectrum, only when at least one analysis window completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumEvent {
    pub seq: u64,
    pub bands: SpectrumFrame,
    /// Channel count of the source frame.
    pub channels: u16,
    pub frame_duration_us: f32,
}

/// Immutable snapshot of the most recent analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub seq: u64,
    pub channels: u16,
    pub frame_duration_us: f32,
    pub levels: Option<LevelVector>,
    /// Most recent spectrum of the session. Kept across buffers that did not
    /// complete a window.
    pub spectrum: Option<SpectrumFrame>,
}

// ---------------------------------------------------------------------------
// Status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatusEvent {
    pub status: CoordinatorStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorStatus {
    /// Created, `start()` not yet called.
    Idle,
    /// Worker running and accepting capture buffers.
    Capturing,
    /// Stopped; may be started again.
    Stopped,
    /// Capture device or worker failure.
    Error,
}
