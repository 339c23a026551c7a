//! Analysis worker loop.
//!
//! ## Per dispatch
//!
//! ```text
//! 1. Receive Dispatch { epoch, RawBuffer } from the handoff (blocking)
//! 2. Epoch moved on (format-change notice) → reset analysis state
//! 3. Sample rate / bit depth differ → reallocate analysis state
//! 4. Converter::convert → NormalizedFrame (empty frames stop here)
//! 5. Analyzer::process → LevelVector + optional SpectrumFrame
//! 6. Broadcast LevelEvent / SpectrumEvent, replace the latest snapshot
//! ```
//!
//! The loop runs on one dedicated OS thread and processes dispatches strictly
//! in arrival order. It exits once every sender is gone and the queue is
//! drained.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::Receiver;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

use crate::{
    analysis::{Analyzer, SpectrumFrame},
    audio::format::{AudioFormat, RawBuffer},
    convert::Converter,
    engine::PipelineConfig,
    ipc::events::{AnalysisResult, LevelEvent, SpectrumEvent},
};

pub struct PipelineDiagnostics {
    pub buffers_in: AtomicUsize,
    pub bytes_in: AtomicUsize,
    pub buffers_dropped: AtomicUsize,
    pub empty_frames: AtomicUsize,
    pub analysis_resets: AtomicUsize,
    pub level_events: AtomicUsize,
    pub spectrum_events: AtomicUsize,
    pub format_changes: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            buffers_in: AtomicUsize::new(0),
            bytes_in: AtomicUsize::new(0),
            buffers_dropped: AtomicUsize::new(0),
            empty_frames: AtomicUsize::new(0),
            analysis_resets: AtomicUsize::new(0),
            level_events: AtomicUsize::new(0),
            spectrum_events: AtomicUsize::new(0),
            format_changes: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.buffers_in.store(0, Ordering::Relaxed);
        self.bytes_in.store(0, Ordering::Relaxed);
        self.buffers_dropped.store(0, Ordering::Relaxed);
        self.empty_frames.store(0, Ordering::Relaxed);
        self.analysis_resets.store(0, Ordering::Relaxed);
        self.level_events.store(0, Ordering::Relaxed);
        self.spectrum_events.store(0, Ordering::Relaxed);
        self.format_changes.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            buffers_in: self.buffers_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            buffers_dropped: self.buffers_dropped.load(Ordering::Relaxed),
            empty_frames: self.empty_frames.load(Ordering::Relaxed),
            analysis_resets: self.analysis_resets.load(Ordering::Relaxed),
            level_events: self.level_events.load(Ordering::Relaxed),
            spectrum_events: self.spectrum_events.load(Ordering::Relaxed),
            format_changes: self.format_changes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    pub buffers_in: usize,
    pub bytes_in: usize,
    pub buffers_dropped: usize,
    pub empty_frames: usize,
    pub analysis_resets: usize,
    pub level_events: usize,
    pub spectrum_events: usize,
    pub format_changes: usize,
}

/// One capture buffer in flight to the worker.
#[derive(Debug)]
pub struct Dispatch {
    /// Format-change generation the buffer was captured under.
    pub epoch: u64,
    pub buffer: RawBuffer,
}

/// All context the worker needs, passed as one struct so the spawn closure stays tidy.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub handoff: Receiver<Dispatch>,
    pub level_tx: broadcast::Sender<LevelEvent>,
    pub spectrum_tx: broadcast::Sender<SpectrumEvent>,
    pub latest_tx: Arc<watch::Sender<Arc<AnalysisResult>>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Worker-owned session state. Never shared with another thread.
struct Session {
    converter: Converter,
    enable_levels: bool,
    enable_spectrum: bool,
    /// Built from the first well-formed buffer of the session.
    analyzer: Option<Analyzer>,
    epoch: u64,
    last_spectrum: Option<SpectrumFrame>,
}

impl Session {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            converter: Converter::new(config.mono_downmix),
            enable_levels: config.enable_levels,
            enable_spectrum: config.enable_spectrum,
            analyzer: None,
            epoch: 0,
            last_spectrum: None,
        }
    }

    /// Bring the analysis state in line with `epoch` and `format`. Returns
    /// `true` when buffered samples were discarded.
    fn prepare(&mut self, epoch: u64, format: &AudioFormat) -> bool {
        let mut reset = false;
        if epoch != self.epoch {
            self.epoch = epoch;
            if let Some(analyzer) = self.analyzer.as_mut() {
                analyzer.reset();
                reset = true;
            }
        }

        if format.is_valid() {
            match self.analyzer.as_mut() {
                Some(analyzer) => {
                    reset |= analyzer.configure(format.sample_rate, format.bit_depth)
                }
                None => {
                    self.analyzer = Some(
                        Analyzer::new(format.sample_rate, format.bit_depth)
                            .with_stages(self.enable_levels, self.enable_spectrum),
                    );
                }
            }
        }
        if reset {
            self.last_spectrum = None;
        }
        reset
    }
}

/// Run the worker until the handoff disconnects.
pub fn run(ctx: PipelineContext) {
    info!(
        levels = ctx.config.enable_levels,
        spectrum = ctx.config.enable_spectrum,
        mono_downmix = ctx.config.mono_downmix,
        handoff_depth = ctx.config.handoff_depth,
        "analysis worker started"
    );
    if ctx.config.enable_beat_detection {
        warn!("beat detection requested but not available; ignoring");
    }

    let mut session = Session::new(&ctx.config);
    while let Ok(dispatch) = ctx.handoff.recv() {
        process_dispatch(&ctx, &mut session, dispatch);
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        buffers_in = snap.buffers_in,
        bytes_in = snap.bytes_in,
        buffers_dropped = snap.buffers_dropped,
        empty_frames = snap.empty_frames,
        analysis_resets = snap.analysis_resets,
        level_events = snap.level_events,
        spectrum_events = snap.spectrum_events,
        format_changes = snap.format_changes,
        "analysis worker stopped, diagnostics"
    );
}

fn process_dispatch(ctx: &PipelineContext, session: &mut Session, dispatch: Dispatch) {
    let Dispatch { epoch, buffer } = dispatch;
    let format = buffer.format;

    if session.prepare(epoch, &format) {
        ctx.diagnostics
            .analysis_resets
            .fetch_add(1, Ordering::Relaxed);
        debug!(epoch, ?format, "analysis state reset");
    }

    let bytes = buffer.len();
    let frame = session.converter.convert(buffer);
    if frame.is_empty() {
        ctx.diagnostics.empty_frames.fetch_add(1, Ordering::Relaxed);
        trace!(bytes, "buffer produced no samples");
        return;
    }
    let Some(analyzer) = session.analyzer.as_mut() else {
        return;
    };

    let output = analyzer.process(&frame);
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);

    if let Some(levels) = &output.levels {
        ctx.diagnostics.level_events.fetch_add(1, Ordering::Relaxed);
        let _ = ctx.level_tx.send(LevelEvent {
            seq,
            levels: levels.clone(),
            frame_duration_us: frame.duration_us,
        });
    }

    if let Some(bands) = output.spectrum {
        ctx.diagnostics
            .spectrum_events
            .fetch_add(1, Ordering::Relaxed);
        let _ = ctx.spectrum_tx.send(SpectrumEvent {
            seq,
            bands,
            channels: frame.channels,
            frame_duration_us: frame.duration_us,
        });
        session.last_spectrum = Some(bands);
    }

    ctx.latest_tx.send_replace(Arc::new(AnalysisResult {
        seq,
        channels: frame.channels,
        frame_duration_us: frame.duration_us,
        levels: output.levels,
        spectrum: session.last_spectrum,
    }));

    trace!(
        seq,
        bytes,
        frames = frame.frames(),
        carry = analyzer.spectrum_state().carry_len(),
        "buffer analysed"
    );
}
