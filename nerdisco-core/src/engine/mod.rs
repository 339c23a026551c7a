//! `PipelineCoordinator`: owns the analysis worker and its handoff.
//!
//! ## Lifecycle
//!
//! ```text
//! PipelineCoordinator::new(config)
//!     └─► start()               → worker thread spawned, status = Capturing
//!         ├─► start_capture()   → cpal device opened on its own thread
//!         ├─► on_capture_buffer / on_format_changed   (any thread, non-blocking)
//!         └─► stop()            → capture closed, queue drained, status = Stopped
//! ```
//!
//! `start()`/`stop()` return an error in the wrong state rather than panicking.
//! Every `start()` begins a fresh analysis session: no samples are carried
//! over from the previous one.
//!
//! ## Threading
//!
//! Capture buffers move by value through a bounded drop-oldest handoff into a
//! single worker thread, which owns the converter and analyzer outright.
//! Results leave through `tokio::sync::broadcast` (every event) and
//! `tokio::sync::watch` (latest snapshot), neither of which blocks the worker.

#[cfg(feature = "audio-cpal")]
mod capture;
pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, trace, warn};

use crate::{
    audio::format::{AudioFormat, RawBuffer},
    buffering::handoff::{handoff_channel, HandoffOutcome, HandoffSender},
    error::{DiscoError, Result},
    ipc::events::{
        AnalysisResult, CoordinatorStatus, CoordinatorStatusEvent, LevelEvent, SpectrumEvent,
    },
};

use pipeline::{Dispatch, PipelineDiagnostics};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

const WORKER_THREAD_NAME: &str = "nerdisco-analysis";

pub const MIN_HANDOFF_DEPTH: usize = 1;
pub const MAX_HANDOFF_DEPTH: usize = 8;
pub const MIN_CAPTURE_INTERVAL_MS: u64 = 10;
pub const MAX_CAPTURE_INTERVAL_MS: u64 = 50;

/// Configuration for `PipelineCoordinator`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Publish per-channel peak meters. Default: true.
    pub enable_levels: bool,
    /// Publish the octave spectrum. Default: true.
    pub enable_spectrum: bool,
    /// Accepted for compatibility; there is no beat detector. Default: false.
    pub enable_beat_detection: bool,
    /// Average all channels into one before analysis. Default: false.
    pub mono_downmix: bool,
    /// Capture buffers allowed to wait for the worker. Default: 1.
    pub handoff_depth: usize,
    /// How often the capture thread hands off accumulated bytes. Default: 20.
    pub capture_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_levels: true,
            enable_spectrum: true,
            enable_beat_detection: false,
            mono_downmix: false,
            handoff_depth: 1,
            capture_interval_ms: 20,
        }
    }
}

impl PipelineConfig {
    /// Clamp out-of-range values into their supported ranges.
    pub fn normalize(&mut self) {
        self.handoff_depth = self
            .handoff_depth
            .clamp(MIN_HANDOFF_DEPTH, MAX_HANDOFF_DEPTH);
        self.capture_interval_ms = self
            .capture_interval_ms
            .clamp(MIN_CAPTURE_INTERVAL_MS, MAX_CAPTURE_INTERVAL_MS);
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

/// Entry point for capture buffers. Shared between the coordinator and the
/// capture thread.
pub(crate) struct Dispatcher {
    /// `Some` while a worker session is accepting buffers.
    session: Mutex<Option<HandoffSender<Dispatch>>>,
    epoch: AtomicU64,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl Dispatcher {
    fn new(diagnostics: Arc<PipelineDiagnostics>) -> Self {
        Self {
            session: Mutex::new(None),
            epoch: AtomicU64::new(0),
            diagnostics,
        }
    }

    /// Hand `buffer` to the worker without waiting. Returns `false` when the
    /// buffer was empty or no session is running.
    pub(crate) fn dispatch(&self, buffer: RawBuffer) -> bool {
        if buffer.is_empty() {
            return false;
        }
        let session = self.session.lock();
        let Some(tx) = session.as_ref() else {
            trace!(bytes = buffer.len(), "no active session, dropping capture buffer");
            return false;
        };

        self.diagnostics.buffers_in.fetch_add(1, Ordering::Relaxed);
        self.diagnostics
            .bytes_in
            .fetch_add(buffer.len(), Ordering::Relaxed);

        let epoch = self.epoch.load(Ordering::Acquire);
        if let HandoffOutcome::DisplacedOldest(dropped) = tx.send(Dispatch { epoch, buffer }) {
            self.diagnostics
                .buffers_dropped
                .fetch_add(dropped, Ordering::Relaxed);
            warn!(
                dropped,
                depth = tx.capacity(),
                "analysis worker behind, dropped oldest capture buffer"
            );
        }
        true
    }

    fn format_changed(&self, format: &AudioFormat) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.diagnostics
            .format_changes
            .fetch_add(1, Ordering::Relaxed);
        info!(epoch, ?format, "capture format changed");
    }
}

/// The top-level pipeline handle.
///
/// `PipelineCoordinator` is `Send + Sync`; wrap it in an `Arc` to share it
/// between a capture driver and event-forwarding tasks.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    running: AtomicBool,
    status: Mutex<CoordinatorStatus>,
    level_tx: broadcast::Sender<LevelEvent>,
    spectrum_tx: broadcast::Sender<SpectrumEvent>,
    status_tx: broadcast::Sender<CoordinatorStatusEvent>,
    latest_tx: Arc<watch::Sender<Arc<AnalysisResult>>>,
    /// Monotonically increasing buffer sequence counter, kept across sessions.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
    dispatcher: Arc<Dispatcher>,
    worker: Mutex<Option<JoinHandle<()>>>,
    #[cfg(feature = "audio-cpal")]
    capture: Mutex<Option<capture::CaptureThread>>,
}

impl PipelineCoordinator {
    /// Create a coordinator. Does not start the worker; call `start()`.
    pub fn new(config: PipelineConfig) -> Self {
        let (level_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (spectrum_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (latest_tx, _) = watch::channel(Arc::new(AnalysisResult::default()));
        let diagnostics = Arc::new(PipelineDiagnostics::default());

        Self {
            config: config.normalized(),
            running: AtomicBool::new(false),
            status: Mutex::new(CoordinatorStatus::Idle),
            level_tx,
            spectrum_tx,
            status_tx,
            latest_tx: Arc::new(latest_tx),
            seq: Arc::new(AtomicU64::new(0)),
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&diagnostics))),
            diagnostics,
            worker: Mutex::new(None),
            #[cfg(feature = "audio-cpal")]
            capture: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn the analysis worker and begin accepting capture buffers.
    ///
    /// # Errors
    /// - `DiscoError::AlreadyRunning` if already started.
    /// - `DiscoError::ThreadSpawn` if the OS refuses a new thread.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DiscoError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.latest_tx
            .send_replace(Arc::new(AnalysisResult::default()));

        let (tx, handoff) = handoff_channel(self.config.handoff_depth);
        let ctx = pipeline::PipelineContext {
            config: self.config.clone(),
            handoff,
            level_tx: self.level_tx.clone(),
            spectrum_tx: self.spectrum_tx.clone(),
            latest_tx: Arc::clone(&self.latest_tx),
            seq: Arc::clone(&self.seq),
            diagnostics: Arc::clone(&self.diagnostics),
        };

        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || pipeline::run(ctx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(CoordinatorStatus::Error, Some(source.to_string()));
                return Err(DiscoError::ThreadSpawn {
                    name: WORKER_THREAD_NAME,
                    source,
                });
            }
        };

        *self.worker.lock() = Some(handle);
        *self.dispatcher.session.lock() = Some(tx);
        self.set_status(CoordinatorStatus::Capturing, None);
        info!("pipeline started");
        Ok(())
    }

    /// Open an input device and feed its buffers into the running session.
    ///
    /// Blocks until the device is confirmed open (or fails) and returns the
    /// format it delivers.
    ///
    /// # Errors
    /// - `DiscoError::NotRunning` if `start()` has not been called.
    /// - `DiscoError::AlreadyRunning` if a device is already open.
    /// - Device errors from the capture backend.
    #[cfg(feature = "audio-cpal")]
    pub fn start_capture(&self, preferred_device: Option<&str>) -> Result<AudioFormat> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(DiscoError::NotRunning);
        }
        let mut slot = self.capture.lock();
        if slot.is_some() {
            return Err(DiscoError::AlreadyRunning);
        }

        let interval = std::time::Duration::from_millis(self.config.capture_interval_ms);
        match capture::CaptureThread::spawn(
            Arc::clone(&self.dispatcher),
            preferred_device.map(str::to_owned),
            interval,
        ) {
            Ok(thread) => {
                let format = thread.format();
                *slot = Some(thread);
                Ok(format)
            }
            Err(e) => {
                self.set_status(CoordinatorStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop capture, let the worker finish what is queued, and join it.
    ///
    /// # Errors
    /// - `DiscoError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(DiscoError::NotRunning);
        }
        info!("pipeline stop requested");

        self.stop_capture();

        // Dropping the last sender lets the worker drain and exit.
        drop(self.dispatcher.session.lock().take());

        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("analysis worker panicked");
                self.set_status(
                    CoordinatorStatus::Error,
                    Some("analysis worker panicked".into()),
                );
                return Ok(());
            }
        }

        self.set_status(CoordinatorStatus::Stopped, None);
        Ok(())
    }

    /// Capture notification: hand `bytes` captured under `format` to the
    /// worker. Never blocks. Returns `true` if the buffer was queued.
    pub fn on_capture_buffer(&self, bytes: Vec<u8>, format: AudioFormat) -> bool {
        self.dispatcher.dispatch(RawBuffer::new(bytes, format))
    }

    /// Format/rate change notification. Buffers dispatched after this call
    /// are never analysed together with samples dispatched before it.
    pub fn on_format_changed(&self, format: AudioFormat) {
        self.dispatcher.format_changed(&format);
    }

    /// Latest published analysis. Never blocks the worker.
    pub fn latest(&self) -> Arc<AnalysisResult> {
        Arc::clone(&self.latest_tx.borrow())
    }

    /// Watch the latest analysis snapshot.
    pub fn subscribe_latest(&self) -> watch::Receiver<Arc<AnalysisResult>> {
        self.latest_tx.subscribe()
    }

    pub fn subscribe_levels(&self) -> broadcast::Receiver<LevelEvent> {
        self.level_tx.subscribe()
    }

    pub fn subscribe_spectrum(&self) -> broadcast::Receiver<SpectrumEvent> {
        self.spectrum_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<CoordinatorStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Current status (snapshot).
    pub fn status(&self) -> CoordinatorStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    #[cfg(feature = "audio-cpal")]
    fn stop_capture(&self) {
        if let Some(capture) = self.capture.lock().take() {
            capture.stop();
        }
    }

    #[cfg(not(feature = "audio-cpal"))]
    fn stop_capture(&self) {}

    fn set_status(&self, new_status: CoordinatorStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(CoordinatorStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl Drop for PipelineCoordinator {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::SampleEncoding;

    fn mono16() -> AudioFormat {
        AudioFormat::new(44_100, 1, 16, SampleEncoding::SignedInt)
    }

    #[test]
    fn config_defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert!(config.enable_levels);
        assert!(config.enable_spectrum);
        assert!(!config.enable_beat_detection);
        assert!(!config.mono_downmix);
        assert_eq!(config.handoff_depth, 1);
        assert_eq!(config.capture_interval_ms, 20);
    }

    #[test]
    fn config_normalize_clamps_ranges() {
        let config = PipelineConfig {
            handoff_depth: 0,
            capture_interval_ms: 500,
            ..PipelineConfig::default()
        }
        .normalized();
        assert_eq!(config.handoff_depth, MIN_HANDOFF_DEPTH);
        assert_eq!(config.capture_interval_ms, MAX_CAPTURE_INTERVAL_MS);

        let config = PipelineConfig {
            handoff_depth: 99,
            capture_interval_ms: 1,
            ..PipelineConfig::default()
        }
        .normalized();
        assert_eq!(config.handoff_depth, MAX_HANDOFF_DEPTH);
        assert_eq!(config.capture_interval_ms, MIN_CAPTURE_INTERVAL_MS);
    }

    #[test]
    fn config_deserializes_partial_camel_case_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"monoDownmix":true,"handoffDepth":3}"#)
                .expect("deserialize config");
        assert!(config.mono_downmix);
        assert_eq!(config.handoff_depth, 3);
        assert!(config.enable_levels);
        assert_eq!(config.capture_interval_ms, 20);
    }

    #[test]
    fn lifecycle_errors_in_wrong_state() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        assert_eq!(coordinator.status(), CoordinatorStatus::Idle);
        assert!(matches!(coordinator.stop(), Err(DiscoError::NotRunning)));

        coordinator.start().expect("start");
        assert_eq!(coordinator.status(), CoordinatorStatus::Capturing);
        assert!(matches!(coordinator.start(), Err(DiscoError::AlreadyRunning)));

        coordinator.stop().expect("stop");
        assert_eq!(coordinator.status(), CoordinatorStatus::Stopped);
        assert!(!coordinator.is_running());

        coordinator.start().expect("restart");
        coordinator.stop().expect("stop again");
    }

    #[test]
    fn buffers_are_ignored_outside_a_session() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        assert!(!coordinator.on_capture_buffer(vec![0u8; 64], mono16()));
        assert_eq!(coordinator.diagnostics_snapshot().buffers_in, 0);
    }

    #[test]
    fn empty_capture_bytes_are_not_dispatched() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        coordinator.start().expect("start");
        assert!(!coordinator.on_capture_buffer(Vec::new(), mono16()));
        coordinator.stop().expect("stop");
        assert_eq!(coordinator.diagnostics_snapshot().buffers_in, 0);
    }

    #[test]
    fn stop_drains_queued_buffers() {
        let coordinator = PipelineCoordinator::new(PipelineConfig {
            handoff_depth: 8,
            ..PipelineConfig::default()
        });
        let mut levels = coordinator.subscribe_levels();
        coordinator.start().expect("start");
        for _ in 0..4 {
            assert!(coordinator.on_capture_buffer(vec![0u8; 512], mono16()));
        }
        coordinator.stop().expect("stop");

        let snap = coordinator.diagnostics_snapshot();
        assert_eq!(snap.buffers_in, 4);
        assert_eq!(snap.bytes_in, 2048);
        assert_eq!(snap.level_events + snap.buffers_dropped, 4);

        let mut received = 0;
        while levels.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, snap.level_events);
    }

    #[test]
    fn format_change_bumps_epoch_and_counter() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        coordinator.on_format_changed(mono16());
        coordinator.on_format_changed(mono16());
        assert_eq!(coordinator.dispatcher.epoch.load(Ordering::Relaxed), 2);
        assert_eq!(coordinator.diagnostics_snapshot().format_changes, 2);
    }

    #[test]
    fn status_events_follow_lifecycle() {
        let coordinator = PipelineCoordinator::new(PipelineConfig::default());
        let mut status = coordinator.subscribe_status();
        coordinator.start().expect("start");
        coordinator.stop().expect("stop");

        let first = status.try_recv().expect("capturing event");
        let second = status.try_recv().expect("stopped event");
        assert_eq!(first.status, CoordinatorStatus::Capturing);
        assert_eq!(second.status, CoordinatorStatus::Stopped);
    }
}
