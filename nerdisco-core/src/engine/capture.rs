//! Capture thread: owns the cpal stream and turns the byte ring into
//! periodic `RawBuffer` dispatches.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::Dispatcher;
use crate::{
    audio::{format::{AudioFormat, RawBuffer}, AudioCapture},
    buffering::{create_capture_ring, drain_whole_frames},
    error::{DiscoError, Result},
};

const CAPTURE_THREAD_NAME: &str = "nerdisco-capture";

pub(crate) struct CaptureThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    format: AudioFormat,
}

impl CaptureThread {
    /// Open the device on a new thread and start dispatching every `interval`.
    ///
    /// Blocks until the device is confirmed open (or fails).
    pub(crate) fn spawn(
        dispatcher: Arc<Dispatcher>,
        preferred_device: Option<String>,
        interval: Duration,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        // Sync oneshot: the capture thread signals open success/failure.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<AudioFormat>>();

        let handle = thread::Builder::new()
            .name(CAPTURE_THREAD_NAME.into())
            .spawn(move || {
                let (producer, mut consumer) = create_capture_ring();

                // ── Open audio device (must happen on THIS thread, cpal::Stream is !Send) ──
                let capture = match AudioCapture::open_with_preference(
                    producer,
                    Arc::clone(&thread_running),
                    preferred_device.as_deref(),
                ) {
                    Ok(c) => {
                        let _ = open_tx.send(Ok(c.format));
                        c
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        thread_running.store(false, Ordering::SeqCst);
                        return;
                    }
                };

                let format = capture.format;
                let frame_bytes = format.bytes_per_frame();
                info!(interval_ms = interval.as_millis() as u64, "capture loop started");

                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    // A fresh Vec per interval; the previous one now belongs to the worker.
                    let bytes = drain_whole_frames(&mut consumer, frame_bytes);
                    dispatcher.dispatch(RawBuffer::new(bytes, format));
                }

                capture.stop();
                let overruns = capture.overruns();
                if overruns > 0 {
                    warn!(overruns, "capture ring overflowed; some device callbacks were lost");
                }
                // Stream drops here, releasing the audio device on this thread.
                drop(capture);
                debug!("capture loop stopped");
            })
            .map_err(|source| DiscoError::ThreadSpawn {
                name: CAPTURE_THREAD_NAME,
                source,
            })?;

        match open_rx.recv() {
            Ok(Ok(format)) => Ok(Self {
                running,
                handle: Some(handle),
                format,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the thread panicked.
                let _ = handle.join();
                Err(DiscoError::Other(anyhow::anyhow!(
                    "capture thread died before opening the device"
                )))
            }
        }
    }

    pub(crate) fn format(&self) -> AudioFormat {
        self.format
    }

    /// Signal the loop to exit and wait for the device to close.
    pub(crate) fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
