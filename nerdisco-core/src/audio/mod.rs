//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by copying the device's raw bytes,
//! untouched, into an SPSC ring buffer producer whose `push_slice` is
//! lock-free and allocation-free. Decoding happens later on the worker.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread; the coordinator's capture thread does both.

pub mod device;
pub mod format;

#[cfg(feature = "audio-cpal")]
pub use capture::{format_for_device, AudioCapture};

#[cfg(feature = "audio-cpal")]
mod capture {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    };

    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        Data, InputCallbackInfo, SampleFormat, Stream, StreamConfig,
    };
    use tracing::{error, info, warn};

    use super::format::{AudioFormat, ByteOrder, SampleEncoding};
    use crate::{
        buffering::{CaptureProducer, Observer, Producer},
        error::{DiscoError, Result},
    };

    /// Map a device sample format onto the converter's format descriptor.
    ///
    /// # Errors
    /// `DiscoError::UnsupportedFormat` for 64-bit and other layouts the
    /// converter cannot decode.
    pub fn format_for_device(
        sample_format: SampleFormat,
        sample_rate: u32,
        channels: u16,
    ) -> Result<AudioFormat> {
        let (encoding, bit_depth) = match sample_format {
            SampleFormat::U8 => (SampleEncoding::UnsignedInt, 8),
            SampleFormat::U16 => (SampleEncoding::UnsignedInt, 16),
            SampleFormat::U32 => (SampleEncoding::UnsignedInt, 32),
            SampleFormat::I8 => (SampleEncoding::SignedInt, 8),
            SampleFormat::I16 => (SampleEncoding::SignedInt, 16),
            SampleFormat::I32 => (SampleEncoding::SignedInt, 32),
            SampleFormat::F32 => (SampleEncoding::Float, 32),
            other => return Err(DiscoError::UnsupportedFormat(format!("{other:?}"))),
        };
        Ok(AudioFormat::new(sample_rate, channels, bit_depth, encoding)
            .with_byte_order(ByteOrder::native()))
    }

    /// Handle to an active audio capture stream.
    ///
    /// **Not `Send`**: `cpal::Stream` is bound to its creation thread on
    /// Windows/macOS. Create and drop this type on the same OS thread.
    pub struct AudioCapture {
        /// Kept alive so the stream is not dropped prematurely.
        _stream: Stream,
        /// Shared flag. Set to `false` to signal the callback to no-op.
        running: Arc<AtomicBool>,
        /// Callbacks whose bytes did not fit in the ring.
        overruns: Arc<AtomicUsize>,
        /// Layout of the bytes pushed into the ring.
        pub format: AudioFormat,
    }

    impl AudioCapture {
        /// Open an input device by preferred name, otherwise fall back to
        /// the default input device and then the first available device.
        pub fn open_with_preference(
            mut producer: CaptureProducer,
            running: Arc<AtomicBool>,
            preferred_device_name: Option<&str>,
        ) -> Result<Self> {
            let host = cpal::default_host();
            let mut selected_device = None;

            if let Some(preferred_name) = preferred_device_name {
                match host.input_devices() {
                    Ok(mut devices) => {
                        selected_device = devices.find(|device| {
                            device
                                .name()
                                .map(|name| name == preferred_name)
                                .unwrap_or(false)
                        });

                        if selected_device.is_none() {
                            warn!(
                                "preferred input device '{}' not found, falling back",
                                preferred_name
                            );
                        }
                    }
                    Err(e) => {
                        warn!("failed to list input devices while resolving preference: {e}");
                    }
                }
            }

            let device = if let Some(device) = selected_device {
                device
            } else if let Some(default) = host.default_input_device() {
                default
            } else {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| DiscoError::AudioDevice(e.to_string()))?;
                let fallback = devices.next().ok_or(DiscoError::NoDefaultInputDevice)?;
                warn!("no default input device, falling back to first available input");
                fallback
            };

            info!(
                device = device.name().unwrap_or_default().as_str(),
                "opening input device"
            );

            let supported = device
                .default_input_config()
                .map_err(|e| DiscoError::AudioDevice(e.to_string()))?;
            let sample_format = supported.sample_format();
            let format = format_for_device(
                sample_format,
                supported.sample_rate().0,
                supported.channels(),
            )?;

            info!(
                sample_rate = format.sample_rate,
                channels = format.channels,
                bit_depth = format.bit_depth,
                encoding = ?format.encoding,
                "audio config selected"
            );

            let config: StreamConfig = supported.config();
            let running_cb = Arc::clone(&running);
            let overruns = Arc::new(AtomicUsize::new(0));
            let overruns_cb = Arc::clone(&overruns);

            let stream = device
                .build_input_stream_raw(
                    &config,
                    sample_format,
                    move |data: &Data, _info: &InputCallbackInfo| {
                        if !running_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        let bytes = data.bytes();
                        // All or nothing, so the ring only ever holds whole frames.
                        if producer.vacant_len() >= bytes.len() {
                            producer.push_slice(bytes);
                        } else {
                            overruns_cb.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
                .map_err(|e| DiscoError::AudioStream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| DiscoError::AudioStream(e.to_string()))?;

            Ok(Self {
                _stream: stream,
                running,
                overruns,
                format,
            })
        }

        /// Callbacks dropped because the ring was full.
        pub fn overruns(&self) -> usize {
            self.overruns.load(Ordering::Relaxed)
        }

        /// Stop: signal the callback to no-op on its next invocation.
        pub fn stop(&self) {
            self.running.store(false, Ordering::Release);
        }
    }

}
