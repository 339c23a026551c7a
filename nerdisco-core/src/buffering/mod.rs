//! Buffers between the capture callback, the capture thread and the worker.
//!
//! - A lock-free SPSC byte ring (`ringbuf::HeapRb<u8>`) whose `push_slice`
//!   is wait-free and safe to call from the real-time audio callback.
//! - A bounded drop-oldest handoff ([`handoff`]) carrying owned buffers from
//!   the capture thread to the analysis worker.

pub mod frame;
pub mod handoff;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the audio callback.
pub type CaptureProducer = ringbuf::HeapProd<u8>;

/// Consumer half, held by the capture thread.
pub type CaptureConsumer = ringbuf::HeapCons<u8>;

/// Ring capacity: 1 MiB, about 2.7 s of 48 kHz stereo f32.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<u8>::new(CAPTURE_RING_CAPACITY).split()
}

/// Move every whole frame currently in the ring into a fresh buffer.
///
/// Trailing bytes of an incomplete frame stay in the ring for the next call.
pub fn drain_whole_frames(consumer: &mut CaptureConsumer, frame_bytes: usize) -> Vec<u8> {
    if frame_bytes == 0 {
        return Vec::new();
    }
    let available = consumer.occupied_len();
    let len = available - available % frame_bytes;
    let mut bytes = vec![0u8; len];
    let read = consumer.pop_slice(&mut bytes);
    bytes.truncate(read);
    bytes
}
