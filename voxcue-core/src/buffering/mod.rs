//! Sample buffering between the audio callback and the tick driver.
//!
//! ```text
//! cpal callback ──push_slice──► HeapRb<f32> (SPSC) ──pop_slice──► LoopingClip
//!                                                                    │ read_window
//!                                                            WindowQueue (bounded)
//! ```
//!
//! `ringbuf::HeapRb<f32>` provides a wait-free `push_slice` safe to call from
//! the real-time audio callback. The looping clip and the window queue live
//! on the driver thread.

pub mod clip;
pub mod queue;
pub mod window;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half, held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half, drained by `CaptureBuffer::poll`.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^20 = 1 048 576 f32 samples ≈ 21.8 s at 48 kHz.
/// Covers any realistic stall of the tick driver between polls.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
