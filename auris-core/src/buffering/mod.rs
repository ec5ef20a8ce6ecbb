//! Audio buffering: the lock-free SPSC sample ring fed by the capture
//! callback, plus the frame types used by the capture state machine.
//!
//! `ringbuf::HeapRb<f32>` provides a wait-free `push_slice` safe to call
//! from the real-time audio callback.

pub mod frame;
pub mod ring;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the audio callback thread.
pub type SampleProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the session driver thread.
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^21 = 2 097 152 f32 samples ≈ 43.7 s at 48 kHz.
/// Large enough that a session never drops frames while the driver is
/// writing out an artifact between reads.
pub const RING_CAPACITY: usize = 1 << 21;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_sample_ring() -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
