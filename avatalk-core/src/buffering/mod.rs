//! Lock-free SPSC ring buffer between the microphone callback and the VAD thread.
//!
//! Uses `ringbuf::HeapRb<f32>` which provides a wait-free `push_slice`
//! safe to call from the real-time audio callback.

pub mod chunk;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the monitor thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^17 = 131 072 f32 samples ≈ 2.7 s at 48 kHz.
///
/// The monitor only classifies frames and never holds audio for transcription,
/// so a short ring is enough to absorb scheduling jitter.
pub const RING_CAPACITY: usize = 1 << 17;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
