//! Sample queue between the audio thread and the network thread.
//!
//! Uses `ringbuf`'s lock-free SPSC heap ring. The event queue (many
//! producers, one consumer) lives in `event.rs` on `crossbeam_channel`
//! instead, since the sample ring's SPSC contract can't express that
//! shape.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// One direction of a lock-free interleaved-float sample pipe between the
/// audio callback and the network thread.
pub struct SampleQueue {
    producer: HeapProd<f32>,
    consumer: HeapCons<f32>,
}

impl SampleQueue {
    pub fn new(capacity_samples: usize) -> Self {
        let rb = HeapRb::<f32>::new(capacity_samples.max(1));
        let (producer, consumer) = rb.split();
        Self { producer, consumer }
    }

    pub fn split(self) -> (HeapProd<f32>, HeapCons<f32>) {
        (self.producer, self.consumer)
    }

    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    pub fn pop_slice(&mut self, out: &mut [f32]) -> usize {
        self.consumer.pop_slice(out)
    }

    pub fn occupied_len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn free_len(&self) -> usize {
        self.producer.vacant_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_queue_round_trips_pushed_samples() {
        let mut q = SampleQueue::new(16);
        let input = [1.0f32, 2.0, 3.0, 4.0];
        assert_eq!(q.push_slice(&input), 4);
        let mut out = [0.0f32; 4];
        assert_eq!(q.pop_slice(&mut out), 4);
        assert_eq!(out, input);
    }

    #[test]
    fn sample_queue_push_saturates_at_capacity() {
        let mut q = SampleQueue::new(4);
        let input = [1.0f32; 8];
        let pushed = q.push_slice(&input);
        assert_eq!(pushed, 4);
        assert_eq!(q.free_len(), 0);
    }

}
