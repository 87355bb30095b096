//! Per-source bookkeeping held by a `Sink`: one entry per remote Source
//! actively streaming to us, carrying its own decoder, resampler, jitter
//! buffer and stream-state flags. Each is wrapped in its own
//! `parking_lot::RwLock` so the audio thread only contends with network
//! activity for the specific source being touched, not the whole map.

use crate::codec::Decoder;
use crate::endpoint::{Endpoint, Id};
use crate::jitter::JitterBuffer;
use crate::resample::Resampler;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Buffering,
    Active,
    Stopped,
}

/// One decoded block's (sample_rate, channel_onset) metadata, queued
/// alongside its samples so the mix step knows where they land.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    pub sample_rate: u32,
    pub channel_onset: u16,
}

pub struct SourceDescriptor {
    pub endpoint: Endpoint,
    pub source_id: Id,
    pub salt: u32,
    pub decoder: Box<dyn Decoder>,
    pub resampler: Resampler,
    pub jitter: JitterBuffer,
    pub block_info: VecDeque<BlockInfo>,
    pub state: StreamState,
    pub underrun: bool,
    pub xrun_samples: u64,
    pub last_packet_time: f64,
}

impl SourceDescriptor {
    pub fn new(endpoint: Endpoint, source_id: Id, salt: u32, decoder: Box<dyn Decoder>, now: f64) -> Self {
        Self {
            endpoint,
            source_id,
            salt,
            decoder,
            resampler: Resampler::new(),
            jitter: JitterBuffer::new(32),
            block_info: VecDeque::new(),
            state: StreamState::Idle,
            underrun: false,
            xrun_samples: 0,
            last_packet_time: now,
        }
    }

    /// A salt change invalidates all buffered state: no samples from the
    /// old stream may interleave with the new one.
    pub fn reset_for_new_stream(&mut self, salt: u32) {
        self.salt = salt;
        self.jitter.reset();
        self.block_info.clear();
        self.decoder.reset();
        self.state = StreamState::Buffering;
        self.underrun = false;
    }

    pub fn timed_out(&self, now: f64, timeout: f64) -> bool {
        now - self.last_packet_time > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pcm::PcmCodec;
    use crate::codec::CodecFactory;

    #[test]
    fn reset_for_new_stream_clears_jitter_and_info() {
        let decoder = PcmCodec::float32().decoder_new(2, 48000, 64).unwrap();
        let mut desc = SourceDescriptor::new(Endpoint::new(vec![1], 1), 1, 10, decoder, 0.0);
        desc.block_info.push_back(BlockInfo { sample_rate: 48000, channel_onset: 0 });
        desc.reset_for_new_stream(11);
        assert_eq!(desc.salt, 11);
        assert!(desc.block_info.is_empty());
        assert_eq!(desc.state, StreamState::Buffering);
    }

    #[test]
    fn timed_out_past_timeout() {
        let decoder = PcmCodec::float32().decoder_new(2, 48000, 64).unwrap();
        let desc = SourceDescriptor::new(Endpoint::new(vec![1], 1), 1, 10, decoder, 0.0);
        assert!(desc.timed_out(20.0, 10.0));
        assert!(!desc.timed_out(5.0, 10.0));
    }
}
