//! Sink-side jitter buffer and reorder/resend logic.
//!
//! A sequence-ordered `VecDeque` of entries with duplicate/late/reorder
//! counters. Sequences are 32-bit and monotonic per-stream, so there's no
//! wraparound to handle — a sequence overflow rolls the salt and starts a
//! fresh stream instead. Entries are `ReceivedBlock`s carrying an encoded
//! block under assembly, not raw decoded samples.

use crate::packet::{Block, DataPacket, ReceivedBlock};
use std::collections::VecDeque;

#[derive(Debug, Default, Clone, Copy)]
pub struct JitterStats {
    pub received: u64,
    pub late: u64,
    pub duplicate: u64,
    pub reordered: u64,
    pub resent: u64,
    pub lost: u64,
}

pub enum PushOutcome {
    Accepted,
    DiscardedLate,
    DiscardedDuplicate,
    Flushed,
}

pub struct JitterBuffer {
    entries: VecDeque<ReceivedBlock>,
    capacity: usize,
    last_pushed: Option<u32>,
    last_popped: Option<u32>,
    stats: JitterStats,
}

impl JitterBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            last_pushed: None,
            last_popped: None,
            stats: JitterStats::default(),
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.last_pushed = None;
        self.last_popped = None;
    }

    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.stats.lost += 1;
        }
    }

    pub fn stats(&self) -> JitterStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest_sequence(&self) -> Option<u32> {
        self.entries.front().map(|e| e.sequence)
    }

    /// Route one incoming frame into the buffer.
    pub fn handle_data(&mut self, packet: &DataPacket) -> PushOutcome {
        self.stats.received += 1;

        let oldest = self.oldest_sequence();
        if let Some(oldest) = oldest {
            if packet.sequence < oldest {
                self.stats.late += 1;
                return PushOutcome::DiscardedLate;
            }
        }

        let last_pushed = self.last_pushed;

        if let Some(last) = last_pushed {
            if packet.sequence > last.wrapping_add(self.capacity as u32) {
                // Large gap: flush and re-seed.
                let dropped = self.entries.len() as u64;
                self.stats.lost += dropped;
                self.entries.clear();
                self.insert_new(packet);
                self.last_pushed = Some(packet.sequence);
                return PushOutcome::Flushed;
            }

            if packet.sequence > last {
                for missing in (last + 1)..packet.sequence {
                    self.entries.push_back(ReceivedBlock::placeholder(missing));
                }
                self.insert_new(packet);
                self.last_pushed = Some(packet.sequence);
                self.evict_overflow();
                return PushOutcome::Accepted;
            }
        } else {
            self.insert_new(packet);
            self.last_pushed = Some(packet.sequence);
            self.evict_overflow();
            return PushOutcome::Accepted;
        }

        // In-window: locate existing entry.
        let pos = self.entries.iter().position(|e| e.sequence == packet.sequence);
        match pos {
            None => {
                // Sequence is within [oldest, last_pushed] but the entry
                // was already popped or never placeholder-filled; treat as
                // a stale duplicate.
                self.stats.duplicate += 1;
                PushOutcome::DiscardedDuplicate
            }
            Some(idx) => {
                let resent = self.entries[idx].retry_count > 0;
                let was_placeholder = self.entries[idx].is_placeholder();
                if self.entries[idx].has_frame(packet.frame_index) {
                    self.stats.duplicate += 1;
                    return PushOutcome::DiscardedDuplicate;
                }
                if was_placeholder {
                    self.entries[idx].initialize(
                        packet.total_size,
                        self.frame_size_hint(packet),
                        packet.frame_count,
                        packet.channel_onset,
                        packet.sample_rate,
                    );
                }
                self.entries[idx].insert_frame(packet.frame_index, &packet.payload);
                if idx != self.entries.len() - 1 {
                    self.stats.reordered += 1;
                }
                if resent {
                    self.stats.resent += 1;
                }
                PushOutcome::Accepted
            }
        }
    }

    fn frame_size_hint(&self, packet: &DataPacket) -> u32 {
        if packet.frame_count <= 1 {
            packet.total_size.max(packet.payload.len() as u32)
        } else {
            // All frames but the last share frame_size; the payload of any
            // non-last frame reveals it directly.
            packet.payload.len() as u32
        }
    }

    fn insert_new(&mut self, packet: &DataPacket) {
        let mut entry = ReceivedBlock::placeholder(packet.sequence);
        entry.initialize(
            packet.total_size,
            self.frame_size_hint(packet),
            packet.frame_count,
            packet.channel_onset,
            packet.sample_rate,
        );
        entry.insert_frame(packet.frame_index, &packet.payload);
        self.entries.push_back(entry);
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.stats.lost += 1;
        }
    }

    /// Pop the oldest entry if it is complete, or drop it (counted as
    /// lost) if the caller decides the decoded-sample queue is running
    /// dry.
    pub fn pop_front(&mut self) -> Option<ReceivedBlock> {
        let entry = self.entries.pop_front()?;
        self.last_popped = Some(entry.sequence);
        Some(entry)
    }

    pub fn front_complete(&self) -> bool {
        self.entries.front().map(|e| e.complete()).unwrap_or(false)
    }

    pub fn drop_front_as_lost(&mut self) -> Option<Block> {
        let entry = self.entries.pop_front()?;
        self.last_popped = Some(entry.sequence);
        self.stats.lost += 1;
        Some(entry.into_block())
    }

    /// For each incomplete block except the most recent, decide whether to
    /// (re)request missing frames. `now` is seconds on the monotonic sink
    /// clock.
    pub fn resend_scan(
        &mut self,
        now: f64,
        resend_interval: f64,
        resend_limit: u32,
        max_requests: usize,
    ) -> Vec<ResendRequest> {
        let mut requests = Vec::new();
        if resend_limit == 0 {
            return requests;
        }
        let last_idx = self.entries.len().saturating_sub(1);

        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if idx == last_idx {
                continue; // most recent block still expected to arrive
            }
            if entry.complete() || entry.dropped {
                continue;
            }
            if let Some(last) = entry.last_request_time {
                if now - last < resend_interval {
                    continue;
                }
            }
            if entry.retry_count > resend_limit {
                entry.dropped = true;
                continue;
            }

            entry.retry_count += 1;
            entry.last_request_time = Some(now);

            if entry.frame_count == 0 {
                requests.push(ResendRequest {
                    sequence: entry.sequence,
                    frame: -1,
                });
            } else {
                for missing in entry.missing_frames() {
                    requests.push(ResendRequest {
                        sequence: entry.sequence,
                        frame: missing as i32,
                    });
                    if requests.len() >= max_requests {
                        return requests;
                    }
                }
            }

            if requests.len() >= max_requests {
                break;
            }
        }
        requests
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRequest {
    pub sequence: u32,
    /// -1 means "whole block" (no frames have arrived at all).
    pub frame: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u32, frame_index: u32, frame_count: u32, payload: Vec<u8>) -> DataPacket {
        DataPacket {
            sequence: seq,
            total_size: (payload.len() as u32) * frame_count.max(1),
            frame_count,
            frame_index,
            channel_onset: 0,
            sample_rate: 48000,
            payload,
        }
    }

    #[test]
    fn single_frame_blocks_complete_immediately() {
        let mut jb = JitterBuffer::new(8);
        jb.handle_data(&packet(0, 0, 1, vec![1, 2, 3]));
        assert!(jb.front_complete());
    }

    #[test]
    fn gap_fills_with_placeholders() {
        let mut jb = JitterBuffer::new(8);
        jb.handle_data(&packet(0, 0, 1, vec![1]));
        jb.handle_data(&packet(2, 0, 1, vec![2]));
        assert_eq!(jb.len(), 3);
        assert!(jb.front_complete());
        let middle = &jb.entries[1];
        assert!(middle.is_placeholder());
    }

    #[test]
    fn overflow_evicts_oldest_and_counts_lost() {
        let mut jb = JitterBuffer::new(2);
        for s in 0..5 {
            jb.handle_data(&packet(s, 0, 1, vec![s as u8]));
        }
        assert!(jb.len() <= 2);
        assert!(jb.stats().lost > 0);
    }

    #[test]
    fn late_packet_discarded() {
        let mut jb = JitterBuffer::new(8);
        for s in 0..3 {
            jb.handle_data(&packet(s, 0, 1, vec![s as u8]));
        }
        jb.pop_front();
        jb.pop_front();
        let outcome = jb.handle_data(&packet(0, 0, 1, vec![9]));
        assert!(matches!(outcome, PushOutcome::DiscardedLate));
    }

    #[test]
    fn duplicate_frame_discarded() {
        let mut jb = JitterBuffer::new(8);
        jb.handle_data(&packet(0, 0, 2, vec![1, 2, 3, 4]));
        let outcome = jb.handle_data(&packet(0, 0, 2, vec![1, 2, 3, 4]));
        assert!(matches!(outcome, PushOutcome::DiscardedDuplicate));
    }

    #[test]
    fn resend_limit_zero_disables_resend() {
        let mut jb = JitterBuffer::new(8);
        jb.handle_data(&packet(0, 0, 2, vec![1, 2]));
        jb.handle_data(&packet(1, 0, 1, vec![9])); // keep block 0 not-most-recent
        let reqs = jb.resend_scan(10.0, 0.0, 0, 100);
        assert!(reqs.is_empty());
    }

    #[test]
    fn resend_scan_requests_missing_frames_of_non_latest_block() {
        let mut jb = JitterBuffer::new(8);
        jb.handle_data(&packet(0, 0, 2, vec![1, 2])); // frame 1 missing
        jb.handle_data(&packet(1, 0, 1, vec![9]));
        let reqs = jb.resend_scan(10.0, 0.0, 5, 100);
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].sequence, 0);
        assert_eq!(reqs[0].frame, 1);
    }
}
