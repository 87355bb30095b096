//! Source state machine: encode -> packetize -> transmit -> retransmit.
//!
//! One struct owning config, codec, history/queues and per-sink
//! bookkeeping, with methods corresponding to the host's call sites
//! instead of an internally spawned thread. A `parking_lot::RwLock`
//! guards structural state (format, sinks, history), while the sample
//! ring's producer/consumer halves get their own lock so `process()` and
//! `send()` never block on each other for longer than a push/pop.

pub mod sink_desc;

use crate::codec::{CodecRegistry, Encoder};
use crate::endpoint::{Endpoint, Id, SendFn};
use crate::error::{AooError, AooResult};
use crate::event::{Event, EventQueue};
use crate::format::Format;
use crate::history::HistoryBuffer;
use crate::options::Settings;
use crate::packet::Block;
use crate::protocol::{self, ResendItem, WireMessage};
use crate::queue::SampleQueue;
use crate::time::{DllTimer, NtpTime};
use parking_lot::{Mutex, RwLock};
use ringbuf::traits::{Consumer, Observer, Producer};
use sink_desc::{SinkDescriptor, SinkState};
use std::sync::atomic::{AtomicU32, Ordering};

const HEADER_OVERHEAD: usize = 64;

struct StructuralState {
    format: Option<Format>,
    sample_rate: u32,
    block_size: u32,
    channels: u16,
    sinks: Vec<SinkDescriptor>,
    history: HistoryBuffer,
    settings: Settings,
    salt: u32,
    sequence: u32,
    streaming: bool,
    xrun_counter: u32,
    last_ping_time: Option<f64>,
    scratch: Vec<u8>,
    /// Resend requests parsed off the network thread, drained and
    /// actually transmitted on the next `send()` call.
    pending_resends: Vec<(Id, ResendItem)>,
}

pub struct Source {
    id: Id,
    registry: CodecRegistry,
    state: RwLock<StructuralState>,
    encoder: Mutex<Option<Box<dyn Encoder>>>,
    input: Mutex<SampleQueue>,
    timer: Mutex<DllTimer>,
    events: EventQueue,
    xrun_seen: AtomicU32,
}

impl Source {
    pub fn new(id: Id, registry: CodecRegistry) -> Self {
        Self {
            id,
            registry,
            state: RwLock::new(StructuralState {
                format: None,
                sample_rate: 0,
                block_size: 0,
                channels: 0,
                sinks: Vec::new(),
                history: HistoryBuffer::new(1),
                settings: Settings::default(),
                salt: rand::random(),
                sequence: 0,
                streaming: false,
                xrun_counter: 0,
                last_ping_time: None,
                scratch: Vec::new(),
                pending_resends: Vec::new(),
            }),
            encoder: Mutex::new(None),
            input: Mutex::new(SampleQueue::new(1)),
            timer: Mutex::new(DllTimer::new(0.01, 0.25, 0.1)),
            events: EventQueue::new(),
            xrun_seen: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn setup(&self, sample_rate: u32, block_size: u32, channels: u16) -> AooResult<()> {
        if sample_rate == 0 || block_size == 0 || channels == 0 {
            return Err(AooError::BadArgument);
        }
        let mut state = self.state.write();
        state.sample_rate = sample_rate;
        state.block_size = block_size;
        state.channels = channels;
        let block_period = block_size as f64 / sample_rate as f64;
        *self.timer.lock() = DllTimer::new(block_period, 0.25, state.settings.dll_bandwidth);
        let ring_capacity = (channels as usize) * (block_size as usize) * 8;
        *self.input.lock() = SampleQueue::new(ring_capacity.max(1));
        let resend_window = state.settings.resend_buffer_size;
        state.history = HistoryBuffer::new(HistoryBuffer::capacity_for_resend_window(resend_window, sample_rate, block_size));
        Ok(())
    }

    pub fn set_format(&self, format: Format) -> AooResult<()> {
        format.validate()?;
        let encoder = self
            .registry
            .encoder_new(&format.codec_name, format.channels, format.sample_rate, format.block_size)
            .map_err(|_| AooError::BadArgument)?;
        let mut state = self.state.write();
        state.format = Some(format);
        *self.encoder.lock() = Some(encoder);
        for sink in state.sinks.iter_mut() {
            sink.format_announced = false;
        }
        self.events.push(Event::FormatChange { id: self.id });
        Ok(())
    }

    pub fn add_sink(&self, endpoint: Endpoint) -> AooResult<()> {
        let mut state = self.state.write();
        if state.sinks.iter().any(|s| s.id() == endpoint.id) {
            return Err(AooError::BadArgument);
        }
        state.sinks.push(SinkDescriptor::new(endpoint));
        self.events.push(Event::SinkAdded { id: state.sinks.last().unwrap().id() });
        Ok(())
    }

    pub fn remove_sink(&self, id: Id) -> AooResult<()> {
        let mut state = self.state.write();
        let before = state.sinks.len();
        state.sinks.retain(|s| s.id() != id);
        if state.sinks.len() == before {
            return Err(AooError::NotFound);
        }
        self.events.push(Event::SinkRemoved { id });
        Ok(())
    }

    pub fn start_stream(&self) {
        let mut state = self.state.write();
        state.streaming = true;
        self.events.push(Event::StreamStart { id: self.id });
    }

    pub fn stop_stream(&self) {
        let mut state = self.state.write();
        state.streaming = false;
        self.events.push(Event::StreamStop { id: self.id });
    }

    pub fn accept_invitation(&self, sink: Id, _token: u32) -> AooResult<()> {
        let mut state = self.state.write();
        let desc = state.sinks.iter_mut().find(|s| s.id() == sink).ok_or(AooError::NotFound)?;
        desc.state = SinkState::Active;
        Ok(())
    }

    /// Push one block's worth of interleaved host input into the ring
    /// (spec step 1) and feed the timer + DLL (spec step 2).
    pub fn process(&self, interleaved_input: &[f32], n_frames: usize, ntp_time: NtpTime) -> AooResult<()> {
        let channels = self.state.read().channels as usize;
        let needed = n_frames * channels.max(1);
        if interleaved_input.len() < needed {
            return Err(AooError::BadArgument);
        }

        let mut input = self.input.lock();
        let pushed = input.push_slice(&interleaved_input[..needed]);
        drop(input);
        if pushed < needed {
            let mut state = self.state.write();
            state.xrun_counter += 1;
        }

        let xrun = self.timer.lock().update(ntp_time);
        if xrun {
            self.xrun_seen.fetch_add(1, Ordering::Relaxed);
            self.events.push(Event::Xrun { id: self.id });
        }
        Ok(())
    }

    /// Encode, history-insert, fragment and fan out to every sink (spec
    /// steps 3-5). Also drains and replies to any pending control
    /// messages parsed by `handle_message`.
    pub fn send(&self, send_fn: &mut SendFn) -> AooResult<()> {
        self.send_format_announces(send_fn);
        self.send_pending_resends(send_fn);

        loop {
            let block_size = self.state.read().block_size as usize;
            let channels = self.state.read().channels as usize;
            if block_size == 0 || channels == 0 {
                return Ok(());
            }
            let needed_samples = block_size * channels;
            if self.input.lock().occupied_len() < needed_samples {
                break;
            }
            self.encode_and_send_one_block(send_fn)?;
        }

        let ping_due = {
            let state = self.state.read();
            match state.last_ping_time {
                None => true,
                Some(last) => NtpTime::now().to_seconds_f64() - last >= state.settings.ping_interval,
            }
        };
        if ping_due {
            self.send_pings(send_fn);
        }

        Ok(())
    }

    fn encode_and_send_one_block(&self, send_fn: &mut SendFn) -> AooResult<()> {
        let block_size;
        let channels;
        let packet_size;
        let redundancy;
        let salt;
        let sequence;
        {
            let mut state = self.state.write();
            block_size = state.block_size as usize;
            channels = state.channels as usize;
            packet_size = state.settings.packet_size;
            redundancy = state.settings.redundancy;
            salt = state.salt;
            sequence = state.sequence;
            state.sequence = state.sequence.wrapping_add(1);
            if state.sequence == i32::MAX as u32 {
                state.salt = rand::random();
                state.sequence = 0;
            }
        }

        let mut samples = vec![0.0f32; block_size * channels];
        {
            let mut input = self.input.lock();
            input.pop_slice(&mut samples);
        }

        let mut encoded = vec![0u8; block_size * channels * 8];
        let encoded_len = {
            let mut encoder_guard = self.encoder.lock();
            let encoder = encoder_guard.as_mut().ok_or(AooError::Idle)?;
            encoder.encode(&samples, &mut encoded).map_err(|_| AooError::BadArgument)?
        };
        encoded.truncate(encoded_len);

        let sample_rate;
        let channel_onset;
        let sinks_snapshot: Vec<Endpoint>;
        {
            let mut state = self.state.write();
            sample_rate = state.sample_rate;
            channel_onset = state.settings.channel_onset;
            let block = state.history.push(Block {
                sequence,
                channel_onset,
                sample_rate,
                frame_size: (packet_size.saturating_sub(HEADER_OVERHEAD)).max(1) as u32,
                data: encoded,
            });
            sinks_snapshot = state.sinks.iter().map(|s| s.endpoint.clone()).collect();
            let _ = block;
        }

        let block = {
            let state = self.state.read();
            state.history.find(sequence).cloned().ok_or(AooError::NotFound)?
        };
        let frame_count = block.frame_count().max(1);

        for _ in 0..redundancy {
            for sink in &sinks_snapshot {
                for frame_index in 0..frame_count {
                    let payload = block.frame_bytes(frame_index).unwrap_or(&[]).to_vec();
                    let msg = WireMessage::Data {
                        source_id: self.id,
                        salt,
                        packet: crate::packet::DataPacket {
                            sequence,
                            total_size: block.total_size(),
                            frame_count,
                            frame_index,
                            channel_onset,
                            sample_rate,
                            payload,
                        },
                    };
                    let bytes = msg.encode_osc();
                    let _ = send_fn(&bytes, &sink.address);
                }
            }
        }

        let xrun_pending = {
            let mut state = self.state.write();
            if state.xrun_counter > 0 {
                state.xrun_counter -= 1;
                true
            } else {
                false
            }
        };
        if xrun_pending {
            for sink in &sinks_snapshot {
                let msg = WireMessage::Data {
                    source_id: self.id,
                    salt,
                    packet: crate::packet::DataPacket {
                        sequence,
                        total_size: 0,
                        frame_count: 0,
                        frame_index: 0,
                        channel_onset,
                        sample_rate,
                        payload: Vec::new(),
                    },
                };
                let _ = send_fn(&msg.encode_osc(), &sink.address);
            }
        }

        Ok(())
    }

    /// Send a `/format` announce to every sink that hasn't seen the
    /// current format yet (a fresh sink, or one added/re-armed after
    /// `set_format`).
    fn send_format_announces(&self, send_fn: &mut SendFn) {
        let mut state = self.state.write();
        let Some(format) = state.format.clone() else { return };
        let salt = state.salt;
        let pending: Vec<Endpoint> = state
            .sinks
            .iter_mut()
            .filter(|s| !s.format_announced)
            .map(|s| {
                s.format_announced = true;
                s.endpoint.clone()
            })
            .collect();
        drop(state);

        for sink in &pending {
            let msg = WireMessage::FormatAnnounce {
                source_id: self.id,
                version: protocol::PROTOCOL_VERSION,
                salt,
                format: format.clone(),
            };
            let _ = send_fn(&msg.encode_osc(), &sink.address);
        }
    }

    fn send_pings(&self, send_fn: &mut SendFn) {
        let now = NtpTime::now();
        let sinks_snapshot: Vec<Endpoint> = {
            let mut state = self.state.write();
            state.last_ping_time = Some(now.to_seconds_f64());
            state.sinks.iter().map(|s| s.endpoint.clone()).collect()
        };
        for sink in &sinks_snapshot {
            let msg = WireMessage::Ping { source_id: self.id, send_time: now };
            let _ = send_fn(&msg.encode_osc(), &sink.address);
        }
    }

    pub fn handle_message(&self, bytes: &[u8], addr: &[u8]) -> AooResult<()> {
        let msg = protocol::decode_any(bytes)?;
        match msg {
            WireMessage::FormatRequest { .. } => {
                // Reply is sent out-of-band via the next `send()` call's
                // sink list; nothing to do until a sink is registered.
                Ok(())
            }
            WireMessage::ResendRequest { sink_id, items, .. } => self.handle_resend(sink_id, addr, &items),
            WireMessage::Invite { sink_id, token } => {
                let mut state = self.state.write();
                state.sinks.retain(|s| s.id() != sink_id);
                state.sinks.push(SinkDescriptor::invited(Endpoint::new(addr.to_vec(), sink_id)));
                drop(state);
                self.events.push(Event::Invite { id: sink_id, token });
                Ok(())
            }
            WireMessage::Uninvite { sink_id } => {
                let mut state = self.state.write();
                state.sinks.retain(|s| s.id() != sink_id);
                drop(state);
                self.events.push(Event::Uninvite { id: sink_id });
                Ok(())
            }
            _ => Err(AooError::NotImplemented),
        }
    }

    /// Parse-time half of resend handling: just queue the request. The
    /// actual retransmission happens from `send()`, which is the only
    /// place holding a `SendFn`.
    fn handle_resend(&self, sink_id: Id, _addr: &[u8], items: &[ResendItem]) -> AooResult<()> {
        let mut state = self.state.write();
        state.pending_resends.extend(items.iter().map(|item| (sink_id, item.clone())));
        Ok(())
    }

    fn send_pending_resends(&self, send_fn: &mut SendFn) {
        let mut state = self.state.write();
        let requests = std::mem::take(&mut state.pending_resends);
        let sample_rate = state.sample_rate;
        drop(state);

        for (sink_id, item) in requests {
            let state = self.state.read();
            let Some(sink_addr) = state.sinks.iter().find(|s| s.id() == sink_id).map(|s| s.endpoint.address.clone()) else {
                continue;
            };
            let Some(block) = state.history.find(item.sequence).cloned() else {
                continue;
            };
            let salt = state.salt;
            drop(state);

            let frame_count = block.frame_count().max(1);
            let frame_indices: Vec<u32> = if item.frame < 0 { (0..frame_count).collect() } else { vec![item.frame as u32] };
            for frame_index in frame_indices {
                let payload = block.frame_bytes(frame_index).unwrap_or(&[]).to_vec();
                let msg = WireMessage::Data {
                    source_id: self.id,
                    salt,
                    packet: crate::packet::DataPacket {
                        sequence: item.sequence,
                        total_size: block.total_size(),
                        frame_count,
                        frame_index,
                        channel_onset: block.channel_onset,
                        sample_rate,
                        payload,
                    },
                };
                let _ = send_fn(&msg.encode_osc(), &sink_addr);
            }
            self.events.push(Event::BlockResent { id: sink_id, sequence: item.sequence });
        }
    }

    pub fn poll_events(&self, out: &mut Vec<Event>, max: usize) -> usize {
        self.events.poll(out, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ID_WILDCARD;

    fn make_source() -> Source {
        let source = Source::new(1, CodecRegistry::with_builtins());
        source.setup(48000, 64, 2).unwrap();
        source.set_format(Format::new("pcm_float32", 2, 48000, 64)).unwrap();
        source
    }

    #[test]
    fn add_and_remove_sink() {
        let source = make_source();
        source.add_sink(Endpoint::new(vec![1, 2, 3, 4], 9)).unwrap();
        assert!(source.remove_sink(9).is_ok());
        assert!(source.remove_sink(9).is_err());
    }

    #[test]
    fn add_duplicate_sink_rejected() {
        let source = make_source();
        source.add_sink(Endpoint::new(vec![1], 9)).unwrap();
        assert!(source.add_sink(Endpoint::new(vec![1], 9)).is_err());
    }

    #[test]
    fn process_then_send_emits_data_to_sink() {
        let source = make_source();
        source.add_sink(Endpoint::new(vec![127, 0, 0, 1], 2)).unwrap();
        let samples = vec![0.0f32; 64 * 2];
        source.process(&samples, 64, NtpTime::now()).unwrap();

        let mut sent = Vec::new();
        {
            let mut send_fn = |data: &[u8], _addr: &[u8]| {
                sent.push(data.to_vec());
                Ok(data.len())
            };
            source.send(&mut send_fn).unwrap();
        }
        assert!(!sent.is_empty());
    }

    #[test]
    fn invite_then_uninvite_emits_events() {
        let source = make_source();
        source.handle_message(&WireMessage::Invite { sink_id: 5, token: 1 }.encode_osc(), &[1, 2, 3]).unwrap();
        source.handle_message(&WireMessage::Uninvite { sink_id: 5 }.encode_osc(), &[1, 2, 3]).unwrap();
        let mut events = Vec::new();
        source.poll_events(&mut events, 10);
        assert!(events.iter().any(|e| matches!(e, Event::Invite { id: 5, .. })));
        assert!(events.iter().any(|e| matches!(e, Event::Uninvite { id: 5 })));
    }

    #[test]
    fn accept_invitation_on_unknown_sink_errors() {
        let source = make_source();
        assert!(source.accept_invitation(ID_WILDCARD, 0).is_err());
    }
}
