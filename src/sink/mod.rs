//! Sink state machine: receive -> reorder -> resample -> decode -> emit.
//!
//! Mirrors `Source`'s shape: one `parking_lot::RwLock` around the map of
//! per-source descriptors (structural changes — adding/removing a source,
//! resizing a jitter buffer — take it exclusively), each descriptor
//! additionally behind its own lock so the audio thread only contends for
//! the specific source it is mixing.

pub mod source_desc;

use crate::codec::CodecRegistry;
use crate::endpoint::{Endpoint, Id, SendFn};
use crate::error::{AooError, AooResult};
use crate::event::{Event, EventQueue};
use crate::options::Settings;
use crate::protocol::{self, ResendItem, WireMessage};
use crate::time::{DllTimer, NtpTime};
use parking_lot::RwLock;
use source_desc::{SourceDescriptor, StreamState};

pub struct Sink {
    id: Id,
    registry: CodecRegistry,
    sample_rate: RwLock<u32>,
    block_size: RwLock<u32>,
    channels: RwLock<u16>,
    settings: RwLock<Settings>,
    sources: RwLock<Vec<SourceDescriptor>>,
    invited: RwLock<Vec<Endpoint>>,
    timer: RwLock<DllTimer>,
    events: EventQueue,
}

impl Sink {
    pub fn new(id: Id, registry: CodecRegistry) -> Self {
        Self {
            id,
            registry,
            sample_rate: RwLock::new(0),
            block_size: RwLock::new(0),
            channels: RwLock::new(0),
            settings: RwLock::new(Settings::default()),
            sources: RwLock::new(Vec::new()),
            invited: RwLock::new(Vec::new()),
            timer: RwLock::new(DllTimer::new(0.01, 0.25, 0.1)),
            events: EventQueue::new(),
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn setup(&self, sample_rate: u32, block_size: u32, channels: u16) -> AooResult<()> {
        if sample_rate == 0 || block_size == 0 || channels == 0 {
            return Err(AooError::BadArgument);
        }
        *self.sample_rate.write() = sample_rate;
        *self.block_size.write() = block_size;
        *self.channels.write() = channels;
        let block_period = block_size as f64 / sample_rate as f64;
        let bandwidth = self.settings.read().dll_bandwidth;
        *self.timer.write() = DllTimer::new(block_period, 0.25, bandwidth);
        Ok(())
    }

    pub fn invite_source(&self, endpoint: Endpoint) {
        self.invited.write().push(endpoint);
    }

    pub fn uninvite_source(&self, id: Id) {
        self.invited.write().retain(|e| e.id != id);
        let mut sources = self.sources.write();
        sources.retain(|s| s.source_id != id);
    }

    pub fn uninvite_all(&self) {
        self.invited.write().clear();
        self.sources.write().clear();
    }

    /// Per-process-call input path (spec §4.6): update timer, drain each
    /// source's jitter buffer into its decoded-sample queue, run the
    /// resend scan, then mix resampled output into the host buffer.
    pub fn process(&self, output: &mut [f32], n_frames: usize, ntp_time: NtpTime) -> AooResult<()> {
        let channels = *self.channels.read() as usize;
        if output.len() < n_frames * channels {
            return Err(AooError::InsufficientBuffer);
        }
        output[..n_frames * channels].fill(0.0);

        let xrun = self.timer.write().update(ntp_time);
        if xrun {
            self.events.push(Event::Xrun { id: self.id });
        }

        let sink_rate = {
            let rate = *self.sample_rate.read();
            let period = self.timer.read().period();
            if period > 0.0 {
                *self.block_size.read() as f64 / period
            } else {
                rate as f64
            }
        };

        let mut sources = self.sources.write();
        let now = NtpTime::now().to_seconds_f64();
        let source_timeout = self.settings.read().source_timeout;
        sources.retain(|s| !s.timed_out(now, source_timeout));

        for source in sources.iter_mut() {
            self.dispatch_blocks(source, channels);

            let ratio_rate = source.block_info.front().map(|b| b.sample_rate).unwrap_or(sink_rate as u32);
            source.resampler.update(ratio_rate, sink_rate as u32);

            let mut scratch = vec![0.0f32; n_frames * channels.max(1)];
            if source.resampler.read(&mut scratch, n_frames).is_err() {
                source.underrun = true;
                self.events.push(Event::BufferUnderrun { id: source.source_id });
                continue;
            }
            let onset = source.block_info.front().map(|b| b.channel_onset).unwrap_or(0) as usize;
            for frame in 0..n_frames {
                for ch in 0..channels {
                    let dst_ch = onset + ch;
                    if dst_ch < channels {
                        output[frame * channels + dst_ch] += scratch[frame * channels + ch];
                    }
                }
            }
        }

        Ok(())
    }

    fn dispatch_blocks(&self, source: &mut SourceDescriptor, channels: usize) {
        let block_size = *self.block_size.read() as usize;
        loop {
            let complete = source.jitter.front_complete();
            let running_dry = source.resampler.buffered_frames() < source.resampler.free_space_frames() / 4;
            if !complete && !(source.jitter.len() > 1 && running_dry) {
                break;
            }

            // (sample_rate, channel_onset, decode_input) for this block,
            // or None once the jitter buffer has nothing left to give us.
            let decoded = if complete {
                let Some(received) = source.jitter.pop_front() else { break };
                let (sample_rate, channel_onset) = (received.sample_rate, received.channel_onset);
                let data = received.into_block().data;
                Some((sample_rate, channel_onset, Some(data)))
            } else {
                let Some(dropped) = source.jitter.drop_front_as_lost() else { break };
                self.events.push(Event::BlockDropped { id: source.source_id, sequence: dropped.sequence });
                Some((dropped.sample_rate, dropped.channel_onset, None))
            };

            let Some((sample_rate, channel_onset, data)) = decoded else { break };
            let mut samples = vec![0.0f32; block_size * channels.max(1)];
            if source.decoder.decode(data.as_deref(), &mut samples).is_ok() {
                let _ = source.resampler.write(&samples, block_size);
            }
            source.block_info.push_back(source_desc::BlockInfo { sample_rate, channel_onset });
            if source.block_info.len() > 1 {
                source.block_info.pop_front();
            }
        }
    }

    pub fn send(&self, send_fn: &mut SendFn) -> AooResult<()> {
        let resend_enabled = self.settings.read().resend_enabled;
        if !resend_enabled {
            return Ok(());
        }
        let resend_interval = self.settings.read().resend_interval;
        let resend_limit = self.settings.read().resend_limit;
        let now = NtpTime::now().to_seconds_f64();

        let mut sources = self.sources.write();
        for source in sources.iter_mut() {
            let requests = source.jitter.resend_scan(now, resend_interval, resend_limit, 64);
            if requests.is_empty() {
                continue;
            }
            let items: Vec<ResendItem> = requests.iter().map(|r| ResendItem { sequence: r.sequence, frame: r.frame }).collect();
            let msg = WireMessage::ResendRequest {
                sink_id: self.id,
                salt: source.salt,
                items,
            };
            let _ = send_fn(&msg.encode_osc(), &source.endpoint.address);
        }
        Ok(())
    }

    pub fn handle_message(&self, bytes: &[u8], addr: &[u8]) -> AooResult<()> {
        let msg = protocol::decode_any(bytes)?;
        match msg {
            WireMessage::FormatAnnounce { source_id, version, salt, format } => {
                if !protocol::check_version(version) {
                    return Err(AooError::BadArgument);
                }
                let decoder = self
                    .registry
                    .decoder_new(&format.codec_name, format.channels, format.sample_rate, format.block_size)
                    .map_err(|_| AooError::BadArgument)?;

                let mut sources = self.sources.write();
                if let Some(existing) = sources.iter_mut().find(|s| s.source_id == source_id) {
                    if existing.salt != salt {
                        existing.reset_for_new_stream(salt);
                    }
                    existing.decoder = decoder;
                } else {
                    let now = NtpTime::now().to_seconds_f64();
                    let mut desc = SourceDescriptor::new(Endpoint::new(addr.to_vec(), source_id), source_id, salt, decoder, now);
                    let block_size = *self.block_size.read();
                    desc.resampler
                        .setup(block_size as usize, block_size as usize, format.sample_rate, *self.sample_rate.read(), *self.channels.read() as usize);
                    sources.push(desc);
                    self.events.push(Event::SourceAdded { id: source_id });
                }
                Ok(())
            }
            WireMessage::Data { source_id, salt, packet } => {
                let mut sources = self.sources.write();
                let Some(source) = sources.iter_mut().find(|s| s.source_id == source_id) else {
                    return Err(AooError::NotFound);
                };
                if source.salt != salt {
                    source.reset_for_new_stream(salt);
                }
                source.last_packet_time = NtpTime::now().to_seconds_f64();
                source.jitter.handle_data(&packet);
                if source.state == StreamState::Idle {
                    source.state = StreamState::Buffering;
                }
                Ok(())
            }
            WireMessage::Ping { source_id, send_time } => {
                let now = NtpTime::now();
                let rtt = now.elapsed_since(send_time);
                self.events.push(Event::Ping { id: source_id, rtt_seconds: rtt });
                Ok(())
            }
            _ => Err(AooError::NotImplemented),
        }
    }

    pub fn poll_events(&self, out: &mut Vec<Event>, max: usize) -> usize {
        self.events.poll(out, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sink() -> Sink {
        let sink = Sink::new(1, CodecRegistry::with_builtins());
        sink.setup(48000, 64, 2).unwrap();
        sink
    }

    fn format_announce(source_id: Id, salt: u32) -> Vec<u8> {
        let format = crate::format::Format::new("pcm_float32", 2, 48000, 64);
        WireMessage::FormatAnnounce {
            source_id,
            version: protocol::PROTOCOL_VERSION,
            salt,
            format,
        }
        .encode_osc()
    }

    #[test]
    fn format_announce_registers_new_source() {
        let sink = make_sink();
        sink.handle_message(&format_announce(7, 111), &[1, 2, 3, 4]).unwrap();
        let mut events = Vec::new();
        sink.poll_events(&mut events, 10);
        assert!(events.iter().any(|e| matches!(e, Event::SourceAdded { id: 7 })));
    }

    #[test]
    fn data_for_unknown_source_errors() {
        let sink = make_sink();
        let msg = WireMessage::Data {
            source_id: 9,
            salt: 1,
            packet: crate::packet::DataPacket {
                sequence: 0,
                total_size: 4,
                frame_count: 1,
                frame_index: 0,
                channel_onset: 0,
                sample_rate: 48000,
                payload: vec![0, 0, 0, 0],
            },
        };
        assert!(sink.handle_message(&msg.encode_osc(), &[1]).is_err());
    }

    #[test]
    fn uninvite_all_clears_sources() {
        let sink = make_sink();
        sink.handle_message(&format_announce(3, 1), &[1]).unwrap();
        sink.uninvite_all();
        let msg = WireMessage::Data {
            source_id: 3,
            salt: 1,
            packet: crate::packet::DataPacket {
                sequence: 0,
                total_size: 4,
                frame_count: 1,
                frame_index: 0,
                channel_onset: 0,
                sample_rate: 48000,
                payload: vec![0, 0, 0, 0],
            },
        };
        assert!(sink.handle_message(&msg.encode_osc(), &[1]).is_err());
    }
}
