//! End-to-end scenario 1: lossless loopback with PCM float32.
//!
//! A Source and a Sink, wired directly through an in-process "network"
//! (no sockets), at identical sample rate/block size/channel count. Feed
//! known sample blocks in and expect them back out bit-exact.

use aoo_core::time::NtpTime;
use aoo_core::{CodecRegistry, Endpoint, Format, Sink, Source};

const SAMPLE_RATE: u32 = 48000;
const BLOCK_SIZE: u32 = 64;
const CHANNELS: u16 = 2;
const SOURCE_ID: u32 = 1;
const SINK_ID: u32 = 2;

fn block_pattern(block_index: usize) -> Vec<f32> {
    (0..(BLOCK_SIZE as usize * CHANNELS as usize))
        .map(|i| ((block_index * 1000 + i) as f32 % 2000.0) / 2000.0 - 0.5)
        .collect()
}

#[test]
fn lossless_loopback_is_bit_exact() {
    let source = Source::new(SOURCE_ID, CodecRegistry::with_builtins());
    source.setup(SAMPLE_RATE, BLOCK_SIZE, CHANNELS).unwrap();
    source.set_format(Format::new("pcm_float32", CHANNELS, SAMPLE_RATE, BLOCK_SIZE)).unwrap();
    source.add_sink(Endpoint::new(b"sink".to_vec(), SINK_ID)).unwrap();

    let sink = Sink::new(SINK_ID, CodecRegistry::with_builtins());
    sink.setup(SAMPLE_RATE, BLOCK_SIZE, CHANNELS).unwrap();

    let block_period = BLOCK_SIZE as f64 / SAMPLE_RATE as f64;
    let mut now = 0.0;

    let mut collected_outputs: Vec<Vec<f32>> = Vec::new();
    let frame_len = BLOCK_SIZE as usize * CHANNELS as usize;

    const TOTAL_BLOCKS: usize = 10;
    const FLUSH_ITERATIONS: usize = 10;

    for i in 0..(TOTAL_BLOCKS + FLUSH_ITERATIONS) {
        now += block_period;
        let ntp = NtpTime::from_seconds_f64(now);

        if i < TOTAL_BLOCKS {
            let samples = block_pattern(i);
            source.process(&samples, BLOCK_SIZE as usize, ntp).unwrap();
        }

        let mut outbox: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        {
            let mut send_fn = |data: &[u8], addr: &[u8]| {
                outbox.push((data.to_vec(), addr.to_vec()));
                Ok(data.len())
            };
            source.send(&mut send_fn).unwrap();
        }
        for (data, _addr) in &outbox {
            let _ = sink.handle_message(data, b"source");
        }

        let mut output = vec![0.0f32; frame_len];
        sink.process(&mut output, BLOCK_SIZE as usize, ntp).unwrap();
        if output.iter().any(|&s| s != 0.0) {
            collected_outputs.push(output);
        }
    }

    assert_eq!(collected_outputs.len(), TOTAL_BLOCKS, "expected exactly 10 non-silent output blocks");
    for (i, output) in collected_outputs.iter().enumerate() {
        let expected = block_pattern(i);
        assert_eq!(output, &expected, "block {i} mismatch");
    }
}
