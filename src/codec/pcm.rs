//! PCM codec: int16/int24/float32/float64, big-endian on the wire
//! regardless of host endianness.
//!
//! Clamp-then-convert on encode, scale-then-convert on decode, one
//! generic `PcmCodec` factory parameterized on bit depth instead of one
//! struct per depth.

use super::{CodecError, CodecFactory, Decoder, Encoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmDepth {
    Int16,
    Int24,
    Float32,
    Float64,
}

impl PcmDepth {
    fn bytes_per_sample(self) -> usize {
        match self {
            PcmDepth::Int16 => 2,
            PcmDepth::Int24 => 3,
            PcmDepth::Float32 => 4,
            PcmDepth::Float64 => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            PcmDepth::Int16 => "pcm_int16",
            PcmDepth::Int24 => "pcm_int24",
            PcmDepth::Float32 => "pcm_float32",
            PcmDepth::Float64 => "pcm_float64",
        }
    }

    fn encode_sample(self, sample: f32, out: &mut [u8]) {
        match self {
            PcmDepth::Int16 => {
                let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                out[..2].copy_from_slice(&v.to_be_bytes());
            }
            PcmDepth::Int24 => {
                let v = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
                let bytes = v.to_be_bytes(); // 4 bytes, take the low 3
                out[0] = bytes[1];
                out[1] = bytes[2];
                out[2] = bytes[3];
            }
            PcmDepth::Float32 => {
                out[..4].copy_from_slice(&sample.to_be_bytes());
            }
            PcmDepth::Float64 => {
                out[..8].copy_from_slice(&(sample as f64).to_be_bytes());
            }
        }
    }

    fn decode_sample(self, data: &[u8]) -> f32 {
        match self {
            PcmDepth::Int16 => {
                let v = i16::from_be_bytes([data[0], data[1]]);
                v as f32 / i16::MAX as f32
            }
            PcmDepth::Int24 => {
                let sign = if data[0] & 0x80 != 0 { 0xFF } else { 0x00 };
                let v = i32::from_be_bytes([sign, data[0], data[1], data[2]]);
                v as f32 / 8_388_607.0
            }
            PcmDepth::Float32 => f32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            PcmDepth::Float64 => {
                let bytes: [u8; 8] = data[..8].try_into().unwrap();
                f64::from_be_bytes(bytes) as f32
            }
        }
    }
}

pub struct PcmCodec {
    depth: PcmDepth,
}

impl PcmCodec {
    pub fn int16() -> Self {
        Self { depth: PcmDepth::Int16 }
    }
    pub fn int24() -> Self {
        Self { depth: PcmDepth::Int24 }
    }
    pub fn float32() -> Self {
        Self { depth: PcmDepth::Float32 }
    }
    pub fn float64() -> Self {
        Self { depth: PcmDepth::Float64 }
    }
}

impl CodecFactory for PcmCodec {
    fn name(&self) -> &'static str {
        self.depth.name()
    }

    fn encoder_new(&self, channels: u16, _sample_rate: u32, block_size: u32) -> Result<Box<dyn Encoder>, CodecError> {
        Ok(Box::new(PcmEncoder {
            depth: self.depth,
            channels: channels as usize,
            block_size: block_size as usize,
        }))
    }

    fn decoder_new(&self, channels: u16, _sample_rate: u32, block_size: u32) -> Result<Box<dyn Decoder>, CodecError> {
        Ok(Box::new(PcmDecoder {
            depth: self.depth,
            channels: channels as usize,
            block_size: block_size as usize,
        }))
    }
}

struct PcmEncoder {
    depth: PcmDepth,
    channels: usize,
    block_size: usize,
}

impl Encoder for PcmEncoder {
    fn encode(&mut self, samples: &[f32], output: &mut [u8]) -> Result<usize, CodecError> {
        let expected_samples = self.channels * self.block_size;
        if samples.len() < expected_samples {
            return Err(CodecError::InvalidInput);
        }
        let bytes_per_sample = self.depth.bytes_per_sample();
        let bytes_needed = expected_samples * bytes_per_sample;
        if output.len() < bytes_needed {
            return Err(CodecError::BufferTooSmall);
        }
        for (i, &sample) in samples.iter().take(expected_samples).enumerate() {
            self.depth
                .encode_sample(sample, &mut output[i * bytes_per_sample..(i + 1) * bytes_per_sample]);
        }
        Ok(bytes_needed)
    }

    fn reset(&mut self) {}
}

struct PcmDecoder {
    depth: PcmDepth,
    channels: usize,
    block_size: usize,
}

impl Decoder for PcmDecoder {
    fn decode(&mut self, data: Option<&[u8]>, output: &mut [f32]) -> Result<usize, CodecError> {
        let expected_samples = self.channels * self.block_size;
        if output.len() < expected_samples {
            return Err(CodecError::BufferTooSmall);
        }

        let data = match data {
            None => {
                output[..expected_samples].fill(0.0);
                return Ok(expected_samples);
            }
            Some(d) => d,
        };

        let bytes_per_sample = self.depth.bytes_per_sample();
        let available_samples = (data.len() / bytes_per_sample).min(expected_samples);
        for i in 0..available_samples {
            output[i] = self.depth.decode_sample(&data[i * bytes_per_sample..(i + 1) * bytes_per_sample]);
        }
        for sample in output.iter_mut().take(expected_samples).skip(available_samples) {
            *sample = 0.0;
        }
        Ok(expected_samples)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(depth: PcmDepth, tolerance: f32) {
        let codec = PcmCodec { depth };
        let channels = 2u16;
        let block_size = 8u32;
        let mut encoder = codec.encoder_new(channels, 48000, block_size).unwrap();
        let mut decoder = codec.decoder_new(channels, 48000, block_size).unwrap();

        let input: Vec<f32> = (0..(channels as usize * block_size as usize))
            .map(|i| ((i as f32 / 16.0) - 0.5) * 0.9)
            .collect();
        let mut encoded = vec![0u8; input.len() * depth.bytes_per_sample()];
        let n = encoder.encode(&input, &mut encoded).unwrap();
        assert_eq!(n, encoded.len());

        let mut output = vec![0.0f32; input.len()];
        decoder.decode(Some(&encoded), &mut output).unwrap();

        for (a, b) in input.iter().zip(output.iter()) {
            assert!((a - b).abs() < tolerance, "{a} vs {b}");
        }
    }

    #[test]
    fn int16_roundtrip() {
        roundtrip(PcmDepth::Int16, 1.0 / 32767.0 * 2.0);
    }

    #[test]
    fn int24_roundtrip() {
        roundtrip(PcmDepth::Int24, 1.0 / 8_388_607.0 * 2.0);
    }

    #[test]
    fn float32_roundtrip_exact() {
        roundtrip(PcmDepth::Float32, 1e-9);
    }

    #[test]
    fn float64_roundtrip_exact() {
        roundtrip(PcmDepth::Float64, 1e-6);
    }

    #[test]
    fn none_input_produces_silence() {
        let codec = PcmCodec::float32();
        let mut decoder = codec.decoder_new(2, 48000, 4).unwrap();
        let mut output = vec![1.0f32; 8];
        let n = decoder.decode(None, &mut output).unwrap();
        assert_eq!(n, 8);
        assert!(output.iter().all(|&s| s == 0.0));
    }
}
