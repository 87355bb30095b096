//! Opus codec wrapper: encoder/decoder via `audiopus`, the safe binding to
//! libopus.

use super::{CodecError, CodecFactory, Decoder, Encoder};
use audiopus::coder::{Decoder as OpusDecoder, Encoder as OpusEncoder};
use audiopus::{Application, Bitrate, Channels, SampleRate};

fn to_channels(channels: u16) -> Result<Channels, CodecError> {
    match channels {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        _ => Err(CodecError::Other(format!("opus supports mono/stereo only, got {channels} channels"))),
    }
}

fn to_sample_rate(sample_rate: u32) -> Result<SampleRate, CodecError> {
    match sample_rate {
        8000 => Ok(SampleRate::Hz8000),
        12000 => Ok(SampleRate::Hz12000),
        16000 => Ok(SampleRate::Hz16000),
        24000 => Ok(SampleRate::Hz24000),
        48000 => Ok(SampleRate::Hz48000),
        other => Err(CodecError::Other(format!("unsupported opus sample rate: {other}"))),
    }
}

pub struct OpusCodec;

impl OpusCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OpusCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecFactory for OpusCodec {
    fn name(&self) -> &'static str {
        "opus"
    }

    fn encoder_new(&self, channels: u16, sample_rate: u32, block_size: u32) -> Result<Box<dyn Encoder>, CodecError> {
        let ch = to_channels(channels)?;
        let rate = to_sample_rate(sample_rate)?;
        let encoder = OpusEncoder::new(rate, ch, Application::Audio)
            .map_err(|e| CodecError::Other(format!("opus encoder init: {e}")))?;
        Ok(Box::new(OpusEncoderWrapper {
            encoder,
            channels: channels as usize,
            block_size: block_size as usize,
        }))
    }

    fn decoder_new(&self, channels: u16, sample_rate: u32, block_size: u32) -> Result<Box<dyn Decoder>, CodecError> {
        let ch = to_channels(channels)?;
        let rate = to_sample_rate(sample_rate)?;
        let decoder =
            OpusDecoder::new(rate, ch).map_err(|e| CodecError::Other(format!("opus decoder init: {e}")))?;
        Ok(Box::new(OpusDecoderWrapper {
            decoder,
            channels: channels as usize,
            block_size: block_size as usize,
        }))
    }
}

struct OpusEncoderWrapper {
    encoder: OpusEncoder,
    channels: usize,
    block_size: usize,
}

impl Encoder for OpusEncoderWrapper {
    fn encode(&mut self, samples: &[f32], output: &mut [u8]) -> Result<usize, CodecError> {
        let expected_samples = self.channels * self.block_size;
        if samples.len() < expected_samples {
            return Err(CodecError::InvalidInput);
        }
        self.encoder
            .encode_float(&samples[..expected_samples], output)
            .map_err(|e| match e {
                audiopus::Error::Opus(audiopus::ErrorCode::BufferTooSmall) => CodecError::BufferTooSmall,
                other => CodecError::Other(format!("opus encode: {other}")),
            })
    }

    fn reset(&mut self) {
        let _ = self.encoder.reset_state();
    }
}

impl OpusEncoderWrapper {
    #[allow(dead_code)]
    fn set_bitrate(&mut self, bits_per_second: i32) -> Result<(), CodecError> {
        self.encoder
            .set_bitrate(Bitrate::BitsPerSecond(bits_per_second))
            .map_err(|e| CodecError::Other(format!("opus set_bitrate: {e}")))
    }
}

struct OpusDecoderWrapper {
    decoder: OpusDecoder,
    channels: usize,
    block_size: usize,
}

impl Decoder for OpusDecoderWrapper {
    fn decode(&mut self, data: Option<&[u8]>, output: &mut [f32]) -> Result<usize, CodecError> {
        let expected_samples = self.channels * self.block_size;
        if output.len() < expected_samples {
            return Err(CodecError::BufferTooSmall);
        }
        let n = self
            .decoder
            .decode_float(data, &mut output[..expected_samples], false)
            .map_err(|e| CodecError::Other(format!("opus decode: {e}")))?;
        Ok(n * self.channels)
    }

    fn reset(&mut self) {
        let _ = self.decoder.reset_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_channel_count() {
        let codec = OpusCodec::new();
        assert!(codec.encoder_new(3, 48000, 960).is_err());
    }

    #[test]
    fn rejects_unsupported_sample_rate() {
        let codec = OpusCodec::new();
        assert!(codec.encoder_new(2, 44100, 960).is_err());
    }
}
