//! Format descriptor: codec name, channel count, sample rate, block size
//! plus codec-specific tail bytes. Block size is samples per channel.
//! Validated at `set_format`/`setup` time by the owning codec.

use crate::error::{AooError, AooResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub codec_name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_size: u32,
    /// Codec-specific tail, produced by `AudioCodec::serialize_format`.
    pub tail: Vec<u8>,
}

impl Format {
    pub fn new(codec_name: impl Into<String>, channels: u16, sample_rate: u32, block_size: u32) -> Self {
        Self {
            codec_name: codec_name.into(),
            channels,
            sample_rate,
            block_size,
            tail: Vec::new(),
        }
    }

    pub fn validate(&self) -> AooResult<()> {
        if self.channels == 0 || self.sample_rate == 0 || self.block_size == 0 {
            return Err(AooError::BadArgument);
        }
        if self.codec_name.is_empty() {
            return Err(AooError::BadArgument);
        }
        Ok(())
    }

    /// Serialize the semantic fields (not the tail) into a wire-ready
    /// header, big-endian, as used by `/format` announce messages.
    pub fn serialize_header(&self, out: &mut Vec<u8>) {
        write_pascal_string(out, &self.codec_name);
        out.extend_from_slice(&self.channels.to_be_bytes());
        out.extend_from_slice(&self.sample_rate.to_be_bytes());
        out.extend_from_slice(&self.block_size.to_be_bytes());
        out.extend_from_slice(&(self.tail.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.tail);
    }

    pub fn deserialize_header(data: &[u8]) -> AooResult<(Self, usize)> {
        let mut cursor = 0usize;
        let (codec_name, consumed) = read_pascal_string(data)?;
        cursor += consumed;

        if data.len() < cursor + 4 + 4 + 4 + 4 {
            return Err(AooError::InsufficientBuffer);
        }
        let channels = u16::from_be_bytes([data[cursor], data[cursor + 1]]);
        cursor += 2;
        // channels is u16 but header reserves 2 bytes; keep layout simple
        let sample_rate = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let block_size = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let tail_len = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;

        if data.len() < cursor + tail_len {
            return Err(AooError::InsufficientBuffer);
        }
        let tail = data[cursor..cursor + tail_len].to_vec();
        cursor += tail_len;

        let format = Format {
            codec_name,
            channels,
            sample_rate,
            block_size,
            tail,
        };
        format.validate()?;
        Ok((format, cursor))
    }
}

fn write_pascal_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn read_pascal_string(data: &[u8]) -> AooResult<(String, usize)> {
    if data.len() < 4 {
        return Err(AooError::InsufficientBuffer);
    }
    let len = u32::from_be_bytes(data[0..4].try_into().unwrap()) as usize;
    if data.len() < 4 + len {
        return Err(AooError::InsufficientBuffer);
    }
    let s = String::from_utf8_lossy(&data[4..4 + len]).into_owned();
    Ok((s, 4 + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_deserialize_identity_on_semantic_fields() {
        let mut f = Format::new("pcm_f32", 2, 48000, 64);
        f.tail = vec![1, 2, 3, 4];
        let mut buf = Vec::new();
        f.serialize_header(&mut buf);
        let (parsed, consumed) = Format::deserialize_header(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed, f);
    }

    #[test]
    fn validate_rejects_zero_fields() {
        let f = Format::new("pcm_f32", 0, 48000, 64);
        assert!(f.validate().is_err());
    }
}
