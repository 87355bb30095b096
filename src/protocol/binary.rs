//! Compact binary framing: an alternative, non-OSC encoding for `/data`
//! messages, used when `binary_data_msg` is enabled. Distinguishable from
//! an OSC message on the wire because OSC addresses always start with
//! `/` (0x2F) and the binary header's first byte never does (the domain
//! bit is the top bit of a small type/command byte).

use crate::error::{AooError, AooResult};

const TYPE_BINARY_DATA: u8 = 0x01; // low 7 bits; bit7 reserved so first byte != b'/'
const FLAG_LARGE_IDS: u8 = 0b0000_0001;
const FLAG_HAS_SAMPLE_RATE: u8 = 0b0000_0010;
const FLAG_MULTI_FRAME: u8 = 0b0000_0100;

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryDataFrame {
    pub sink_id: u32,
    pub source_id: u32,
    pub salt: u32,
    pub sequence: u32,
    pub sample_rate: Option<u32>,
    pub channel_onset: u16,
    pub total_size: u32,
    pub frame_count: u32,
    pub frame_index: u32,
    pub payload: Vec<u8>,
}

fn ids_fit_small(a: u32, b: u32) -> bool {
    a <= u8::MAX as u32 && b <= u8::MAX as u32
}

impl BinaryDataFrame {
    pub fn encode(&self) -> Vec<u8> {
        let small = ids_fit_small(self.sink_id, self.source_id);
        let mut flags = 0u8;
        if !small {
            flags |= FLAG_LARGE_IDS;
        }
        if self.sample_rate.is_some() {
            flags |= FLAG_HAS_SAMPLE_RATE;
        }
        if self.frame_count > 1 {
            flags |= FLAG_MULTI_FRAME;
        }

        let mut out = Vec::with_capacity(32 + self.payload.len());
        out.push(TYPE_BINARY_DATA);
        out.push(flags);
        if small {
            out.push(self.sink_id as u8);
            out.push(self.source_id as u8);
        } else {
            out.extend_from_slice(&self.sink_id.to_be_bytes());
            out.extend_from_slice(&self.source_id.to_be_bytes());
        }
        out.extend_from_slice(&self.salt.to_be_bytes());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        if let Some(rate) = self.sample_rate {
            out.extend_from_slice(&rate.to_be_bytes());
        }
        out.extend_from_slice(&self.channel_onset.to_be_bytes());
        out.extend_from_slice(&self.total_size.to_be_bytes());
        if flags & FLAG_MULTI_FRAME != 0 {
            out.extend_from_slice(&self.frame_count.to_be_bytes());
            out.extend_from_slice(&self.frame_index.to_be_bytes());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> AooResult<Self> {
        if data.len() < 2 || data[0] != TYPE_BINARY_DATA {
            return Err(AooError::BadArgument);
        }
        let flags = data[1];
        let large_ids = flags & FLAG_LARGE_IDS != 0;
        let mut cursor = 2usize;

        let (sink_id, source_id) = if large_ids {
            if data.len() < cursor + 8 {
                return Err(AooError::InsufficientBuffer);
            }
            let sink = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
            let source = u32::from_be_bytes(data[cursor + 4..cursor + 8].try_into().unwrap());
            cursor += 8;
            (sink, source)
        } else {
            if data.len() < cursor + 2 {
                return Err(AooError::InsufficientBuffer);
            }
            let sink = data[cursor] as u32;
            let source = data[cursor + 1] as u32;
            cursor += 2;
            (sink, source)
        };

        if data.len() < cursor + 8 {
            return Err(AooError::InsufficientBuffer);
        }
        let salt = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;
        let sequence = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let sample_rate = if flags & FLAG_HAS_SAMPLE_RATE != 0 {
            if data.len() < cursor + 4 {
                return Err(AooError::InsufficientBuffer);
            }
            let rate = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            Some(rate)
        } else {
            None
        };

        if data.len() < cursor + 6 {
            return Err(AooError::InsufficientBuffer);
        }
        let channel_onset = u16::from_be_bytes(data[cursor..cursor + 2].try_into().unwrap());
        cursor += 2;
        let total_size = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let (frame_count, frame_index) = if flags & FLAG_MULTI_FRAME != 0 {
            if data.len() < cursor + 8 {
                return Err(AooError::InsufficientBuffer);
            }
            let count = u32::from_be_bytes(data[cursor..cursor + 4].try_into().unwrap());
            let index = u32::from_be_bytes(data[cursor + 4..cursor + 8].try_into().unwrap());
            cursor += 8;
            (count, index)
        } else {
            (1, 0)
        };

        let payload = data[cursor..].to_vec();

        Ok(BinaryDataFrame {
            sink_id,
            source_id,
            salt,
            sequence,
            sample_rate,
            channel_onset,
            total_size,
            frame_count,
            frame_index,
            payload,
        })
    }
}

/// Wrap a payload for relay forwarding: an address prefix (opaque,
/// host-defined) plus a big-endian length prefix. Unwrapping is the
/// inverse. The relayed payload itself is left untouched — this is pure
/// framing, not interpreted by the core.
pub fn wrap_relay(address_prefix: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(address_prefix.len() + 4 + payload.len());
    out.extend_from_slice(address_prefix);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn unwrap_relay(data: &[u8], address_prefix_len: usize) -> AooResult<(&[u8], &[u8])> {
    if data.len() < address_prefix_len + 4 {
        return Err(AooError::InsufficientBuffer);
    }
    let prefix = &data[..address_prefix_len];
    let len_bytes = &data[address_prefix_len..address_prefix_len + 4];
    let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
    let payload_start = address_prefix_len + 4;
    if data.len() < payload_start + len {
        return Err(AooError::InsufficientBuffer);
    }
    Ok((prefix, &data[payload_start..payload_start + len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> BinaryDataFrame {
        BinaryDataFrame {
            sink_id: 1,
            source_id: 2,
            salt: 999,
            sequence: 7,
            sample_rate: Some(48000),
            channel_onset: 0,
            total_size: 128,
            frame_count: 1,
            frame_index: 0,
            payload: vec![9, 9, 9, 9],
        }
    }

    #[test]
    fn roundtrip_small_ids_single_frame() {
        let frame = sample_frame();
        let encoded = frame.encode();
        assert_ne!(encoded[0], b'/');
        let decoded = BinaryDataFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn roundtrip_large_ids_multi_frame() {
        let mut frame = sample_frame();
        frame.sink_id = 1_000_000;
        frame.frame_count = 3;
        frame.frame_index = 1;
        let encoded = frame.encode();
        let decoded = BinaryDataFrame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_rejects_non_binary_header() {
        assert!(BinaryDataFrame::decode(b"/aoo/sink/1/data").is_err());
    }

    #[test]
    fn relay_wrap_unwrap_roundtrip() {
        let prefix = [1u8, 2, 3];
        let payload = b"hello aoo";
        let wrapped = wrap_relay(&prefix, payload);
        let (p, body) = unwrap_relay(&wrapped, prefix.len()).unwrap();
        assert_eq!(p, &prefix);
        assert_eq!(body, payload);
    }
}
