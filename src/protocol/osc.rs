//! Minimal OSC 1.0 message codec: address pattern + typetag string +
//! arguments, 4-byte aligned throughout.
//!
//! Only the argument types the wire protocol actually uses are supported:
//! `i` (int32), `f` (float32), `s` (string) and `b` (blob). Bundles are
//! out of scope — every message here is a single address pattern with its
//! argument list.

use crate::error::{AooError, AooResult};

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int32(i32),
    Float32(f32),
    String(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

fn pad4(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

fn write_osc_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    let padding = pad4(s.len() + 1);
    out.extend(std::iter::repeat(0u8).take(padding));
}

fn read_osc_string(data: &[u8]) -> AooResult<(String, usize)> {
    let nul = data.iter().position(|&b| b == 0).ok_or(AooError::InsufficientBuffer)?;
    let s = String::from_utf8_lossy(&data[..nul]).into_owned();
    let total = nul + 1 + pad4(nul + 1);
    if data.len() < total {
        return Err(AooError::InsufficientBuffer);
    }
    Ok((s, total))
}

fn write_osc_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
    out.extend_from_slice(bytes);
    let padding = pad4(bytes.len());
    out.extend(std::iter::repeat(0u8).take(padding));
}

fn read_osc_blob(data: &[u8]) -> AooResult<(Vec<u8>, usize)> {
    if data.len() < 4 {
        return Err(AooError::InsufficientBuffer);
    }
    let len = i32::from_be_bytes(data[0..4].try_into().unwrap()).max(0) as usize;
    if data.len() < 4 + len {
        return Err(AooError::InsufficientBuffer);
    }
    let bytes = data[4..4 + len].to_vec();
    let total = 4 + len + pad4(len);
    Ok((bytes, total))
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: OscArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_osc_string(&mut out, &self.address);

        let mut typetags = String::from(",");
        for arg in &self.args {
            typetags.push(match arg {
                OscArg::Int32(_) => 'i',
                OscArg::Float32(_) => 'f',
                OscArg::String(_) => 's',
                OscArg::Blob(_) => 'b',
            });
        }
        write_osc_string(&mut out, &typetags);

        for arg in &self.args {
            match arg {
                OscArg::Int32(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float32(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::String(s) => write_osc_string(&mut out, s),
                OscArg::Blob(b) => write_osc_blob(&mut out, b),
            }
        }
        out
    }

    pub fn decode(data: &[u8]) -> AooResult<Self> {
        let (address, consumed) = read_osc_string(data)?;
        let rest = &data[consumed..];
        let (typetags, consumed2) = read_osc_string(rest)?;
        let mut cursor = &rest[consumed2..];

        if !typetags.starts_with(',') {
            return Err(AooError::BadArgument);
        }

        let mut args = Vec::new();
        for tag in typetags[1..].chars() {
            match tag {
                'i' => {
                    if cursor.len() < 4 {
                        return Err(AooError::InsufficientBuffer);
                    }
                    let v = i32::from_be_bytes(cursor[0..4].try_into().unwrap());
                    args.push(OscArg::Int32(v));
                    cursor = &cursor[4..];
                }
                'f' => {
                    if cursor.len() < 4 {
                        return Err(AooError::InsufficientBuffer);
                    }
                    let v = f32::from_be_bytes(cursor[0..4].try_into().unwrap());
                    args.push(OscArg::Float32(v));
                    cursor = &cursor[4..];
                }
                's' => {
                    let (s, n) = read_osc_string(cursor)?;
                    args.push(OscArg::String(s));
                    cursor = &cursor[n..];
                }
                'b' => {
                    let (b, n) = read_osc_blob(cursor)?;
                    args.push(OscArg::Blob(b));
                    cursor = &cursor[n..];
                }
                _ => return Err(AooError::BadArgument),
            }
        }

        Ok(OscMessage { address, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_mixed_args() {
        let msg = OscMessage::new("/aoo/sink/1/ping")
            .arg(OscArg::Int32(42))
            .arg(OscArg::Float32(1.5))
            .arg(OscArg::String("hi".into()))
            .arg(OscArg::Blob(vec![1, 2, 3, 4, 5]));
        let encoded = msg.encode();
        assert_eq!(encoded.len() % 4, 0);
        let decoded = OscMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn empty_args_roundtrip() {
        let msg = OscMessage::new("/aoo/src/2/ping");
        let encoded = msg.encode();
        let decoded = OscMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_truncated_blob_fails() {
        let msg = OscMessage::new("/x").arg(OscArg::Blob(vec![1, 2, 3, 4]));
        let mut encoded = msg.encode();
        encoded.truncate(encoded.len() - 2);
        assert!(OscMessage::decode(&encoded).is_err());
    }
}
