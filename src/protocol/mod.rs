//! Wire protocol: OSC address patterns + binary alternative framing, tied
//! to the core's domain messages.

pub mod binary;
pub mod osc;

use crate::endpoint::{Id, ID_WILDCARD};
use crate::error::{AooError, AooResult};
use crate::format::Format;
use crate::packet::DataPacket;
use crate::time::NtpTime;
use binary::BinaryDataFrame;
use osc::{OscArg, OscMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

pub const PROTOCOL_VERSION: Version = Version { major: 2, minor: 0, patch: 0 };

impl Version {
    fn pack(self) -> i32 {
        ((self.major as i32) << 16) | ((self.minor as i32) << 8) | self.patch as i32
    }

    fn unpack(v: i32) -> Self {
        Version {
            major: ((v >> 16) & 0xFF) as u8,
            minor: ((v >> 8) & 0xFF) as u8,
            patch: (v & 0xFF) as u8,
        }
    }
}

/// Major-version mismatch rejects; minor/patch differences are accepted.
/// No added handshake beyond that — a stricter reimplementation could
/// extend this, but nothing in the wire messages themselves asks for one.
pub fn check_version(remote: Version) -> bool {
    remote.major == PROTOCOL_VERSION.major
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResendItem {
    pub sequence: u32,
    /// -1 requests the whole block.
    pub frame: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    FormatRequest { source_id: Id },
    FormatAnnounce { source_id: Id, version: Version, salt: u32, format: Format },
    Data { source_id: Id, salt: u32, packet: DataPacket },
    ResendRequest { sink_id: Id, salt: u32, items: Vec<ResendItem> },
    Ping { source_id: Id, send_time: NtpTime },
    Invite { sink_id: Id, token: u32 },
    Uninvite { sink_id: Id },
}

fn id_token(id: Id) -> String {
    if id == ID_WILDCARD {
        "*".to_string()
    } else {
        id.to_string()
    }
}

fn parse_id_token(token: &str) -> AooResult<Id> {
    if token == "*" {
        return Ok(ID_WILDCARD);
    }
    token.parse::<Id>().map_err(|_| AooError::BadArgument)
}

/// Split an address of the form `/aoo/<role>/<id>/<verb>` into its parts.
fn split_address(address: &str) -> AooResult<(&str, &str, &str)> {
    let mut parts = address.trim_start_matches('/').splitn(4, '/');
    let aoo = parts.next().ok_or(AooError::BadArgument)?;
    let role = parts.next().ok_or(AooError::BadArgument)?;
    let id_part = parts.next().ok_or(AooError::BadArgument)?;
    let verb = parts.next().ok_or(AooError::BadArgument)?;
    if aoo != "aoo" {
        return Err(AooError::BadArgument);
    }
    Ok((role, id_part, verb))
}

fn ntp_to_blob(t: NtpTime) -> Vec<u8> {
    t.0.to_be_bytes().to_vec()
}

fn ntp_from_blob(b: &[u8]) -> AooResult<NtpTime> {
    let bytes: [u8; 8] = b.try_into().map_err(|_| AooError::BadArgument)?;
    Ok(NtpTime(u64::from_be_bytes(bytes)))
}

impl WireMessage {
    pub fn encode_osc(&self) -> Vec<u8> {
        match self {
            WireMessage::FormatRequest { source_id } => {
                OscMessage::new(format!("/aoo/src/{}/format", id_token(*source_id))).encode()
            }
            WireMessage::FormatAnnounce { source_id, version, salt, format } => {
                let mut header = Vec::new();
                format.serialize_header(&mut header);
                OscMessage::new(format!("/aoo/sink/{}/format", id_token(*source_id)))
                    .arg(OscArg::Int32(version.pack()))
                    .arg(OscArg::Int32(*salt as i32))
                    .arg(OscArg::Blob(header))
                    .encode()
            }
            WireMessage::Data { source_id, salt, packet } => OscMessage::new(format!("/aoo/sink/{}/data", id_token(*source_id)))
                .arg(OscArg::Int32(*salt as i32))
                .arg(OscArg::Int32(packet.sequence as i32))
                .arg(OscArg::Int32(packet.sample_rate as i32))
                .arg(OscArg::Int32(packet.channel_onset as i32))
                .arg(OscArg::Int32(packet.total_size as i32))
                .arg(OscArg::Int32(packet.frame_count as i32))
                .arg(OscArg::Int32(packet.frame_index as i32))
                .arg(OscArg::Blob(packet.payload.clone()))
                .encode(),
            WireMessage::ResendRequest { sink_id, salt, items } => {
                let mut msg = OscMessage::new(format!("/aoo/src/{}/data", id_token(*sink_id))).arg(OscArg::Int32(*salt as i32));
                for item in items {
                    msg = msg.arg(OscArg::Int32(item.sequence as i32)).arg(OscArg::Int32(item.frame));
                }
                msg.encode()
            }
            WireMessage::Ping { source_id, send_time } => OscMessage::new(format!("/aoo/sink/{}/ping", id_token(*source_id)))
                .arg(OscArg::Blob(ntp_to_blob(*send_time)))
                .encode(),
            WireMessage::Invite { sink_id, token } => OscMessage::new(format!("/aoo/src/{}/invite", id_token(*sink_id)))
                .arg(OscArg::Int32(*token as i32))
                .encode(),
            WireMessage::Uninvite { sink_id } => OscMessage::new(format!("/aoo/src/{}/uninvite", id_token(*sink_id))).encode(),
        }
    }

    pub fn decode_osc(data: &[u8]) -> AooResult<Self> {
        let msg = OscMessage::decode(data)?;
        let (role, id_part, verb) = split_address(&msg.address)?;
        let id = parse_id_token(id_part)?;

        match (role, verb) {
            ("src", "format") => Ok(WireMessage::FormatRequest { source_id: id }),
            ("sink", "format") => {
                let [OscArg::Int32(version), OscArg::Int32(salt), OscArg::Blob(header)] = msg.args.as_slice() else {
                    return Err(AooError::BadArgument);
                };
                let (format, _) = Format::deserialize_header(header)?;
                Ok(WireMessage::FormatAnnounce {
                    source_id: id,
                    version: Version::unpack(*version),
                    salt: *salt as u32,
                    format,
                })
            }
            ("sink", "data") => {
                if msg.args.len() != 8 {
                    return Err(AooError::BadArgument);
                }
                let ints: AooResult<Vec<i32>> = msg.args[..7]
                    .iter()
                    .map(|a| match a {
                        OscArg::Int32(v) => Ok(*v),
                        _ => Err(AooError::BadArgument),
                    })
                    .collect();
                let ints = ints?;
                let payload = match &msg.args[7] {
                    OscArg::Blob(b) => b.clone(),
                    _ => return Err(AooError::BadArgument),
                };
                Ok(WireMessage::Data {
                    source_id: id,
                    salt: ints[0] as u32,
                    packet: DataPacket {
                        sequence: ints[1] as u32,
                        sample_rate: ints[2] as u32,
                        channel_onset: ints[3] as u16,
                        total_size: ints[4] as u32,
                        frame_count: ints[5] as u32,
                        frame_index: ints[6] as u32,
                        payload,
                    },
                })
            }
            ("src", "data") => {
                if msg.args.is_empty() || msg.args.len() % 2 != 1 {
                    return Err(AooError::BadArgument);
                }
                let salt = match msg.args[0] {
                    OscArg::Int32(v) => v as u32,
                    _ => return Err(AooError::BadArgument),
                };
                let mut items = Vec::new();
                for pair in msg.args[1..].chunks_exact(2) {
                    let (seq, frame) = match (&pair[0], &pair[1]) {
                        (OscArg::Int32(s), OscArg::Int32(f)) => (*s as u32, *f),
                        _ => return Err(AooError::BadArgument),
                    };
                    items.push(ResendItem { sequence: seq, frame });
                }
                Ok(WireMessage::ResendRequest { sink_id: id, salt, items })
            }
            ("sink", "ping") => {
                let [OscArg::Blob(b)] = msg.args.as_slice() else {
                    return Err(AooError::BadArgument);
                };
                Ok(WireMessage::Ping { source_id: id, send_time: ntp_from_blob(b)? })
            }
            ("src", "invite") => {
                let [OscArg::Int32(token)] = msg.args.as_slice() else {
                    return Err(AooError::BadArgument);
                };
                Ok(WireMessage::Invite { sink_id: id, token: *token as u32 })
            }
            ("src", "uninvite") => Ok(WireMessage::Uninvite { sink_id: id }),
            _ => Err(AooError::NotImplemented),
        }
    }
}

/// Decode either wire encoding; OSC messages always start with `/`, the
/// binary header's first byte never does.
pub fn decode_any(data: &[u8]) -> AooResult<WireMessage> {
    if data.first() == Some(&b'/') {
        WireMessage::decode_osc(data)
    } else {
        let frame = BinaryDataFrame::decode(data)?;
        Ok(WireMessage::Data {
            source_id: frame.source_id,
            salt: frame.salt,
            packet: DataPacket {
                sequence: frame.sequence,
                sample_rate: frame.sample_rate.unwrap_or(0),
                channel_onset: frame.channel_onset,
                total_size: frame.total_size,
                frame_count: frame.frame_count,
                frame_index: frame.frame_index,
                payload: frame.payload,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_check_ignores_minor_patch() {
        let remote = Version { major: 2, minor: 9, patch: 9 };
        assert!(check_version(remote));
        let remote = Version { major: 1, minor: 0, patch: 0 };
        assert!(!check_version(remote));
    }

    #[test]
    fn format_request_roundtrip() {
        let msg = WireMessage::FormatRequest { source_id: 7 };
        let encoded = msg.encode_osc();
        let decoded = WireMessage::decode_osc(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn format_announce_roundtrip() {
        let format = Format::new("pcm_int16", 2, 48000, 64);
        let msg = WireMessage::FormatAnnounce {
            source_id: 3,
            version: PROTOCOL_VERSION,
            salt: 555,
            format,
        };
        let encoded = msg.encode_osc();
        let decoded = WireMessage::decode_osc(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn data_message_roundtrip() {
        let msg = WireMessage::Data {
            source_id: 1,
            salt: 42,
            packet: DataPacket {
                sequence: 9,
                sample_rate: 48000,
                channel_onset: 0,
                total_size: 16,
                frame_count: 1,
                frame_index: 0,
                payload: vec![1, 2, 3, 4],
            },
        };
        let encoded = msg.encode_osc();
        let decoded = WireMessage::decode_osc(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn resend_request_roundtrip_with_multiple_items() {
        let msg = WireMessage::ResendRequest {
            sink_id: 4,
            salt: 100,
            items: vec![ResendItem { sequence: 1, frame: -1 }, ResendItem { sequence: 2, frame: 3 }],
        };
        let encoded = msg.encode_osc();
        let decoded = WireMessage::decode_osc(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn wildcard_address_parses_to_wildcard_id() {
        let msg = WireMessage::Uninvite { sink_id: ID_WILDCARD };
        let encoded = msg.encode_osc();
        let decoded = WireMessage::decode_osc(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_any_dispatches_binary_vs_osc() {
        let binary_frame = BinaryDataFrame {
            sink_id: 1,
            source_id: 2,
            salt: 3,
            sequence: 4,
            sample_rate: Some(48000),
            channel_onset: 0,
            total_size: 4,
            frame_count: 1,
            frame_index: 0,
            payload: vec![9, 9, 9, 9],
        };
        let encoded = binary_frame.encode();
        let decoded = decode_any(&encoded).unwrap();
        assert!(matches!(decoded, WireMessage::Data { .. }));

        let osc_msg = WireMessage::FormatRequest { source_id: 5 };
        let encoded = osc_msg.encode_osc();
        let decoded = decode_any(&encoded).unwrap();
        assert_eq!(decoded, osc_msg);
    }
}
