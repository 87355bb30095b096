//! Endpoint: a (socket address, id) pair. Addresses are opaque byte
//! strings — the core never parses them, it only compares and forwards
//! them to the host-provided send function.

use crate::error::AooError;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// 32-bit id with sentinel values for "wildcard" and "invalid".
pub type Id = u32;

pub const ID_WILDCARD: Id = 0xFFFF_FFFF;
pub const ID_INVALID: Id = 0xFFFF_FFFE;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Opaque address bytes, as supplied by the host transport.
    pub address: Vec<u8>,
    pub id: Id,
}

impl Endpoint {
    pub fn new(address: Vec<u8>, id: Id) -> Self {
        Self { address, id }
    }

    pub fn is_wildcard(&self) -> bool {
        self.id == ID_WILDCARD
    }

    pub fn matches(&self, other: &Endpoint) -> bool {
        self.address == other.address && (self.is_wildcard() || other.is_wildcard() || self.id == other.id)
    }
}

/// Signature for the host-provided send function: partial writes are
/// treated as errors and counted as send failures, never retried at the
/// UDP layer by the core.
pub type SendFn<'a> = dyn FnMut(&[u8], &[u8]) -> io::Result<usize> + 'a;

/// Convenience UDP transport for hosts that don't supply their own:
/// reuse-address, generous send/recv buffers, and a short read timeout
/// so the network thread can poll without blocking indefinitely.
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    pub fn bind(local: SocketAddr) -> Result<Self, AooError> {
        let domain = if local.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::DGRAM, Some(SockProtocol::UDP))
            .map_err(|_| AooError::BadArgument)?;
        socket.set_reuse_address(true).map_err(|_| AooError::BadArgument)?;
        socket.bind(&local.into()).map_err(|_| AooError::BadArgument)?;
        socket
            .set_read_timeout(Some(Duration::from_millis(10)))
            .map_err(|_| AooError::BadArgument)?;
        let _ = socket.set_recv_buffer_size(1024 * 1024);
        let _ = socket.set_send_buffer_size(1024 * 1024);
        Ok(Self { socket: socket.into() })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn send_to(&self, data: &[u8], addr: &[u8]) -> io::Result<usize> {
        let addr = decode_sock_addr(addr)?;
        self.socket.send_to(data, addr)
    }

    /// Non-blocking-ish receive (bounded by the read timeout set at bind
    /// time); returns `(len, encoded_addr)` or a `WouldBlock`/`TimedOut`
    /// error when nothing arrived within the timeout.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, Vec<u8>)> {
        match self.socket.recv_from(buf) {
            Ok((len, addr)) => Ok((len, encode_sock_addr(addr))),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => Err(e),
            Err(e) => Err(e),
        }
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
        })
    }
}

/// Encode a `SocketAddr` into the opaque byte form stored on `Endpoint`.
pub fn encode_sock_addr(addr: SocketAddr) -> Vec<u8> {
    match addr {
        SocketAddr::V4(v4) => {
            let mut out = vec![4u8];
            out.extend_from_slice(&v4.ip().octets());
            out.extend_from_slice(&v4.port().to_be_bytes());
            out
        }
        SocketAddr::V6(v6) => {
            let mut out = vec![6u8];
            out.extend_from_slice(&v6.ip().octets());
            out.extend_from_slice(&v6.port().to_be_bytes());
            out
        }
    }
}

pub fn decode_sock_addr(data: &[u8]) -> io::Result<SocketAddr> {
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
    match data.first() {
        Some(4) if data.len() == 7 => {
            let ip = Ipv4Addr::new(data[1], data[2], data[3], data[4]);
            let port = u16::from_be_bytes([data[5], data[6]]);
            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        Some(6) if data.len() == 19 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&data[1..17]);
            let port = u16::from_be_bytes([data[17], data[18]]);
            Ok(SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0)))
        }
        _ => Err(io::Error::new(ErrorKind::InvalidInput, "malformed endpoint address")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_any_id_same_address() {
        let a = Endpoint::new(vec![1, 2, 3], ID_WILDCARD);
        let b = Endpoint::new(vec![1, 2, 3], 42);
        assert!(a.matches(&b));
        assert!(b.matches(&a));
    }

    #[test]
    fn different_address_never_matches() {
        let a = Endpoint::new(vec![1], 1);
        let b = Endpoint::new(vec![2], 1);
        assert!(!a.matches(&b));
    }

    #[test]
    fn sock_addr_roundtrip() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let encoded = encode_sock_addr(addr);
        let decoded = decode_sock_addr(&encoded).unwrap();
        assert_eq!(addr, decoded);
    }
}
