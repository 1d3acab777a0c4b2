//! Shared wire types: MAC addresses, community names, the socket wire
//! form, and the byte cursors all codecs are built on.
//!
//! Socket wire form:
//!   [u16: family (0x0000 = IPv4, 0x8000 = IPv6)]
//!   [u16: UDP port]
//!   [4 or 16 address bytes]
//!
//! Ports are host byte order in memory (`SocketAddr`) and network byte
//! order on the wire; the conversion happens here and nowhere else.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::WireError;

/// Largest datagram the protocol ever sends or accepts.
pub const PACKET_BUF_SIZE: usize = 2048;

/// Edge protocol version carried in the common header.
pub const PROTOCOL_VERSION: u8 = 2;

pub const MAC_SIZE: usize = 6;
pub const COMMUNITY_SIZE: usize = 16;
pub const COOKIE_SIZE: usize = 4;
pub const AUTH_TOKEN_SIZE: usize = 4;

/// Socket wire form family selector.
pub const FAMILY_V4: u16 = 0x0000;
pub const FAMILY_V6: u16 = 0x8000;

/// An Ethernet MAC address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac(pub [u8; MAC_SIZE]);

impl Mac {
    pub const BROADCAST: Mac = Mac([0xff; MAC_SIZE]);

    /// True for broadcast and multicast destinations (group bit set,
    /// which also covers ff:ff:ff:ff:ff:ff).
    pub fn is_multi_broadcast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({self})")
    }
}

/// A community name: 16 bytes, null-padded, compared by full width.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Community(pub [u8; COMMUNITY_SIZE]);

impl Community {
    /// Build from a string, null-padding to full width.
    pub fn from_name(name: &str) -> Result<Self, WireError> {
        let bytes = name.as_bytes();
        if bytes.len() > COMMUNITY_SIZE {
            return Err(WireError::CommunityTooLong(bytes.len()));
        }
        let mut buf = [0u8; COMMUNITY_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Community(buf))
    }

    /// The name with trailing padding stripped.
    pub fn name(&self) -> String {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |p| p + 1);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Community({self})")
    }
}

// Communities persist in the coordinator state files as plain names.
impl Serialize for Community {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for Community {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Community::from_name(&s).map_err(serde::de::Error::custom)
    }
}

/// Decoding cursor over a received datagram.
///
/// Every read checks the remainder first; a read that would pass the
/// end of the buffer fails with [`WireError::Truncated`] and nothing
/// is ever read beyond the declared size.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The unconsumed remainder of the datagram.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn mac(&mut self) -> Result<Mac, WireError> {
        Ok(Mac(self.array()?))
    }

    pub fn community(&mut self) -> Result<Community, WireError> {
        Ok(Community(self.array()?))
    }

    /// Decode a socket in wire form.
    pub fn sock(&mut self) -> Result<SocketAddr, WireError> {
        let family = self.u16()?;
        let port = self.u16()?;
        let ip: IpAddr = match family {
            FAMILY_V4 => Ipv4Addr::from(self.array::<4>()?).into(),
            FAMILY_V6 => Ipv6Addr::from(self.array::<16>()?).into(),
            other => return Err(WireError::UnknownAddressFamily(other)),
        };
        Ok(SocketAddr::new(ip, port))
    }
}

/// Encoding cursor. Encoders append; the finished buffer is taken with
/// [`Encoder::into_bytes`].
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(PACKET_BUF_SIZE),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn mac(&mut self, v: &Mac) {
        self.bytes(&v.0);
    }

    pub fn community(&mut self, v: &Community) {
        self.bytes(&v.0);
    }

    /// Encode a socket in wire form.
    pub fn sock(&mut self, addr: &SocketAddr) {
        match addr {
            SocketAddr::V4(v4) => {
                self.u16(FAMILY_V4);
                self.u16(v4.port());
                self.bytes(&v4.ip().octets());
            }
            SocketAddr::V6(v6) => {
                self.u16(FAMILY_V6);
                self.u16(v6.port());
                self.bytes(&v6.ip().octets());
            }
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_multi_broadcast() {
        assert!(Mac::BROADCAST.is_multi_broadcast());
        assert!(Mac([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]).is_multi_broadcast());
        assert!(!Mac([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]).is_multi_broadcast());
    }

    #[test]
    fn mac_display() {
        let mac = Mac([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn community_padding_roundtrip() {
        let c = Community::from_name("acme").unwrap();
        assert_eq!(c.0[..4], *b"acme");
        assert!(c.0[4..].iter().all(|&b| b == 0));
        assert_eq!(c.name(), "acme");
    }

    #[test]
    fn community_full_width_compare() {
        let a = Community::from_name("acme").unwrap();
        let mut b = a;
        b.0[15] = 1; // trailing byte differs — different community
        assert_ne!(a, b);
    }

    #[test]
    fn community_too_long_rejected() {
        assert!(Community::from_name("seventeen-bytes!!").is_err());
        assert!(Community::from_name("sixteen-bytes-ok").is_ok());
    }

    #[test]
    fn sock_roundtrip_v4() {
        let addr: SocketAddr = "10.0.0.1:40000".parse().unwrap();
        let mut enc = Encoder::new();
        enc.sock(&addr);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 8);
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.sock().unwrap(), addr);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn sock_roundtrip_v6() {
        let addr: SocketAddr = "[2001:db8::1]:7654".parse().unwrap();
        let mut enc = Encoder::new();
        enc.sock(&addr);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 20);
        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.sock().unwrap(), addr);
    }

    #[test]
    fn sock_unknown_family_rejected() {
        let bytes = [0x40, 0x00, 0x1f, 0x90, 10, 0, 0, 1];
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            dec.sock(),
            Err(WireError::UnknownAddressFamily(0x4000))
        ));
    }

    #[test]
    fn truncated_reads_fail() {
        let bytes = [0x01, 0x02];
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.u32(), Err(WireError::Truncated)));
        // The failed read consumed nothing.
        assert_eq!(dec.remaining(), 2);
        assert_eq!(dec.u16().unwrap(), 0x0102);
    }
}
