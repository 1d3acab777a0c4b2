//! Edge protocol framing: the common header and the message bodies
//! exchanged between edges and the supernode.
//!
//! Common header (20 bytes, all integers network byte order):
//!   [u8: version (high nibble, must be 2) | TTL (low nibble)]
//!   [u8: packet code]
//!   [u16: flags]
//!   [16 bytes: community name, null padded]
//!
//! PACKET and REGISTER carry an originating socket only when the
//! `FLAG_SOCKET` bit is set. A PACKET's payload is everything after the
//! decoded fields; it is opaque to the supernode and is appended by the
//! caller after encoding the header.

use std::net::SocketAddr;

use crate::error::WireError;
use crate::types::{
    Community, Decoder, Encoder, Mac, AUTH_TOKEN_SIZE, COOKIE_SIZE, PROTOCOL_VERSION,
};

/// Set when the packet was forwarded by a supernode.
pub const FLAG_FROM_SUPERNODE: u16 = 0x0020;
/// Set when the body carries an originating socket field.
pub const FLAG_SOCKET: u16 = 0x0040;

/// Hop budget for packets the supernode itself originates.
pub const DEFAULT_TTL: u8 = 2;

/// Edge protocol packet codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketCode {
    Ping = 0,
    Register = 1,
    Deregister = 2,
    Packet = 3,
    RegisterAck = 4,
    RegisterSuper = 5,
    RegisterSuperAck = 6,
    RegisterSuperNak = 7,
    Federation = 8,
}

impl TryFrom<u8> for PacketCode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ping),
            1 => Ok(Self::Register),
            2 => Ok(Self::Deregister),
            3 => Ok(Self::Packet),
            4 => Ok(Self::RegisterAck),
            5 => Ok(Self::RegisterSuper),
            6 => Ok(Self::RegisterSuperAck),
            7 => Ok(Self::RegisterSuperNak),
            8 => Ok(Self::Federation),
            other => Err(WireError::UnknownPacketCode(other)),
        }
    }
}

/// The header present on every edge-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonHeader {
    pub ttl: u8,
    pub pc: PacketCode,
    pub flags: u16,
    pub community: Community,
}

impl CommonHeader {
    pub fn new(pc: PacketCode, flags: u16, community: Community) -> Self {
        Self {
            ttl: DEFAULT_TTL,
            pc,
            flags,
            community,
        }
    }

    pub fn from_supernode(&self) -> bool {
        self.flags & FLAG_FROM_SUPERNODE != 0
    }

    pub fn has_socket(&self) -> bool {
        self.flags & FLAG_SOCKET != 0
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.u8((PROTOCOL_VERSION << 4) | (self.ttl & 0x0f));
        enc.u8(self.pc as u8);
        enc.u16(self.flags);
        enc.community(&self.community);
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let vt = dec.u8()?;
        let version = vt >> 4;
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let ttl = vt & 0x0f;
        let pc = PacketCode::try_from(dec.u8()?)?;
        let flags = dec.u16()?;
        let community = dec.community()?;
        Ok(Self {
            ttl,
            pc,
            flags,
            community,
        })
    }
}

/// Patch the TTL nibble of an already-encoded datagram in place.
///
/// Used when a supernode-sourced packet is forwarded byte-identically
/// apart from its decremented hop count.
pub fn patch_ttl(buf: &mut [u8], ttl: u8) {
    if let Some(b) = buf.first_mut() {
        *b = (*b & 0xf0) | (ttl & 0x0f);
    }
}

/// A tunneled Ethernet frame. The payload follows the encoded fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src_mac: Mac,
    pub dst_mac: Mac,
    pub sock: Option<SocketAddr>,
}

impl Packet {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.mac(&self.src_mac);
        enc.mac(&self.dst_mac);
        if let Some(sock) = &self.sock {
            enc.sock(sock);
        }
    }

    pub fn decode(hdr: &CommonHeader, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let src_mac = dec.mac()?;
        let dst_mac = dec.mac()?;
        let sock = if hdr.has_socket() {
            Some(dec.sock()?)
        } else {
            None
        };
        Ok(Self {
            src_mac,
            dst_mac,
            sock,
        })
    }
}

/// Edge-to-edge registration, relayed through the supernode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub cookie: [u8; COOKIE_SIZE],
    pub src_mac: Mac,
    pub dst_mac: Mac,
    pub sock: Option<SocketAddr>,
}

impl Register {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.bytes(&self.cookie);
        enc.mac(&self.src_mac);
        enc.mac(&self.dst_mac);
        if let Some(sock) = &self.sock {
            enc.sock(sock);
        }
    }

    pub fn decode(hdr: &CommonHeader, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let cookie = dec.array()?;
        let src_mac = dec.mac()?;
        let dst_mac = dec.mac()?;
        let sock = if hdr.has_socket() {
            Some(dec.sock()?)
        } else {
            None
        };
        Ok(Self {
            cookie,
            src_mac,
            dst_mac,
            sock,
        })
    }
}

/// Edge-to-supernode registration request.
///
/// The auth token is opaque to the supernode and is not echoed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSuper {
    pub cookie: [u8; COOKIE_SIZE],
    pub edge_mac: Mac,
    pub auth: [u8; AUTH_TOKEN_SIZE],
}

impl RegisterSuper {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.bytes(&self.cookie);
        enc.mac(&self.edge_mac);
        enc.bytes(&self.auth);
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            cookie: dec.array()?,
            edge_mac: dec.mac()?,
            auth: dec.array()?,
        })
    }
}

/// Supernode's answer to [`RegisterSuper`]: the echoed cookie and MAC,
/// the registration lifetime, the edge's externally observed socket,
/// and a (possibly empty) list of backup supernodes serving the
/// community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSuperAck {
    pub cookie: [u8; COOKIE_SIZE],
    pub edge_mac: Mac,
    pub lifetime: u16,
    pub sock: SocketAddr,
    pub backups: Vec<SocketAddr>,
}

impl RegisterSuperAck {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.bytes(&self.cookie);
        enc.mac(&self.edge_mac);
        enc.u16(self.lifetime);
        enc.sock(&self.sock);
        // num_sn is a single byte; longer lists truncate silently.
        let n = self.backups.len().min(u8::MAX as usize);
        enc.u8(n as u8);
        for sn in &self.backups[..n] {
            enc.sock(sn);
        }
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let cookie = dec.array()?;
        let edge_mac = dec.mac()?;
        let lifetime = dec.u16()?;
        let sock = dec.sock()?;
        let num_sn = dec.u8()?;
        let mut backups = Vec::with_capacity(num_sn as usize);
        for _ in 0..num_sn {
            backups.push(dec.sock()?);
        }
        Ok(Self {
            cookie,
            edge_mac,
            lifetime,
            sock,
            backups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Community {
        Community::from_name("acme").unwrap()
    }

    #[test]
    fn common_header_roundtrip() {
        let hdr = CommonHeader {
            ttl: 7,
            pc: PacketCode::Packet,
            flags: FLAG_SOCKET | FLAG_FROM_SUPERNODE,
            community: acme(),
        };
        let mut enc = Encoder::new();
        hdr.encode(&mut enc);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 20);

        let decoded = CommonHeader::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, hdr);

        // Re-encoding is bit identical.
        let mut enc2 = Encoder::new();
        decoded.encode(&mut enc2);
        assert_eq!(enc2.into_bytes(), bytes);
    }

    #[test]
    fn bad_version_rejected() {
        let mut enc = Encoder::new();
        CommonHeader::new(PacketCode::Ping, 0, acme()).encode(&mut enc);
        let mut bytes = enc.into_bytes();
        bytes[0] = (3 << 4) | (bytes[0] & 0x0f);
        assert!(matches!(
            CommonHeader::decode(&mut Decoder::new(&bytes)),
            Err(WireError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn unknown_packet_code_rejected() {
        let mut enc = Encoder::new();
        CommonHeader::new(PacketCode::Ping, 0, acme()).encode(&mut enc);
        let mut bytes = enc.into_bytes();
        bytes[1] = 9;
        assert!(matches!(
            CommonHeader::decode(&mut Decoder::new(&bytes)),
            Err(WireError::UnknownPacketCode(9))
        ));
    }

    #[test]
    fn packet_sock_follows_flag() {
        let with_sock = CommonHeader::new(PacketCode::Packet, FLAG_SOCKET, acme());
        let without = CommonHeader::new(PacketCode::Packet, 0, acme());
        let pkt = Packet {
            src_mac: Mac([0xaa; 6]),
            dst_mac: Mac([0xbb; 6]),
            sock: Some("10.0.0.1:40000".parse().unwrap()),
        };
        let mut enc = Encoder::new();
        pkt.encode(&mut enc);
        let bytes = enc.into_bytes();

        let decoded = Packet::decode(&with_sock, &mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, pkt);

        // Without the flag the sock field is not consumed.
        let decoded = Packet::decode(&without, &mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded.sock, None);
    }

    #[test]
    fn packet_payload_stays_opaque() {
        let hdr = CommonHeader::new(PacketCode::Packet, 0, acme());
        let pkt = Packet {
            src_mac: Mac([0xaa; 6]),
            dst_mac: Mac([0xbb; 6]),
            sock: None,
        };
        let mut enc = Encoder::new();
        hdr.encode(&mut enc);
        pkt.encode(&mut enc);
        enc.bytes(b"hi");
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        let hdr = CommonHeader::decode(&mut dec).unwrap();
        let _ = Packet::decode(&hdr, &mut dec).unwrap();
        assert_eq!(dec.rest(), b"hi");
    }

    #[test]
    fn register_roundtrip() {
        let hdr = CommonHeader::new(PacketCode::Register, FLAG_SOCKET, acme());
        let reg = Register {
            cookie: [1, 2, 3, 4],
            src_mac: Mac([0xaa; 6]),
            dst_mac: Mac([0xbb; 6]),
            sock: Some("[2001:db8::2]:40000".parse().unwrap()),
        };
        let mut enc = Encoder::new();
        reg.encode(&mut enc);
        let bytes = enc.into_bytes();
        let decoded = Register::decode(&hdr, &mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, reg);
    }

    #[test]
    fn register_super_roundtrip() {
        let reg = RegisterSuper {
            cookie: [0xde, 0xad, 0xbe, 0xef],
            edge_mac: Mac([1, 2, 3, 4, 5, 6]),
            auth: [0; 4],
        };
        let mut enc = Encoder::new();
        reg.encode(&mut enc);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 14);
        let decoded = RegisterSuper::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, reg);
    }

    #[test]
    fn register_super_truncated() {
        let reg = RegisterSuper {
            cookie: [0xde, 0xad, 0xbe, 0xef],
            edge_mac: Mac([1, 2, 3, 4, 5, 6]),
            auth: [0; 4],
        };
        let mut enc = Encoder::new();
        reg.encode(&mut enc);
        let bytes = enc.into_bytes();
        assert!(matches!(
            RegisterSuper::decode(&mut Decoder::new(&bytes[..bytes.len() - 1])),
            Err(WireError::Truncated)
        ));
    }

    #[test]
    fn register_super_ack_roundtrip() {
        let ack = RegisterSuperAck {
            cookie: [0xde, 0xad, 0xbe, 0xef],
            edge_mac: Mac([1, 2, 3, 4, 5, 6]),
            lifetime: 120,
            sock: "10.0.0.1:40000".parse().unwrap(),
            backups: vec![
                "192.0.2.1:7654".parse().unwrap(),
                "[2001:db8::1]:7654".parse().unwrap(),
            ],
        };
        let mut enc = Encoder::new();
        ack.encode(&mut enc);
        let bytes = enc.into_bytes();
        let decoded = RegisterSuperAck::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, ack);

        let mut enc2 = Encoder::new();
        decoded.encode(&mut enc2);
        assert_eq!(enc2.into_bytes(), bytes);
    }

    #[test]
    fn patch_ttl_touches_only_the_nibble() {
        let mut enc = Encoder::new();
        let mut hdr = CommonHeader::new(PacketCode::Packet, FLAG_FROM_SUPERNODE, acme());
        hdr.ttl = 5;
        hdr.encode(&mut enc);
        let mut bytes = enc.into_bytes();
        let before = bytes.clone();

        patch_ttl(&mut bytes, 4);
        let decoded = CommonHeader::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded.ttl, 4);
        assert_eq!(bytes[1..], before[1..]);
    }
}
