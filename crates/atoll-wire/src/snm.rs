//! SNM framing: the supernode-to-supernode management protocol.
//!
//! Header (6 bytes):
//!   [u8: message type]  [u8: flags]  [u32: sequence number]
//!
//! REQ asks a peer for its supernode and/or community lists, INFO is
//! the answer, and ADV pushes a community advertisement. The INFO
//! supernode list carries peer SNM addresses; per-community lists and
//! the ADV socket carry edge-facing addresses (they end up in
//! REGISTER_SUPER_ACK backup lists). An ADV sender may not know its
//! own externally visible IP, so its socket is allowed to be
//! unspecified; the receiver substitutes the datagram's source IP.

use std::net::SocketAddr;

use crate::error::WireError;
use crate::types::{Community, Decoder, Encoder};

/// Request the peer's supernode list.
pub const SNM_FLAG_S: u8 = 0x01;
/// Request the peer's full community list.
pub const SNM_FLAG_C: u8 = 0x02;
/// The request carries an explicit community-name filter.
pub const SNM_FLAG_N: u8 = 0x04;
/// The sender wants an advertisement back.
pub const SNM_FLAG_A: u8 = 0x08;
/// The request originated from an edge, not a peer supernode.
pub const SNM_FLAG_E: u8 = 0x10;

/// SNM message types.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmType {
    ReqList = 0,
    RspList = 1,
    Adv = 2,
}

impl TryFrom<u8> for SnmType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ReqList),
            1 => Ok(Self::RspList),
            2 => Ok(Self::Adv),
            other => Err(WireError::UnknownSnmType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmHeader {
    pub kind: SnmType,
    pub flags: u8,
    pub seq: u32,
}

impl SnmHeader {
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.kind as u8);
        enc.u8(self.flags);
        enc.u32(self.seq);
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        Ok(Self {
            kind: SnmType::try_from(dec.u8()?)?,
            flags: dec.u8()?,
            seq: dec.u32()?,
        })
    }
}

/// REQ body: a community-name filter, present only with `SNM_FLAG_N`
/// or `SNM_FLAG_E`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnmRequest {
    pub communities: Vec<Community>,
}

impl SnmRequest {
    pub fn encode(&self, enc: &mut Encoder) {
        if !self.communities.is_empty() {
            enc.u16(self.communities.len() as u16);
            for c in &self.communities {
                enc.community(c);
            }
        }
    }

    pub fn decode(hdr: &SnmHeader, dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        if !hdr.has(SNM_FLAG_N) && !hdr.has(SNM_FLAG_E) {
            return Ok(Self::default());
        }
        let count = dec.u16()?;
        let mut communities = Vec::with_capacity(count as usize);
        for _ in 0..count {
            communities.push(dec.community()?);
        }
        Ok(Self { communities })
    }
}

/// One community and the edge sockets of the supernodes serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityEntry {
    pub name: Community,
    pub supernodes: Vec<SocketAddr>,
}

/// INFO body: the responder's supernode and community lists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnmInfo {
    pub supernodes: Vec<SocketAddr>,
    pub communities: Vec<CommunityEntry>,
}

impl SnmInfo {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.u16(self.supernodes.len() as u16);
        enc.u16(self.communities.len() as u16);
        for sn in &self.supernodes {
            enc.sock(sn);
        }
        for entry in &self.communities {
            enc.community(&entry.name);
            enc.u8(entry.supernodes.len().min(u8::MAX as usize) as u8);
            for sn in entry.supernodes.iter().take(u8::MAX as usize) {
                enc.sock(sn);
            }
        }
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let sn_num = dec.u16()?;
        let comm_num = dec.u16()?;
        let mut supernodes = Vec::with_capacity(sn_num as usize);
        for _ in 0..sn_num {
            supernodes.push(dec.sock()?);
        }
        let mut communities = Vec::with_capacity(comm_num as usize);
        for _ in 0..comm_num {
            let name = dec.community()?;
            let count = dec.u8()?;
            let mut sns = Vec::with_capacity(count as usize);
            for _ in 0..count {
                sns.push(dec.sock()?);
            }
            communities.push(CommunityEntry {
                name,
                supernodes: sns,
            });
        }
        Ok(Self {
            supernodes,
            communities,
        })
    }
}

/// ADV body: the sender's edge socket and the communities it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmAdv {
    pub sock: SocketAddr,
    pub communities: Vec<Community>,
}

impl SnmAdv {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.sock(&self.sock);
        enc.u16(self.communities.len() as u16);
        for c in &self.communities {
            enc.community(c);
        }
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, WireError> {
        let sock = dec.sock()?;
        let count = dec.u16()?;
        let mut communities = Vec::with_capacity(count as usize);
        for _ in 0..count {
            communities.push(dec.community()?);
        }
        Ok(Self { sock, communities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comm(name: &str) -> Community {
        Community::from_name(name).unwrap()
    }

    #[test]
    fn header_roundtrip() {
        let hdr = SnmHeader {
            kind: SnmType::ReqList,
            flags: SNM_FLAG_S | SNM_FLAG_C,
            seq: 0xdead_0001,
        };
        let mut enc = Encoder::new();
        hdr.encode(&mut enc);
        let bytes = enc.into_bytes();
        assert_eq!(bytes.len(), 6);
        assert_eq!(SnmHeader::decode(&mut Decoder::new(&bytes)).unwrap(), hdr);
    }

    #[test]
    fn unknown_type_rejected() {
        let bytes = [3u8, 0, 0, 0, 0, 0];
        assert!(matches!(
            SnmHeader::decode(&mut Decoder::new(&bytes)),
            Err(WireError::UnknownSnmType(3))
        ));
    }

    #[test]
    fn request_name_filter_roundtrip() {
        let hdr = SnmHeader {
            kind: SnmType::ReqList,
            flags: SNM_FLAG_S | SNM_FLAG_N,
            seq: 1,
        };
        let req = SnmRequest {
            communities: vec![comm("acme"), comm("other")],
        };
        let mut enc = Encoder::new();
        req.encode(&mut enc);
        let bytes = enc.into_bytes();
        let decoded = SnmRequest::decode(&hdr, &mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn request_without_filter_is_empty() {
        let hdr = SnmHeader {
            kind: SnmType::ReqList,
            flags: SNM_FLAG_S | SNM_FLAG_C,
            seq: 1,
        };
        // No body bytes at all — the filter is absent, not empty.
        let decoded = SnmRequest::decode(&hdr, &mut Decoder::new(&[])).unwrap();
        assert!(decoded.communities.is_empty());
    }

    #[test]
    fn info_roundtrip() {
        let info = SnmInfo {
            supernodes: vec![
                "192.0.2.1:5646".parse().unwrap(),
                "192.0.2.2:5646".parse().unwrap(),
            ],
            communities: vec![
                CommunityEntry {
                    name: comm("acme"),
                    supernodes: vec!["192.0.2.1:7654".parse().unwrap()],
                },
                CommunityEntry {
                    name: comm("empty"),
                    supernodes: vec![],
                },
            ],
        };
        let mut enc = Encoder::new();
        info.encode(&mut enc);
        let bytes = enc.into_bytes();
        let decoded = SnmInfo::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, info);

        let mut enc2 = Encoder::new();
        decoded.encode(&mut enc2);
        assert_eq!(enc2.into_bytes(), bytes);
    }

    #[test]
    fn info_truncated_list_fails() {
        let info = SnmInfo {
            supernodes: vec!["192.0.2.1:5646".parse().unwrap()],
            communities: vec![],
        };
        let mut enc = Encoder::new();
        info.encode(&mut enc);
        let bytes = enc.into_bytes();
        assert!(matches!(
            SnmInfo::decode(&mut Decoder::new(&bytes[..bytes.len() - 2])),
            Err(WireError::Truncated)
        ));
    }

    #[test]
    fn adv_roundtrip() {
        let adv = SnmAdv {
            sock: "0.0.0.0:7654".parse().unwrap(),
            communities: vec![comm("acme")],
        };
        let mut enc = Encoder::new();
        adv.encode(&mut enc);
        let bytes = enc.into_bytes();
        let decoded = SnmAdv::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(decoded, adv);
    }
}
