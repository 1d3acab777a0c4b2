//! Edge datagram dispatcher.
//!
//! One entry point per received datagram. Decode failures are counted
//! and dropped — malformed input never takes the server down. Policy
//! drops (expired TTL, unknown unicast MAC, multicast REGISTER
//! destination) are logged at trace/debug level only.

use std::net::SocketAddr;

use atoll_wire::edge::{
    patch_ttl, CommonHeader, Packet, PacketCode, Register, RegisterSuper, RegisterSuperAck,
    DEFAULT_TTL, FLAG_FROM_SUPERNODE, FLAG_SOCKET,
};
use atoll_wire::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use super::forward::{try_broadcast, try_forward};
use super::server::Supernode;
use super::transport::DatagramSink;

/// Registration lifetime handed to edges; governs their re-register
/// cadence.
pub const REG_LIFETIME: u16 = 120;

/// Examine one edge-facing datagram and act on it.
pub fn handle_edge_datagram<S: DatagramSink>(
    sn: &mut Supernode,
    sink: &S,
    buf: &[u8],
    sender: SocketAddr,
    now: u64,
) {
    let mut dec = Decoder::new(buf);
    let mut hdr = match CommonHeader::decode(&mut dec) {
        Ok(hdr) => hdr,
        Err(e) => {
            warn!(%sender, error = %e, "failed to decode common header");
            sn.stats.errors += 1;
            return;
        }
    };

    if hdr.ttl < 1 {
        trace!(%sender, "expired TTL");
        return;
    }
    // The decremented value is carried into every forwarded copy.
    hdr.ttl -= 1;

    match hdr.pc {
        PacketCode::Packet => handle_packet(sn, sink, &hdr, buf, &mut dec, sender, now),
        PacketCode::Register => handle_register(sn, sink, &hdr, buf, &mut dec, sender, now),
        PacketCode::RegisterSuper => handle_register_super(sn, sink, &hdr, &mut dec, sender, now),
        PacketCode::RegisterAck => {
            debug!(%sender, "REGISTER_ACK is never routed via the supernode; ignored");
        }
        other => {
            debug!(%sender, pc = ?other, "unhandled packet code dropped");
        }
    }
}

/// PACKET: a tunneled frame from one edge to another. Edge-sourced
/// packets are re-encoded with the sender's observed socket; packets
/// already forwarded by a supernode pass through byte-identical apart
/// from the TTL nibble.
fn handle_packet<S: DatagramSink>(
    sn: &mut Supernode,
    sink: &S,
    hdr: &CommonHeader,
    buf: &[u8],
    dec: &mut Decoder<'_>,
    sender: SocketAddr,
    now: u64,
) {
    sn.stats.last_fwd = now;
    let pkt = match Packet::decode(hdr, dec) {
        Ok(pkt) => pkt,
        Err(e) => {
            warn!(%sender, error = %e, "failed to decode PACKET");
            sn.stats.errors += 1;
            return;
        }
    };
    let payload = dec.rest();
    let unicast = !pkt.dst_mac.is_multi_broadcast();

    debug!(
        src = %pkt.src_mac,
        dst = %pkt.dst_mac,
        kind = if unicast { "unicast" } else { "multicast" },
        origin = if hdr.from_supernode() { "supernode" } else { "edge" },
        "rx PACKET"
    );

    let out = if hdr.from_supernode() {
        forward_verbatim(buf, hdr.ttl)
    } else {
        let mut fwd_hdr = hdr.clone();
        fwd_hdr.flags |= FLAG_SOCKET | FLAG_FROM_SUPERNODE;
        let fwd_pkt = Packet {
            sock: Some(sender),
            ..pkt
        };
        let mut enc = Encoder::new();
        fwd_hdr.encode(&mut enc);
        fwd_pkt.encode(&mut enc);
        enc.bytes(payload);
        enc.into_bytes()
    };

    if unicast {
        try_forward(&sn.edges, &mut sn.stats, sink, &pkt.dst_mac, &out);
    } else {
        try_broadcast(
            &sn.edges,
            &mut sn.stats,
            sink,
            &hdr.community,
            &pkt.src_mac,
            &out,
        );
    }
}

/// REGISTER: relay an edge-to-edge registration toward its unicast
/// destination. A multicast destination is a protocol violation.
fn handle_register<S: DatagramSink>(
    sn: &mut Supernode,
    sink: &S,
    hdr: &CommonHeader,
    buf: &[u8],
    dec: &mut Decoder<'_>,
    sender: SocketAddr,
    now: u64,
) {
    sn.stats.last_fwd = now;
    let reg = match Register::decode(hdr, dec) {
        Ok(reg) => reg,
        Err(e) => {
            warn!(%sender, error = %e, "failed to decode REGISTER");
            sn.stats.errors += 1;
            return;
        }
    };

    if reg.dst_mac.is_multi_broadcast() {
        warn!(%sender, src = %reg.src_mac, "REGISTER with multicast destination dropped");
        return;
    }

    debug!(
        src = %reg.src_mac,
        dst = %reg.dst_mac,
        origin = if hdr.from_supernode() { "supernode" } else { "edge" },
        "rx REGISTER"
    );

    let out = if hdr.from_supernode() {
        forward_verbatim(buf, hdr.ttl)
    } else {
        let mut fwd_hdr = hdr.clone();
        fwd_hdr.flags |= FLAG_SOCKET | FLAG_FROM_SUPERNODE;
        let fwd_reg = Register {
            sock: Some(sender),
            ..reg
        };
        let mut enc = Encoder::new();
        fwd_hdr.encode(&mut enc);
        fwd_reg.encode(&mut enc);
        enc.bytes(dec.rest());
        enc.into_bytes()
    };

    try_forward(&sn.edges, &mut sn.stats, sink, &reg.dst_mac, &out);
}

/// REGISTER_SUPER: the edge wants to register with us. Record it and
/// acknowledge with its externally observed socket and, when the
/// community is federated, the peer supernodes serving it.
fn handle_register_super<S: DatagramSink>(
    sn: &mut Supernode,
    sink: &S,
    hdr: &CommonHeader,
    dec: &mut Decoder<'_>,
    sender: SocketAddr,
    now: u64,
) {
    sn.stats.last_reg_super = now;
    sn.stats.reg_super += 1;
    let reg = match RegisterSuper::decode(dec) {
        Ok(reg) => reg,
        Err(e) => {
            warn!(%sender, error = %e, "failed to decode REGISTER_SUPER");
            sn.stats.errors += 1;
            return;
        }
    };

    debug!(mac = %reg.edge_mac, %sender, community = %hdr.community, "rx REGISTER_SUPER");

    sn.edges.upsert(hdr.community, reg.edge_mac, sender, now);

    let backups = sn
        .coordinator
        .as_ref()
        .map(|c| c.backup_supernodes(&hdr.community))
        .unwrap_or_default();

    let ack_hdr = CommonHeader {
        ttl: DEFAULT_TTL,
        pc: PacketCode::RegisterSuperAck,
        flags: FLAG_SOCKET | FLAG_FROM_SUPERNODE,
        community: hdr.community,
    };
    let ack = RegisterSuperAck {
        cookie: reg.cookie,
        edge_mac: reg.edge_mac,
        lifetime: REG_LIFETIME,
        sock: sender,
        backups,
    };
    let mut enc = Encoder::new();
    ack_hdr.encode(&mut enc);
    ack.encode(&mut enc);
    let out = enc.into_bytes();

    match sink.send_to(&out, sender) {
        Ok(n) if n == out.len() => {
            debug!(mac = %reg.edge_mac, %sender, "tx REGISTER_SUPER_ACK");
        }
        Ok(_) | Err(_) => {
            warn!(%sender, "failed to send REGISTER_SUPER_ACK");
            sn.stats.errors += 1;
        }
    }
}

/// Copy a supernode-sourced datagram for forwarding, updating only the
/// TTL nibble.
fn forward_verbatim(buf: &[u8], ttl: u8) -> Vec<u8> {
    let mut out = buf.to_vec();
    patch_ttl(&mut out, ttl);
    out
}
