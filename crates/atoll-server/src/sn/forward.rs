//! Forwarding engine: unicast by MAC lookup, broadcast by community
//! sweep with source suppression.

use atoll_wire::{Community, Mac, PACKET_BUF_SIZE};
use tracing::{debug, warn};

use super::registry::EdgeRegistry;
use super::stats::SnStats;
use super::transport::DatagramSink;

/// Forward a datagram to the edge registered under `dst_mac`.
///
/// An unknown MAC is a silent drop, not an error — the edge may simply
/// have expired.
pub fn try_forward<S: DatagramSink>(
    edges: &EdgeRegistry,
    stats: &mut SnStats,
    sink: &S,
    dst_mac: &Mac,
    buf: &[u8],
) {
    if buf.len() > PACKET_BUF_SIZE {
        warn!(size = buf.len(), "oversize forward dropped");
        stats.errors += 1;
        return;
    }
    let Some(record) = edges.find(dst_mac) else {
        debug!(%dst_mac, "unicast to unknown MAC dropped");
        return;
    };
    match sink.send_to(buf, record.sock) {
        Ok(n) if n == buf.len() => {
            stats.fwd += 1;
            debug!(size = buf.len(), dest = %record.sock, mac = %record.mac, "unicast");
        }
        Ok(n) => {
            stats.errors += 1;
            warn!(size = buf.len(), sent = n, dest = %record.sock, "partial unicast send");
        }
        Err(e) => {
            stats.errors += 1;
            warn!(dest = %record.sock, error = %e, "unicast send failed");
        }
    }
}

/// Send the same datagram to every community member except the source
/// MAC. Individual failures do not abort the fan-out.
pub fn try_broadcast<S: DatagramSink>(
    edges: &EdgeRegistry,
    stats: &mut SnStats,
    sink: &S,
    community: &Community,
    src_mac: &Mac,
    buf: &[u8],
) {
    if buf.len() > PACKET_BUF_SIZE {
        warn!(size = buf.len(), "oversize broadcast dropped");
        stats.errors += 1;
        return;
    }
    for record in edges.iter() {
        if record.community != *community || record.mac == *src_mac {
            continue;
        }
        match sink.send_to(buf, record.sock) {
            Ok(n) if n == buf.len() => {
                stats.broadcast += 1;
                debug!(size = buf.len(), dest = %record.sock, mac = %record.mac, "broadcast");
            }
            Ok(n) => {
                stats.errors += 1;
                warn!(size = buf.len(), sent = n, dest = %record.sock, "partial broadcast send");
            }
            Err(e) => {
                stats.errors += 1;
                warn!(dest = %record.sock, error = %e, "broadcast send failed");
            }
        }
    }
}
