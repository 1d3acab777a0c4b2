//! Management endpoint: plain-text status over loopback UDP.
//!
//! Any datagram on the management socket gets the status block back.
//! The block's shape is stable — external tooling greps it.

use std::net::SocketAddr;

use tracing::{debug, warn};

use super::server::Supernode;
use super::transport::DatagramSink;

/// Default management port, bound on loopback only.
pub const MGMT_PORT: u16 = 5645;

/// Render the status block.
pub fn render_status(sn: &Supernode, now: u64) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("----------------\n");
    out.push_str(&format!("uptime    {}\n", now.saturating_sub(sn.start_time)));
    out.push_str(&format!("edges     {}\n", sn.edges.len()));
    out.push_str(&format!("errors    {}\n", sn.stats.errors));
    out.push_str(&format!("reg_sup   {}\n", sn.stats.reg_super));
    out.push_str(&format!("reg_nak   {}\n", sn.stats.reg_super_nak));
    out.push_str(&format!("fwd       {}\n", sn.stats.fwd));
    out.push_str(&format!("broadcast {}\n", sn.stats.broadcast));
    out.push_str(&format!(
        "last fwd  {} sec ago\n",
        now.saturating_sub(sn.stats.last_fwd)
    ));
    out.push_str(&format!(
        "last reg  {} sec ago\n",
        now.saturating_sub(sn.stats.last_reg_super)
    ));
    out
}

/// Answer a management query.
pub fn handle_mgmt_datagram<S: DatagramSink>(
    sn: &mut Supernode,
    sink: &S,
    sender: SocketAddr,
    now: u64,
) {
    debug!(%sender, "management query");
    let response = render_status(sn, now);
    if let Err(e) = sink.send_to(response.as_bytes(), sender) {
        warn!(%sender, error = %e, "failed to send management response");
        sn.stats.errors += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sn::transport::testing::RecordingSink;

    #[test]
    fn status_block_shape() {
        let mut sn = Supernode::new(1000, None);
        sn.stats.fwd = 7;
        sn.stats.reg_super = 3;
        sn.stats.last_fwd = 1090;
        sn.stats.last_reg_super = 1080;

        let block = render_status(&sn, 1100);
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines[0], "----------------");
        assert_eq!(lines[1], "uptime    100");
        assert_eq!(lines[2], "edges     0");
        assert_eq!(lines[3], "errors    0");
        assert_eq!(lines[4], "reg_sup   3");
        assert_eq!(lines[5], "reg_nak   0");
        assert_eq!(lines[6], "fwd       7");
        assert_eq!(lines[7], "broadcast 0");
        assert_eq!(lines[8], "last fwd  10 sec ago");
        assert_eq!(lines[9], "last reg  20 sec ago");
        assert!(block.ends_with('\n'));
    }

    #[test]
    fn query_gets_a_response() {
        let mut sn = Supernode::new(1000, None);
        let sink = RecordingSink::new();
        let sender: SocketAddr = "127.0.0.1:55555".parse().unwrap();

        handle_mgmt_datagram(&mut sn, &sink, sender, 1010);

        let sent = sink.sent_to(sender);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with(b"----------------\n"));
    }

    #[test]
    fn failed_response_counts_an_error() {
        let mut sn = Supernode::new(1000, None);
        let sink = RecordingSink::new();
        sink.fail.set(true);

        handle_mgmt_datagram(&mut sn, &sink, "127.0.0.1:55555".parse().unwrap(), 1010);
        assert_eq!(sn.stats.errors, 1);
    }
}
