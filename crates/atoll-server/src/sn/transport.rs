//! The datagram send seam.
//!
//! Handlers emit through [`DatagramSink`] so the forwarding and
//! coordination logic is testable without sockets. The production sink
//! is a tokio [`UdpSocket`]; UDP sends complete immediately, so the
//! non-blocking `try_send_to` matches the reference's `sendto`.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

pub trait DatagramSink {
    /// Send one datagram. Returns the number of bytes accepted.
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;
}

impl DatagramSink for UdpSocket {
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.try_send_to(buf, dest)
    }
}
