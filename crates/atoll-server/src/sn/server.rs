//! Socket setup and the event loop.
//!
//! Single-threaded: one task owns every socket and every table.
//! Readiness-based multiplexing over the edge, management, and
//! (optionally) SNM sockets, with a 10-second tick so maintenance runs
//! even under silence. One datagram is read per ready socket per wake
//! into a fixed 2048-byte buffer.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use atoll_wire::PACKET_BUF_SIZE;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

use super::dispatch;
use super::error::SnError;
use super::federation::Coordinator;
use super::mgmt::{self, MGMT_PORT};
use super::registry::EdgeRegistry;
use super::stats::SnStats;

/// Default edge-facing UDP port.
pub const EDGE_PORT: u16 = 7654;

/// Seconds between maintenance wakes when no traffic arrives.
const TICK_INTERVAL: u64 = 10;

/// Supernode configuration, filled in by the CLI.
#[derive(Debug, Clone)]
pub struct SnConfig {
    /// Edge UDP port.
    pub edge_port: u16,
    /// Management port, bound on loopback.
    pub mgmt_port: u16,
    /// SNM port; enables the coordinator when set.
    pub snm_port: Option<u16>,
    /// Seed peer supernodes (SNM addresses).
    pub seed_peers: Vec<SocketAddr>,
    /// Directory holding the coordinator state files.
    pub data_dir: PathBuf,
}

impl Default for SnConfig {
    fn default() -> Self {
        Self {
            edge_port: EDGE_PORT,
            mgmt_port: MGMT_PORT,
            snm_port: None,
            seed_peers: Vec::new(),
            data_dir: PathBuf::from("."),
        }
    }
}

/// Everything the supernode owns besides its sockets.
#[derive(Debug)]
pub struct Supernode {
    pub start_time: u64,
    pub stats: SnStats,
    pub edges: EdgeRegistry,
    pub coordinator: Option<Coordinator>,
}

impl Supernode {
    pub fn new(start_time: u64, coordinator: Option<Coordinator>) -> Self {
        Self {
            start_time,
            stats: SnStats::new(start_time),
            edges: EdgeRegistry::new(),
            coordinator,
        }
    }
}

/// The bound server, ready to run.
pub struct SnServer {
    sn: Supernode,
    edge_sock: UdpSocket,
    mgmt_sock: UdpSocket,
    snm_sock: Option<UdpSocket>,
}

enum Wake {
    Edge,
    Mgmt,
    Snm,
    Tick,
}

impl SnServer {
    /// Bind the sockets and load coordinator state.
    pub async fn bind(config: &SnConfig) -> Result<Self, SnError> {
        let edge_sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.edge_port))
            .await
            .map_err(|source| SnError::Bind {
                role: "edge",
                port: config.edge_port,
                source,
            })?;
        info!(addr = %edge_sock.local_addr()?, "listening for edges");

        let mgmt_sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, config.mgmt_port))
            .await
            .map_err(|source| SnError::Bind {
                role: "management",
                port: config.mgmt_port,
                source,
            })?;
        info!(addr = %mgmt_sock.local_addr()?, "listening for management queries");

        let start_time = unix_now();
        let mut coordinator = None;
        let mut snm_sock = None;
        if let Some(snm_port) = config.snm_port {
            let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, snm_port))
                .await
                .map_err(|source| SnError::Bind {
                    role: "SNM",
                    port: snm_port,
                    source,
                })?;
            info!(addr = %sock.local_addr()?, "listening for peer supernodes");

            let edge_port = edge_sock.local_addr()?.port();
            let mut coord = Coordinator::load(
                &config.data_dir,
                sock.local_addr()?.port(),
                edge_port,
                &config.seed_peers,
            )?;
            coord.send_initial_requests(&sock);

            coordinator = Some(coord);
            snm_sock = Some(sock);
        }

        Ok(Self {
            sn: Supernode::new(start_time, coordinator),
            edge_sock,
            mgmt_sock,
            snm_sock,
        })
    }

    /// The edge socket's bound address (the port matters when bound
    /// ephemeral).
    pub fn edge_addr(&self) -> std::io::Result<SocketAddr> {
        self.edge_sock.local_addr()
    }

    pub fn mgmt_addr(&self) -> std::io::Result<SocketAddr> {
        self.mgmt_sock.local_addr()
    }

    pub fn snm_addr(&self) -> Option<std::io::Result<SocketAddr>> {
        self.snm_sock.as_ref().map(|s| s.local_addr())
    }

    /// Run until a socket dies. The registry is cleared on the way
    /// out.
    pub async fn run(mut self) -> Result<(), SnError> {
        info!("supernode started");
        let result = self.serve().await;
        self.sn.edges.purge(0, unix_now());
        result
    }

    async fn serve(&mut self) -> Result<(), SnError> {
        let mut tick = tokio::time::interval(Duration::from_secs(TICK_INTERVAL));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = [0u8; PACKET_BUF_SIZE];

        loop {
            let wake = tokio::select! {
                r = self.edge_sock.readable() => {
                    r.map_err(SnError::Receive)?;
                    Wake::Edge
                }
                r = self.mgmt_sock.readable() => {
                    r.map_err(SnError::Receive)?;
                    Wake::Mgmt
                }
                r = readable_opt(self.snm_sock.as_ref()) => {
                    r.map_err(SnError::Receive)?;
                    Wake::Snm
                }
                _ = tick.tick() => Wake::Tick,
            };

            let now = unix_now();
            match wake {
                Wake::Edge => {
                    if let Some((len, sender)) = recv_one(&self.edge_sock, &mut buf)? {
                        // A bare empty datagram carries nothing to do.
                        if len > 0 {
                            dispatch::handle_edge_datagram(
                                &mut self.sn,
                                &self.edge_sock,
                                &buf[..len],
                                sender,
                                now,
                            );
                        }
                    }
                }
                Wake::Mgmt => {
                    if let Some((_, sender)) = recv_one(&self.mgmt_sock, &mut buf)? {
                        mgmt::handle_mgmt_datagram(&mut self.sn, &self.mgmt_sock, sender, now);
                    }
                }
                Wake::Snm => {
                    if let Some(sock) = &self.snm_sock {
                        if let Some((len, sender)) = recv_one(sock, &mut buf)? {
                            if let Some(coord) = &mut self.sn.coordinator {
                                coord.handle_snm_datagram(sock, &buf[..len], sender);
                            }
                        }
                    }
                }
                Wake::Tick => trace!("idle tick"),
            }

            self.sn.edges.purge_expired(now);

            if let (Some(coord), Some(sock)) = (&mut self.sn.coordinator, &self.snm_sock) {
                if !coord.is_ready() {
                    coord.discovery_tick(sock, now, self.sn.start_time);
                }
            }
        }
    }
}

/// Read one datagram after a readiness event. A spurious wake
/// (`WouldBlock`) is not an error; anything else is fatal — the socket
/// is presumed unrecoverable.
fn recv_one(
    sock: &UdpSocket,
    buf: &mut [u8],
) -> Result<Option<(usize, SocketAddr)>, SnError> {
    match sock.try_recv_from(buf) {
        Ok((len, sender)) => Ok(Some((len, sender))),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(SnError::Receive(e)),
    }
}

/// Readiness future for the optional SNM socket; pends forever when
/// the coordinator is disabled.
async fn readable_opt(sock: Option<&UdpSocket>) -> std::io::Result<()> {
    match sock {
        Some(s) => s.readable().await,
        None => std::future::pending().await,
    }
}

/// Seconds since the epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
