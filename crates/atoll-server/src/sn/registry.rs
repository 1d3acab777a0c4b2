//! Edge registry: the authoritative MAC → socket table.
//!
//! Keyed by MAC alone — a MAC identifies at most one edge across all
//! communities, and a re-registration from a new community or address
//! overwrites the old record. Records expire when they stop
//! refreshing; the sweep is frequency-gated so the event loop can call
//! it on every iteration.

use std::collections::HashMap;
use std::net::SocketAddr;

use atoll_wire::{Community, Mac};
use tracing::{debug, info};

/// Seconds without a refresh before a registration expires.
pub const REGISTRATION_TIMEOUT: u64 = 60;

/// Minimum seconds between expiry sweeps.
pub const PURGE_FREQUENCY: u64 = 30;

/// One registered edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub community: Community,
    pub mac: Mac,
    pub sock: SocketAddr,
    pub last_seen: u64,
}

#[derive(Debug, Default)]
pub struct EdgeRegistry {
    edges: HashMap<Mac, EdgeRecord>,
    next_purge: u64,
}

impl EdgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, mac: &Mac) -> Option<&EdgeRecord> {
        self.edges.get(mac)
    }

    /// Record a registration. A known MAC keeps its record; community
    /// and socket are overwritten when either differs, and `last_seen`
    /// always advances.
    pub fn upsert(&mut self, community: Community, mac: Mac, sock: SocketAddr, now: u64) {
        match self.edges.get_mut(&mac) {
            None => {
                info!(%mac, %sock, community = %community, "edge registered");
                self.edges.insert(
                    mac,
                    EdgeRecord {
                        community,
                        mac,
                        sock,
                        last_seen: now,
                    },
                );
            }
            Some(record) => {
                if record.community != community || record.sock != sock {
                    info!(%mac, %sock, community = %community, "edge updated");
                    record.community = community;
                    record.sock = sock;
                } else {
                    debug!(%mac, %sock, "edge refreshed");
                }
                record.last_seen = record.last_seen.max(now);
            }
        }
    }

    /// Drop every record idle for longer than `threshold` seconds.
    /// A threshold of zero clears the table. Returns how many were
    /// dropped.
    pub fn purge(&mut self, threshold: u64, now: u64) -> usize {
        let before = self.edges.len();
        self.edges
            .retain(|_, r| now.saturating_sub(r.last_seen) <= threshold);
        let dropped = before - self.edges.len();
        if dropped > 0 {
            debug!(dropped, remaining = self.edges.len(), "purged expired edges");
        }
        dropped
    }

    /// Frequency-gated expiry sweep; safe to call on every loop
    /// iteration.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        if now < self.next_purge {
            return 0;
        }
        self.next_purge = now + PURGE_FREQUENCY;
        self.purge(REGISTRATION_TIMEOUT, now)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.values()
    }
}
