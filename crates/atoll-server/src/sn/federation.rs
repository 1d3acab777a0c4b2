//! Supernode coordinator: peer discovery and community federation over
//! the SNM protocol.
//!
//! A freshly started supernode with known peers runs a DISCOVERY
//! phase: it asks every peer for its supernode and community lists,
//! merges the answers, and after a fixed interval promotes the
//! communities nobody else serves adequately into its own active set,
//! advertises that set, and goes READY. From then on it answers peer
//! requests, absorbs advertisements, and hands registering edges the
//! peer supernodes serving their community.
//!
//! The supernode set holds peer SNM addresses; per-community serving
//! lists hold peer edge addresses (those are what edges dial).

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use atoll_wire::snm::{
    CommunityEntry, SnmAdv, SnmHeader, SnmInfo, SnmRequest, SnmType, SNM_FLAG_A, SNM_FLAG_C,
    SNM_FLAG_E, SNM_FLAG_N, SNM_FLAG_S,
};
use atoll_wire::{Community, Decoder, Encoder};
use tracing::{debug, info, warn};

use super::error::SnError;
use super::files::{self, StateFiles};
use super::transport::DatagramSink;

/// A community served by fewer peers than this is considered
/// under-served and gets adopted at promotion.
pub const MIN_SN_PER_COMM: usize = 2;
/// Cap on the serving list kept per community.
pub const MAX_SN_PER_COMM: usize = 8;
/// Cap on the number of communities one supernode tracks.
pub const MAX_COMM_PER_SN: usize = 64;
/// Seconds after startup before DISCOVERY promotes to READY.
pub const DISCOVERY_INTERVAL: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Discovery,
    Ready,
}

#[derive(Debug, Clone)]
struct CommunityInfo {
    /// Edge sockets of the peer supernodes serving this community.
    supernodes: Vec<SocketAddr>,
    /// Loaded from file (or registered by an edge) rather than
    /// discovered from a peer.
    persist: bool,
}

#[derive(Debug)]
pub struct Coordinator {
    state: CoordinatorState,
    seq: u32,
    snm_port: u16,
    edge_port: u16,
    supernodes: BTreeSet<SocketAddr>,
    communities: BTreeMap<Community, CommunityInfo>,
    files: StateFiles,
}

impl Coordinator {
    /// Load state from the per-port files and merge in any seed peers
    /// from the command line, rewriting the supernode file if the
    /// merge added any. With no peers to query there is nothing to
    /// discover, so the coordinator starts READY.
    pub fn load(
        data_dir: &Path,
        snm_port: u16,
        edge_port: u16,
        seeds: &[SocketAddr],
    ) -> Result<Self, SnError> {
        let files = StateFiles::for_port(data_dir, snm_port);
        let mut supernodes = files::load_supernodes(&files.supernodes).map_err(|source| {
            SnError::Persist {
                path: files.supernodes.clone(),
                source,
            }
        })?;
        let persisted = files::load_communities(&files.communities).map_err(|source| {
            SnError::Persist {
                path: files.communities.clone(),
                source,
            }
        })?;

        let mut added = 0usize;
        for seed in seeds {
            if supernodes.insert(*seed) {
                added += 1;
            }
        }
        if added > 0 {
            files::save_supernodes(&files.supernodes, &supernodes).map_err(|source| {
                SnError::Persist {
                    path: files.supernodes.clone(),
                    source,
                }
            })?;
        }

        let communities = persisted
            .into_iter()
            .map(|name| {
                (
                    name,
                    CommunityInfo {
                        supernodes: Vec::new(),
                        persist: true,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let state = if supernodes.is_empty() {
            CoordinatorState::Ready
        } else {
            CoordinatorState::Discovery
        };
        info!(
            peers = supernodes.len(),
            communities = communities.len(),
            ?state,
            "coordinator loaded"
        );

        Ok(Self {
            state,
            seq: u32::MAX,
            snm_port,
            edge_port,
            supernodes,
            communities,
            files,
        })
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CoordinatorState::Ready
    }

    pub fn supernodes(&self) -> &BTreeSet<SocketAddr> {
        &self.supernodes
    }

    pub fn community_names(&self) -> Vec<Community> {
        self.communities.keys().copied().collect()
    }

    /// Peer supernodes serving a community, for REGISTER_SUPER_ACK
    /// backup lists. Empty when the community is not federated.
    pub fn backup_supernodes(&self, community: &Community) -> Vec<SocketAddr> {
        self.communities
            .get(community)
            .map(|info| info.supernodes.clone())
            .unwrap_or_default()
    }

    /// Kick off discovery: ask every known peer for its lists.
    pub fn send_initial_requests<S: DatagramSink>(&mut self, sink: &S) {
        for peer in self.supernodes.clone() {
            self.send_req(sink, peer);
        }
    }

    /// Promote DISCOVERY → READY once the discovery window has passed:
    /// keep the persisted communities, adopt discovered ones that are
    /// under-served, advertise the active set, and go READY.
    pub fn discovery_tick<S: DatagramSink>(&mut self, sink: &S, now: u64, start_time: u64) {
        if self.state != CoordinatorState::Discovery {
            return;
        }
        if now.saturating_sub(start_time) < DISCOVERY_INTERVAL {
            return;
        }

        let mut active: BTreeMap<Community, CommunityInfo> = self
            .communities
            .iter()
            .filter(|(_, info)| info.persist)
            .map(|(name, info)| (*name, info.clone()))
            .collect();

        for (name, info) in &self.communities {
            if active.len() >= MAX_COMM_PER_SN {
                break;
            }
            if !info.persist && info.supernodes.len() < MIN_SN_PER_COMM {
                // Under-served: adopt it. The serving list is rebuilt
                // from ADV exchange.
                active.insert(
                    *name,
                    CommunityInfo {
                        supernodes: Vec::new(),
                        persist: false,
                    },
                );
            }
        }
        self.communities = active;

        info!(
            communities = self.communities.len(),
            "discovery window closed; advertising and going ready"
        );
        self.advertise_all(sink);
        self.state = CoordinatorState::Ready;
    }

    /// Act on one SNM datagram.
    pub fn handle_snm_datagram<S: DatagramSink>(
        &mut self,
        sink: &S,
        buf: &[u8],
        sender: SocketAddr,
    ) {
        let mut dec = Decoder::new(buf);
        let hdr = match SnmHeader::decode(&mut dec) {
            Ok(hdr) => hdr,
            Err(e) => {
                warn!(%sender, error = %e, "failed to decode SNM header");
                return;
            }
        };
        debug!(%sender, kind = ?hdr.kind, flags = hdr.flags, seq = hdr.seq, "rx SNM");

        match hdr.kind {
            SnmType::ReqList => self.on_req(sink, &hdr, &mut dec, sender),
            SnmType::RspList => self.on_info(sink, &hdr, &mut dec, sender),
            SnmType::Adv => self.on_adv(sink, &hdr, &mut dec, sender),
        }
    }

    fn on_req<S: DatagramSink>(
        &mut self,
        sink: &S,
        hdr: &SnmHeader,
        dec: &mut Decoder<'_>,
        sender: SocketAddr,
    ) {
        if self.state != CoordinatorState::Ready {
            warn!(%sender, "SNM REQ received before ready; dropped");
            return;
        }
        let req = match SnmRequest::decode(hdr, dec) {
            Ok(req) => req,
            Err(e) => {
                warn!(%sender, error = %e, "failed to decode SNM REQ");
                return;
            }
        };

        if hdr.has(SNM_FLAG_A) {
            if hdr.has(SNM_FLAG_E) {
                // An edge asking us to take on a new community.
                if req.communities.len() == 1 {
                    let name = req.communities[0];
                    if self.add_persisted_community(name) {
                        self.save_communities_file();
                        self.advertise_one(sink, name);
                    }
                } else {
                    warn!(
                        %sender,
                        count = req.communities.len(),
                        "edge community request must carry exactly one name"
                    );
                }
            }
            self.send_adv(sink, sender, &[]);
        } else {
            self.send_info(sink, sender, hdr, &req);
        }

        if !hdr.has(SNM_FLAG_E) && self.supernodes.insert(sender) {
            info!(peer = %sender, "learned peer supernode");
            self.save_supernodes_file();
        }
    }

    fn on_info<S: DatagramSink>(
        &mut self,
        sink: &S,
        _hdr: &SnmHeader,
        dec: &mut Decoder<'_>,
        sender: SocketAddr,
    ) {
        if self.state == CoordinatorState::Ready {
            warn!(%sender, "SNM INFO received while ready; dropped");
            return;
        }
        let rsp = match SnmInfo::decode(dec) {
            Ok(rsp) => rsp,
            Err(e) => {
                warn!(%sender, error = %e, "failed to decode SNM INFO");
                return;
            }
        };

        let mut new_peers = Vec::new();
        for peer in rsp.supernodes {
            if self.is_self(peer) {
                continue;
            }
            if self.supernodes.insert(peer) {
                new_peers.push(peer);
            }
        }
        if !new_peers.is_empty() {
            info!(count = new_peers.len(), "merged new peer supernodes");
            self.save_supernodes_file();
        }

        for entry in rsp.communities {
            if entry.supernodes.len() >= MIN_SN_PER_COMM {
                self.merge_community(entry.name, &entry.supernodes);
            }
        }

        // Query the peers we just learned about; merging by set makes
        // this recursion converge.
        for peer in new_peers {
            self.send_req(sink, peer);
        }
    }

    fn on_adv<S: DatagramSink>(
        &mut self,
        sink: &S,
        hdr: &SnmHeader,
        dec: &mut Decoder<'_>,
        sender: SocketAddr,
    ) {
        let adv = match SnmAdv::decode(dec) {
            Ok(adv) => adv,
            Err(e) => {
                warn!(%sender, error = %e, "failed to decode SNM ADV");
                return;
            }
        };

        // The advertised socket names the peer's edge port; the
        // address may be unspecified, so take the IP we observed.
        let peer_edge = SocketAddr::new(sender.ip(), adv.sock.port());

        let mut changed = false;
        for name in &adv.communities {
            changed |= self.merge_community_sock(*name, peer_edge);
        }

        if changed && hdr.has(SNM_FLAG_A) {
            let names = self.community_names();
            self.send_adv(sink, sender, &names);
        }
    }

    fn send_req<S: DatagramSink>(&mut self, sink: &S, dest: SocketAddr) {
        if self.is_self(dest) {
            return;
        }
        self.seq = self.seq.wrapping_add(1);
        let hdr = SnmHeader {
            kind: SnmType::ReqList,
            flags: SNM_FLAG_S | SNM_FLAG_C,
            seq: self.seq,
        };
        let mut enc = Encoder::new();
        hdr.encode(&mut enc);
        SnmRequest::default().encode(&mut enc);
        let buf = enc.into_bytes();
        info!(peer = %dest, seq = hdr.seq, "tx SNM_REQ");
        if let Err(e) = sink.send_to(&buf, dest) {
            warn!(peer = %dest, error = %e, "failed to send SNM_REQ");
        }
    }

    fn send_info<S: DatagramSink>(
        &mut self,
        sink: &S,
        dest: SocketAddr,
        req_hdr: &SnmHeader,
        req: &SnmRequest,
    ) {
        let supernodes = if req_hdr.has(SNM_FLAG_S) {
            self.supernodes.iter().copied().collect()
        } else {
            Vec::new()
        };
        let communities = if req_hdr.has(SNM_FLAG_C) {
            self.communities
                .iter()
                .map(|(name, info)| CommunityEntry {
                    name: *name,
                    supernodes: info.supernodes.clone(),
                })
                .collect()
        } else if req_hdr.has(SNM_FLAG_N) {
            req.communities
                .iter()
                .filter_map(|name| {
                    self.communities.get(name).map(|info| CommunityEntry {
                        name: *name,
                        supernodes: info.supernodes.clone(),
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        let hdr = SnmHeader {
            kind: SnmType::RspList,
            flags: req_hdr.flags,
            seq: req_hdr.seq,
        };
        let info = SnmInfo {
            supernodes,
            communities,
        };
        let mut enc = Encoder::new();
        hdr.encode(&mut enc);
        info.encode(&mut enc);
        let buf = enc.into_bytes();
        info!(peer = %dest, seq = hdr.seq, "tx SNM_INFO");
        if let Err(e) = sink.send_to(&buf, dest) {
            warn!(peer = %dest, error = %e, "failed to send SNM_INFO");
        }
    }

    fn send_adv<S: DatagramSink>(&mut self, sink: &S, dest: SocketAddr, names: &[Community]) {
        if self.is_self(dest) {
            return;
        }
        self.seq = self.seq.wrapping_add(1);
        let mut flags = 0;
        if self.state != CoordinatorState::Ready {
            // Still discovering: ask the peer to advertise back.
            flags |= SNM_FLAG_A;
        }
        let hdr = SnmHeader {
            kind: SnmType::Adv,
            flags,
            seq: self.seq,
        };
        let adv = SnmAdv {
            sock: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), self.edge_port),
            communities: names.to_vec(),
        };
        let mut enc = Encoder::new();
        hdr.encode(&mut enc);
        adv.encode(&mut enc);
        let buf = enc.into_bytes();
        info!(peer = %dest, count = names.len(), "tx SNM_ADV");
        if let Err(e) = sink.send_to(&buf, dest) {
            warn!(peer = %dest, error = %e, "failed to send SNM_ADV");
        }
    }

    fn advertise_all<S: DatagramSink>(&mut self, sink: &S) {
        if self.communities.is_empty() {
            return;
        }
        let names = self.community_names();
        for peer in self.supernodes.clone() {
            self.send_adv(sink, peer, &names);
        }
    }

    fn advertise_one<S: DatagramSink>(&mut self, sink: &S, name: Community) {
        for peer in self.supernodes.clone() {
            self.send_adv(sink, peer, &[name]);
        }
    }

    /// Add a community to the active, persisted set. Returns true if
    /// it was not known before.
    fn add_persisted_community(&mut self, name: Community) -> bool {
        if self.communities.contains_key(&name) {
            return false;
        }
        if self.communities.len() >= MAX_COMM_PER_SN {
            warn!(community = %name, "community table full; registration refused");
            return false;
        }
        info!(community = %name, "community registered");
        self.communities.insert(
            name,
            CommunityInfo {
                supernodes: Vec::new(),
                persist: true,
            },
        );
        true
    }

    /// Merge a community entry with its serving sockets. Returns true
    /// if anything was added.
    fn merge_community(&mut self, name: Community, socks: &[SocketAddr]) -> bool {
        let mut changed = false;
        for sock in socks {
            changed |= self.merge_community_sock(name, *sock);
        }
        changed
    }

    fn merge_community_sock(&mut self, name: Community, sock: SocketAddr) -> bool {
        if !self.communities.contains_key(&name) && self.communities.len() >= MAX_COMM_PER_SN {
            debug!(community = %name, "community table full; advertisement ignored");
            return false;
        }
        let entry = self.communities.entry(name).or_insert_with(|| {
            debug!(community = %name, "community discovered");
            CommunityInfo {
                supernodes: Vec::new(),
                persist: false,
            }
        });
        if entry.supernodes.contains(&sock) || entry.supernodes.len() >= MAX_SN_PER_COMM {
            return false;
        }
        entry.supernodes.push(sock);
        true
    }

    /// True for addresses that would loop back to our own SNM socket.
    fn is_self(&self, addr: SocketAddr) -> bool {
        addr.port() == self.snm_port && (addr.ip().is_loopback() || addr.ip().is_unspecified())
    }

    fn save_supernodes_file(&self) {
        if let Err(e) = files::save_supernodes(&self.files.supernodes, &self.supernodes) {
            warn!(path = %self.files.supernodes.display(), error = %e, "failed to save supernodes");
        }
    }

    fn save_communities_file(&self) {
        let names = self.community_names();
        if let Err(e) = files::save_communities(&self.files.communities, &names) {
            warn!(path = %self.files.communities.display(), error = %e, "failed to save communities");
        }
    }
}
