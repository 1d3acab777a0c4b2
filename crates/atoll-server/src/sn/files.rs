//! Coordinator state files.
//!
//! Two files per SNM port, their names fixed by the protocol:
//! `SN_SNM_<port>` holds the peer supernode addresses and
//! `SN_COMM_<port>` the locally persisted community names. Contents
//! are JSON and round-trip with the in-memory structures. Writes are
//! atomic (tmp + rename). A missing file loads as empty — the first
//! run of a supernode starts from nothing.

use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use atoll_wire::Community;
use tracing::info;

/// Paths of the two state files for one SNM port.
#[derive(Debug, Clone)]
pub struct StateFiles {
    pub supernodes: PathBuf,
    pub communities: PathBuf,
}

impl StateFiles {
    pub fn for_port(dir: &Path, snm_port: u16) -> Self {
        Self {
            supernodes: dir.join(format!("SN_SNM_{snm_port}")),
            communities: dir.join(format!("SN_COMM_{snm_port}")),
        }
    }
}

pub fn load_supernodes(path: &Path) -> io::Result<BTreeSet<SocketAddr>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let json = std::fs::read_to_string(path)?;
    let list: Vec<SocketAddr> = serde_json::from_str(&json).map_err(io::Error::other)?;
    info!(count = list.len(), path = %path.display(), "loaded peer supernodes");
    Ok(list.into_iter().collect())
}

pub fn save_supernodes(path: &Path, supernodes: &BTreeSet<SocketAddr>) -> io::Result<()> {
    let list: Vec<&SocketAddr> = supernodes.iter().collect();
    write_atomic(path, &serde_json::to_string_pretty(&list).map_err(io::Error::other)?)
}

pub fn load_communities(path: &Path) -> io::Result<Vec<Community>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let json = std::fs::read_to_string(path)?;
    let list: Vec<Community> = serde_json::from_str(&json).map_err(io::Error::other)?;
    info!(count = list.len(), path = %path.display(), "loaded persisted communities");
    Ok(list)
}

pub fn save_communities(path: &Path, communities: &[Community]) -> io::Result<()> {
    write_atomic(
        path,
        &serde_json::to_string_pretty(communities).map_err(io::Error::other)?,
    )
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}
