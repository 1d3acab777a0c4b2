use std::io;
use std::path::PathBuf;

/// Errors that abort supernode startup or terminate the event loop.
///
/// Per-datagram failures (malformed input, failed sends) never surface
/// here — they are logged, counted, and the loop continues.
#[derive(Debug, thiserror::Error)]
pub enum SnError {
    #[error("failed to bind {role} socket on port {port}: {source}")]
    Bind {
        role: &'static str,
        port: u16,
        source: io::Error,
    },

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("failed to load {path}: {source}")]
    Persist {
        path: PathBuf,
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
