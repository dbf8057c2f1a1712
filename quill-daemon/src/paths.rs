use std::path::{Path, PathBuf};

pub use quill_core::config::quill_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Bound on notes waiting behind the one being processed.
pub const QUEUE_DEPTH: usize = 64;

pub fn socket_path(home: &Path) -> PathBuf {
    quill_root(home).join(DAEMON_SOCKET)
}
