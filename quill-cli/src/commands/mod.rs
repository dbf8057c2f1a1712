pub mod config;
pub mod daemon;
pub mod note;
pub mod start;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};

use quill_core::{Config, SenderId};

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// `--sender` if given, else the lowest allow-listed id.
pub(crate) fn resolve_sender(config: &Config, sender: Option<i64>) -> Result<SenderId> {
    match sender {
        Some(id) => Ok(SenderId(id)),
        None => config
            .allowed_ids
            .iter()
            .next()
            .copied()
            .context("no --sender given and ALLOWED_IDS is empty"),
    }
}

/// Replies that mean the note did not make it all the way.
pub(crate) fn is_failure_reply(reply: &str) -> bool {
    reply.starts_with('❌') || reply.starts_with('⛔')
}
