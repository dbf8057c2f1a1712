//! `quill start`: the greeting a new chat gets, gated like a note.

use anyhow::{bail, Context, Result};
use clap::Args;

use quill_core::config;
use quill_daemon::{request_start, DaemonError};
use quill_sync::Pipeline;

use super::{home, is_failure_reply, note::replies_of, resolve_sender};

/// Arguments for `quill start`.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Sender id checked against the allow-list (defaults to the lowest allowed id).
    #[arg(long)]
    pub sender: Option<i64>,

    /// Answer in this process even if the daemon is up.
    #[arg(long)]
    pub local: bool,
}

impl StartArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let config = config::load_at(&home).context("failed to load configuration")?;
        let sender = resolve_sender(&config, self.sender)?;

        let daemon_replies = if self.local {
            None
        } else {
            match request_start(&home, sender.0) {
                Ok(data) => Some(replies_of(&data)),
                Err(DaemonError::DaemonNotRunning { .. }) => None,
                Err(err) => return Err(err).context("daemon failed to answer /start"),
            }
        };
        let replies = match daemon_replies {
            Some(replies) => replies,
            None => {
                let pipeline = Pipeline::from_config(&config).context("failed to build pipeline")?;
                vec![pipeline.greet(sender).to_string()]
            }
        };

        for reply in &replies {
            println!("{reply}");
        }
        if replies.iter().any(|reply| is_failure_reply(reply)) {
            bail!("sender {sender} is not allowed");
        }
        Ok(())
    }
}
