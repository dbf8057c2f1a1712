//! `quill sync`: publish an artifact that is already on disk.

use anyhow::{bail, Context, Result};
use clap::Args;

use quill_core::config;
use quill_daemon::{request_sync, DaemonError};
use quill_sync::{check_sync, Pipeline, Reply};

use super::{home, is_failure_reply, note::replies_of};

/// Arguments for `quill sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// File name inside the working directory, e.g. `buy_milk.md`.
    pub file: String,

    /// Run in this process even if the daemon is up.
    #[arg(long)]
    pub local: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        if !self.local {
            match request_sync(&home, &self.file) {
                Ok(data) => return print_daemon_outcome(&self.file, &data),
                Err(DaemonError::DaemonNotRunning { .. }) => {}
                Err(err) => return Err(err).context("daemon failed to sync"),
            }
        }

        let config = config::load_at(&home).context("failed to load configuration")?;
        let path = config.working_dir.join(&self.file);
        if !path.is_file() {
            bail!("no artifact named '{}' in {}", self.file, config.working_dir.display());
        }

        let mut pipeline = Pipeline::from_config(&config).context("failed to build pipeline")?;
        let outcome = pipeline
            .sync(&self.file)
            .with_context(|| format!("sync failed for '{}'", self.file))?;
        let Some(result) = outcome else {
            println!("{}", Reply::SyncDisabled);
            return Ok(());
        };
        match Reply::for_sync(&result, &self.file) {
            Some(reply) => println!("{reply}"),
            None => println!("✓ {} synced to {}", self.file, config.branch),
        }
        check_sync(&result).with_context(|| format!("sync failed for '{}'", self.file))
    }
}

fn print_daemon_outcome(file: &str, data: &serde_json::Value) -> Result<()> {
    let replies = replies_of(data);
    if replies.is_empty() {
        println!("✓ {file} synced");
    }
    for reply in &replies {
        println!("{reply}");
    }
    if replies.iter().any(|reply| is_failure_reply(reply)) {
        bail!("sync failed for '{file}'");
    }
    Ok(())
}
