//! `quill note`: save one note and sync it.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use quill_core::{config, Note, SenderId};
use quill_daemon::{request_note, DaemonError};
use quill_sync::Pipeline;

use super::{home, is_failure_reply, resolve_sender};

/// Arguments for `quill note`.
#[derive(Args, Debug)]
pub struct NoteArgs {
    /// Note text; several words are joined with spaces.
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,

    /// Sender id checked against the allow-list (defaults to the lowest allowed id).
    #[arg(long)]
    pub sender: Option<i64>,

    /// Run the pipeline in this process even if the daemon is up.
    #[arg(long)]
    pub local: bool,
}

impl NoteArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let config = config::load_at(&home).context("failed to load configuration")?;
        let sender = resolve_sender(&config, self.sender)?;
        let text = self.text.join(" ");

        let replies = if self.local {
            run_local(&config, sender, &text)?
        } else {
            match via_daemon(&home, sender, &text) {
                Ok(replies) => replies,
                Err(DaemonError::DaemonNotRunning { .. }) => run_local(&config, sender, &text)?,
                Err(err) => return Err(err).context("daemon failed to process the note"),
            }
        };

        for reply in &replies {
            println!("{reply}");
        }
        if replies.iter().any(|reply| is_failure_reply(reply)) {
            bail!("note was not saved and synced");
        }
        Ok(())
    }
}

fn run_local(config: &config::Config, sender: SenderId, text: &str) -> Result<Vec<String>> {
    let mut pipeline = Pipeline::from_config(config).context("failed to build pipeline")?;
    let replies = pipeline.handle(&Note::received(text, sender));
    Ok(replies.iter().map(ToString::to_string).collect())
}

fn via_daemon(home: &Path, sender: SenderId, text: &str) -> Result<Vec<String>, DaemonError> {
    let data = request_note(home, sender.0, text)?;
    Ok(replies_of(&data))
}

pub(crate) fn replies_of(data: &serde_json::Value) -> Vec<String> {
    data.get("replies")
        .and_then(|v| v.as_array())
        .map(|replies| {
            replies
                .iter()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
