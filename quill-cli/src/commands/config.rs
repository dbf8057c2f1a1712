//! `quill config`: show or create `~/.quill/config.yaml`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use quill_core::config::{self, config_path_at, Config};

use super::home;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (file + environment) as JSON.
    Show,
    /// Write a default configuration file.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = home()?;

    match command {
        ConfigCommand::Show => {
            let config = config::load_at(&home).context("failed to load configuration")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("failed to render config JSON")?
            );
        }
        ConfigCommand::Init { force } => {
            let path = config_path_at(&home);
            if path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                );
            }
            let written = config::save_at(&home, &Config::defaults_at(&home))
                .context("failed to write configuration")?;
            println!("wrote {}", written.display());
        }
    }

    Ok(())
}
