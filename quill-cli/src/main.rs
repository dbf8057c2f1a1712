//! Quill: capture short notes as Markdown files in a git repository.
//!
//! # Usage
//!
//! ```text
//! quill note <text...> [--sender <id>] [--local]
//! quill start [--sender <id>] [--local]
//! quill sync <file> [--local]
//! quill status [--json]
//! quill daemon start|stop|status
//! quill config show|init [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, note::NoteArgs, start::StartArgs,
    status::StatusArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "quill",
    version,
    about = "Save short notes as Markdown and push them to a git remote",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save a note and sync it (through the daemon when it is running).
    Note(NoteArgs),

    /// Greeting check: is this sender allowed to send notes?
    Start(StartArgs),

    /// Publish an artifact already in the working directory.
    Sync(SyncArgs),

    /// List artifacts and the repository state.
    Status(StatusArgs),

    /// Run or query the intake daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    quill_daemon::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Note(args) => args.run(),
        Commands::Start(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
        Commands::Config { command } => commands::config::run(command),
    }
}
