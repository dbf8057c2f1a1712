//! `quill status`: artifacts in the working directory and repository state.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use quill_core::config;
use quill_sync::repo::{observe, RepoState};

use super::home;

/// Arguments for `quill status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let config = config::load_at(&home).context("failed to load configuration")?;

        let report = StatusReport {
            working_dir: config.working_dir.display().to_string(),
            remote: config.remote_url.clone(),
            branch: config.branch.clone(),
            repo: observe(&config.working_dir),
            artifacts: list_artifacts(&config.working_dir)?,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    working_dir: String,
    remote: Option<String>,
    branch: String,
    repo: RepoState,
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Serialize, Tabled)]
struct Artifact {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "heading")]
    heading: String,
    #[tabled(rename = "modified")]
    modified: String,
    #[tabled(rename = "bytes")]
    bytes: u64,
}

/// Top-level `*.md` files, newest first.
fn list_artifacts(dir: &Path) -> Result<Vec<Artifact>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read {}", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("md") || !path.is_file() {
            continue;
        }
        let meta = entry
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?;
        let modified: DateTime<Local> = meta
            .modified()
            .with_context(|| format!("mtime {}", path.display()))?
            .into();
        let heading = fs::read_to_string(&path)
            .ok()
            .and_then(|text| heading_line(&text))
            .unwrap_or_default();
        found.push((
            modified,
            Artifact {
                file: entry.file_name().to_string_lossy().into_owned(),
                heading,
                modified: modified.format("%Y-%m-%d %H:%M").to_string(),
                bytes: meta.len(),
            },
        ));
    }

    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.file.cmp(&b.1.file)));
    Ok(found.into_iter().map(|(_, artifact)| artifact).collect())
}

fn heading_line(text: &str) -> Option<String> {
    text.lines()
        .next()
        .and_then(|line| line.strip_prefix("# "))
        .map(str::to_string)
}

fn print_table(report: StatusReport) {
    println!(
        "Quill v{} | {} notes | repo {} | remote {}",
        env!("CARGO_PKG_VERSION"),
        report.artifacts.len(),
        repo_indicator(&report.repo),
        report
            .remote
            .as_deref()
            .map(|url| format!("{url} ({})", report.branch))
            .unwrap_or_else(|| "not configured".bright_black().to_string()),
    );
    println!("{}", report.working_dir.bold());

    if report.artifacts.is_empty() {
        println!("No notes saved yet.");
        return;
    }

    let mut table = Table::new(report.artifacts);
    table.with(Style::rounded());
    println!("{table}");

    if let RepoState::CloneFailed(cause) = &report.repo {
        println!("Last clone failed: {cause}");
    }
}

fn repo_indicator(state: &RepoState) -> String {
    match state {
        RepoState::Ready => "READY".green().bold().to_string(),
        RepoState::Uninitialized => "NOT CLONED".bright_black().bold().to_string(),
        RepoState::Corrupt => "NOT A REPOSITORY".yellow().bold().to_string(),
        RepoState::Cloning => "CLONING".cyan().bold().to_string(),
        RepoState::CloneFailed(_) => "CLONE FAILED".red().bold().to_string(),
    }
}
