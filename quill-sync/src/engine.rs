//! Sync engine: publishes one artifact upstream.
//!
//! Stages run in order and stop at the first failure:
//!
//! 1. `add` the file
//! 2. `commit` (`Added idea: <file>`); an empty change set stops here as
//!    [`SyncResult::nothing_to_commit`]
//! 3. `pull --rebase` onto the remote branch; conflicts are left for the
//!    operator
//! 4. `push` `HEAD:<branch>`
//!
//! Nothing is retried.

use std::path::{Path, PathBuf};

use quill_core::{SyncResult, SyncStage};

use crate::git::VcsTool;

/// Commit message for an artifact.
pub fn commit_message(file_name: &str) -> String {
    format!("Added idea: {file_name}")
}

/// Runs the add/commit/rebase/push sequence in one working directory.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    working_dir: PathBuf,
    branch: String,
}

impl SyncEngine {
    pub fn new(working_dir: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            branch: branch.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Publish `file_name` (relative to the working directory).
    pub fn sync(&self, tool: &impl VcsTool, file_name: &str) -> SyncResult {
        let dir = self.working_dir.as_path();
        tracing::info!("committing file: {file_name}");

        if let Err(err) = tool.add(dir, file_name) {
            return fail(SyncStage::Add, err);
        }

        match tool.has_staged_changes(dir) {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("nothing to commit for {file_name}; already synced");
                return SyncResult::nothing_to_commit(file_name);
            }
            Err(err) => return fail(SyncStage::Commit, err),
        }
        if let Err(err) = tool.commit(dir, &commit_message(file_name)) {
            return fail(SyncStage::Commit, err);
        }

        tracing::info!("running git pull --rebase");
        if let Err(err) = tool.pull_rebase(dir, &self.branch) {
            return fail(SyncStage::PullRebase, err);
        }

        tracing::info!("pushing to remote");
        if let Err(err) = tool.push(dir, &self.branch) {
            return fail(SyncStage::Push, err);
        }

        tracing::info!("push completed");
        SyncResult::success(format!("pushed {file_name} to {}", self.branch))
    }
}

fn fail(stage: SyncStage, err: impl std::fmt::Display) -> SyncResult {
    let detail = err.to_string();
    tracing::error!("git error at {stage}: {detail}");
    SyncResult::failure(stage, detail)
}
