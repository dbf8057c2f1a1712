//! Repository state manager.
//!
//! ```text
//! Uninitialized ─┐
//!                ├─► Cloning ─► Ready
//! Corrupt ───────┘        └──► CloneFailed
//! ```
//!
//! `Corrupt` means the working directory exists without `.git`. It is
//! removed before cloning; top-level `*.md` artifacts inside it are carried
//! into the fresh clone (or back into a recreated directory if the clone
//! fails), so notes written before the clone survive recovery.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{repo_io_err, RepoError};
use crate::git::VcsTool;

/// Observed state of the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RepoState {
    /// Nothing on disk yet.
    Uninitialized,
    /// Directory present but not a git repository.
    Corrupt,
    Cloning,
    Ready,
    /// The last clone attempt failed; the next `ensure` tries again.
    CloneFailed(String),
}

/// True iff `dir/.git` exists.
pub fn is_repository(dir: &Path) -> bool {
    dir.join(".git").exists()
}

/// Classify `dir` without touching it.
pub fn observe(dir: &Path) -> RepoState {
    if is_repository(dir) {
        RepoState::Ready
    } else if dir.exists() {
        RepoState::Corrupt
    } else {
        RepoState::Uninitialized
    }
}

/// Keeps one working directory a clone of one remote.
#[derive(Debug)]
pub struct RepositoryManager {
    working_dir: PathBuf,
    remote_url: String,
    state: RepoState,
    clone_attempts: usize,
}

impl RepositoryManager {
    pub fn new(working_dir: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        let working_dir = working_dir.into();
        let state = observe(&working_dir);
        Self {
            working_dir,
            remote_url: remote_url.into(),
            state,
            clone_attempts: 0,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn state(&self) -> &RepoState {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        is_repository(&self.working_dir)
    }

    /// Clone attempts made by this manager so far.
    pub fn clone_attempts(&self) -> usize {
        self.clone_attempts
    }

    /// Make sure the working directory is a clone of the remote.
    pub fn ensure(&mut self, tool: &impl VcsTool) -> Result<(), RepoError> {
        self.ensure_with_artifact(tool, None)
    }

    /// Like [`ensure`](Self::ensure); `artifact` names the file about to be
    /// synced, which wins over a same-named file brought in by the clone.
    pub fn ensure_with_artifact(
        &mut self,
        tool: &impl VcsTool,
        artifact: Option<&str>,
    ) -> Result<(), RepoError> {
        if self.state == RepoState::Ready && self.is_initialized() {
            return Ok(());
        }

        self.state = observe(&self.working_dir);
        let carried = match self.state {
            RepoState::Ready => {
                tracing::debug!("repository ready at {}", self.working_dir.display());
                return Ok(());
            }
            RepoState::Corrupt => {
                let carried = collect_artifacts(&self.working_dir)?;
                self.remove_stale_dir()?;
                carried
            }
            _ => Vec::new(),
        };

        self.clone_into_place(tool, carried, artifact)
    }

    fn remove_stale_dir(&self) -> Result<(), RepoError> {
        let dir = &self.working_dir;
        if !dir.is_dir() || dir.parent().is_none() || Some(dir.as_path()) == dirs::home_dir().as_deref() {
            return Err(RepoError::UnsafeRemoval { path: dir.clone() });
        }
        tracing::warn!(
            "{} exists but is not a git repository; removing it before clone",
            dir.display()
        );
        std::fs::remove_dir_all(dir).map_err(|e| repo_io_err(dir, e))
    }

    fn clone_into_place(
        &mut self,
        tool: &impl VcsTool,
        carried: Vec<(String, Vec<u8>)>,
        artifact: Option<&str>,
    ) -> Result<(), RepoError> {
        if let Some(parent) = self.working_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| repo_io_err(parent, e))?;
        }

        self.state = RepoState::Cloning;
        self.clone_attempts += 1;
        tracing::info!(
            "repository not found; cloning {} into {}",
            self.remote_url,
            self.working_dir.display()
        );

        match tool.clone_repo(&self.remote_url, &self.working_dir) {
            Ok(()) => {
                restore_artifacts(&self.working_dir, carried, artifact)?;
                self.state = RepoState::Ready;
                tracing::info!("repository successfully cloned");
                Ok(())
            }
            Err(err) => {
                let cause = err.to_string();
                tracing::error!("failed to clone the repository: {cause}");
                self.state = RepoState::CloneFailed(cause.clone());
                std::fs::create_dir_all(&self.working_dir)
                    .map_err(|e| repo_io_err(&self.working_dir, e))?;
                restore_artifacts(&self.working_dir, carried, artifact)?;
                Err(RepoError::CloneFailed(cause))
            }
        }
    }
}

fn collect_artifacts(dir: &Path) -> Result<Vec<(String, Vec<u8>)>, RepoError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut carried = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| repo_io_err(dir, e))? {
        let entry = entry.map_err(|e| repo_io_err(dir, e))?;
        let path = entry.path();
        let is_markdown = path.extension().and_then(|ext| ext.to_str()) == Some("md");
        if !is_markdown || !path.is_file() {
            continue;
        }
        let bytes = std::fs::read(&path).map_err(|e| repo_io_err(&path, e))?;
        carried.push((entry.file_name().to_string_lossy().into_owned(), bytes));
    }
    carried.sort();
    Ok(carried)
}

/// Put carried files back. A stale artifact that clashes with a different
/// file from the clone is kept as `<stem>-recovered.md`.
fn restore_artifacts(
    dir: &Path,
    carried: Vec<(String, Vec<u8>)>,
    artifact: Option<&str>,
) -> Result<(), RepoError> {
    for (name, bytes) in carried {
        let mut target = dir.join(&name);
        if artifact != Some(name.as_str()) && target.exists() {
            let existing = std::fs::read(&target).map_err(|e| repo_io_err(&target, e))?;
            if existing == bytes {
                continue;
            }
            let stem = name.trim_end_matches(".md");
            target = dir.join(format!("{stem}-recovered.md"));
            tracing::warn!("{name} differs from the remote copy; keeping local text as {}", target.display());
        }
        std::fs::write(&target, bytes).map_err(|e| repo_io_err(&target, e))?;
    }
    Ok(())
}
