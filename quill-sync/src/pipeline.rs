//! Shared intake pipeline used by the CLI and the daemon.
//!
//! access gate → slug → artifact writer → repository manager → sync engine
//!
//! Within a process, every method that touches the working directory takes
//! `&mut self`. Across processes, [`WorkdirLock`] is held from the artifact
//! write through the end of the sync, so a CLI run and a daemon never
//! interleave their git commands on one clone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_core::{AccessGate, Config, Note, SenderId, SyncResult, SyncStage};

use crate::artifact::ArtifactWriter;
use crate::engine::SyncEngine;
use crate::error::{PipelineError, RepoError, SyncError};
use crate::git::{GitCli, VcsTool};
use crate::lock::{WorkdirLock, LOCK_TIMEOUT};
use crate::repo::{RepoState, RepositoryManager};
use crate::slug::slugify;

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Human-readable status sent back to the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Saved { file_name: String },
    Denied,
    Empty,
    Greeting,
    SyncDisabled,
    AlreadySynced { file_name: String },
    Failure(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Saved { file_name } => write!(f, "✅ Idea saved as {file_name}"),
            Reply::Denied => write!(f, "⛔️ You are not authorized to use this bot."),
            Reply::Empty => write!(f, "⚠️ Empty message ignored."),
            Reply::Greeting => {
                write!(f, "👋 Send me a message and I'll save it as a Markdown idea!")
            }
            Reply::SyncDisabled => {
                write!(f, "⚠️ Sync disabled: no remote repository configured.")
            }
            Reply::AlreadySynced { file_name } => {
                write!(f, "ℹ️ No new changes in {file_name}; it is already committed.")
            }
            Reply::Failure(detail) => f.write_str(detail),
        }
    }
}

impl Reply {
    pub fn is_failure(&self) -> bool {
        matches!(self, Reply::Failure(_) | Reply::Denied)
    }

    /// Replies for one [`Pipeline::ingest`] outcome, in send order.
    pub fn for_ingest(outcome: &Result<Ingested, PipelineError>) -> Vec<Reply> {
        let ingested = match outcome {
            Ok(ingested) => ingested,
            Err(PipelineError::AccessDenied(_)) => return vec![Reply::Denied],
            Err(PipelineError::EmptyInput) => return vec![Reply::Empty],
            Err(err) => return vec![Reply::Failure(format!("❌ Failed to save idea: {err}"))],
        };

        let mut replies = vec![Reply::Saved {
            file_name: ingested.file_name.clone(),
        }];
        match &ingested.sync {
            None => replies.push(Reply::SyncDisabled),
            Some(result) => replies.extend(Reply::for_sync(result, &ingested.file_name)),
        }
        replies
    }

    /// Reply for a finished sync attempt; `None` when it succeeded.
    pub fn for_sync(result: &SyncResult, file_name: &str) -> Option<Reply> {
        if result.ok {
            None
        } else if result.is_already_synced() {
            Some(Reply::AlreadySynced {
                file_name: file_name.to_string(),
            })
        } else if result.stage == SyncStage::Clone {
            Some(Reply::Failure(format!(
                "❌ Failed to clone the repository: {}",
                result.detail
            )))
        } else {
            Some(Reply::Failure(format!(
                "❌ Git error at {}: {}",
                result.stage, result.detail
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Ingest outcome
// ---------------------------------------------------------------------------

/// A note that reached disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub file_name: String,
    pub path: PathBuf,
    /// `None` when no remote is configured.
    pub sync: Option<SyncResult>,
}

/// Map a sync outcome onto the error taxonomy. Already-synced is success.
pub fn check_sync(result: &SyncResult) -> Result<(), PipelineError> {
    if result.ok || result.is_already_synced() {
        return Ok(());
    }
    match result.stage {
        SyncStage::Clone => Err(RepoError::CloneFailed(result.detail.clone()).into()),
        stage => Err(SyncError {
            stage,
            cause: result.detail.clone(),
        }
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Single owner of the working directory and the git tool.
pub struct Pipeline<T: VcsTool = GitCli> {
    gate: AccessGate,
    writer: ArtifactWriter,
    repo: Option<RepositoryManager>,
    engine: SyncEngine,
    tool: T,
    lock_timeout: Duration,
}

impl Pipeline<GitCli> {
    /// Pipeline backed by the `git` executable.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        Self::with_tool(config, GitCli::from_config(config))
    }
}

impl<T: VcsTool> Pipeline<T> {
    pub fn with_tool(config: &Config, tool: T) -> Result<Self, PipelineError> {
        let repo = match config.remote_url.as_deref() {
            Some(url) => Some(RepositoryManager::new(&config.working_dir, url)),
            None => {
                tracing::warn!(
                    "GIT_REPO_URL is not set; notes are written to {} without sync",
                    config.working_dir.display()
                );
                None
            }
        };
        Ok(Self {
            gate: AccessGate::from_config(config),
            writer: ArtifactWriter::from_config(config)?,
            repo,
            engine: SyncEngine::new(&config.working_dir, &config.branch),
            tool,
            lock_timeout: LOCK_TIMEOUT,
        })
    }

    /// Bound the wait for another run holding the working-directory lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn working_dir(&self) -> &Path {
        self.writer.dir()
    }

    pub fn sync_enabled(&self) -> bool {
        self.repo.is_some()
    }

    /// Repository state, `None` when sync is disabled.
    pub fn repo_state(&self) -> Option<&RepoState> {
        self.repo.as_ref().map(RepositoryManager::state)
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    /// `/start`: greet admitted senders.
    pub fn greet(&self, sender: SenderId) -> Reply {
        if self.gate.admits(sender) {
            Reply::Greeting
        } else {
            tracing::warn!("unauthorized access attempt by {sender}");
            Reply::Denied
        }
    }

    /// Full run for one note, as transport replies.
    pub fn handle(&mut self, note: &Note) -> Vec<Reply> {
        Reply::for_ingest(&self.ingest(note))
    }

    /// Gate, write and sync one note.
    ///
    /// Errors cover the steps before the artifact exists; once it is on disk
    /// the sync outcome is reported inside [`Ingested`].
    pub fn ingest(&mut self, note: &Note) -> Result<Ingested, PipelineError> {
        tracing::info!("message from {}: {}", note.sender_id, note.raw_text);
        if !self.gate.admits(note.sender_id) {
            tracing::warn!("unauthorized access attempt by {}", note.sender_id);
            return Err(PipelineError::AccessDenied(note.sender_id));
        }
        if note.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let _lock = WorkdirLock::acquire(self.working_dir(), self.lock_timeout)?;
        let slug = slugify(&note.raw_text);
        let path = self.writer.write(note, &slug)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| slug.file_name());

        let sync = self.sync_locked(&file_name);
        Ok(Ingested {
            file_name,
            path,
            sync,
        })
    }

    /// Ensure the clone and publish `file_name`; `Ok(None)` when sync is
    /// disabled.
    ///
    /// Re-running after a failed clone or commit retries the full sequence.
    /// After a failed pull or push the commit already exists locally, so a
    /// re-run reports the already-committed outcome and pushes nothing.
    pub fn sync(&mut self, file_name: &str) -> Result<Option<SyncResult>, PipelineError> {
        let _lock = WorkdirLock::acquire(self.working_dir(), self.lock_timeout)?;
        Ok(self.sync_locked(file_name))
    }

    fn sync_locked(&mut self, file_name: &str) -> Option<SyncResult> {
        let Some(repo) = self.repo.as_mut() else {
            tracing::warn!("GIT_REPO_URL is not set; skipping sync of {file_name}");
            return None;
        };

        if let Err(err) = repo.ensure_with_artifact(&self.tool, Some(file_name)) {
            let detail = match err {
                RepoError::CloneFailed(cause) => cause,
                other => other.to_string(),
            };
            return Some(SyncResult::failure(SyncStage::Clone, detail));
        }
        Some(self.engine.sync(&self.tool, file_name))
    }
}
