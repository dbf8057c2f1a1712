//! Error types for quill-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use quill_core::{SenderId, SyncStage};
use quill_renderer::RenderError;

/// Failure of a single git invocation.
#[derive(Debug, Error)]
pub enum VcsError {
    /// `git` could not be spawned at all.
    #[error("failed to run git {args}: {source}")]
    Spawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    /// `git` ran and exited non-zero.
    #[error("git {args} failed ({status}): {output}")]
    Failed {
        args: String,
        status: String,
        output: String,
    },
}

/// Errors from the repository state manager.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Cloning the remote into the working directory failed.
    #[error("clone failed: {0}")]
    CloneFailed(String),

    /// Refused to delete a path that must never be removed by recovery.
    #[error("refusing to remove {path} before clone")]
    UnsafeRemoval { path: PathBuf },

    /// I/O while inspecting, clearing or restoring the working directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to take the working-directory lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run held the lock for the whole wait.
    #[error("timed out after {waited:?} waiting for lock {path}")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("lock I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A sync attempt that stopped at `stage`.
#[derive(Debug, Error)]
#[error("sync failed at {stage}: {cause}")]
pub struct SyncError {
    pub stage: SyncStage,
    pub cause: String,
}

/// Every way one note's pipeline run can end early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("sender {0} is not on the allow-list")]
    AccessDenied(SenderId),

    #[error("empty note")]
    EmptyInput,

    /// Disk I/O while writing the artifact.
    #[error("failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Convenience constructor for [`PipelineError::WriteFailure`].
pub(crate) fn write_err(path: impl Into<PathBuf>, source: std::io::Error) -> PipelineError {
    PipelineError::WriteFailure {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`RepoError::Io`].
pub(crate) fn repo_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RepoError {
    RepoError::Io {
        path: path.into(),
        source,
    }
}
