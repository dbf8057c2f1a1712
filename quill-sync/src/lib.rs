//! # quill-sync
//!
//! Note persistence and git synchronization.
//!
//! Build a [`Pipeline`] from a [`quill_core::Config`] and call
//! [`Pipeline::handle`] for each inbound note, or [`Pipeline::sync`] to
//! publish an artifact that is already on disk.

pub mod artifact;
pub mod engine;
pub mod error;
pub mod git;
pub mod lock;
pub mod pipeline;
pub mod repo;
pub mod slug;

#[cfg(test)]
pub(crate) mod fake;

pub use artifact::ArtifactWriter;
pub use engine::SyncEngine;
pub use error::{LockError, PipelineError, RepoError, SyncError, VcsError};
pub use git::{GitCli, SshCredential, VcsTool};
pub use lock::WorkdirLock;
pub use pipeline::{check_sync, Ingested, Pipeline, Reply};
pub use repo::{RepoState, RepositoryManager};
pub use slug::slugify;
